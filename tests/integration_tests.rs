use async_trait::async_trait;
use report_pipeline::config::Config;
use report_pipeline::generator::context::GeneratorContext;
use report_pipeline::generator::mindmap::{from_markmap, to_markmap};
use report_pipeline::generator::outlet;
use report_pipeline::search::{ProviderCapability, SearchError};
use report_pipeline::{
    GenerationError, GenerationParams, PipelineOrchestrator, PipelineResult, RetrievalClient,
    SearchProvider, TextGenerator,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// 按prompt关键词返回固定内容的生成服务
struct KeywordGenerator {
    calls: AtomicUsize,
}

impl KeywordGenerator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TextGenerator for KeywordGenerator {
    async fn generate(&self, prompt: &str, _params: GenerationParams) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = if prompt.contains("マインドマップ") {
            r#"```json
{"name": "関係代名詞", "children": [{"name": "who / which", "children": [{"name": "先行詞"}]}, {"name": "省略"}]}
```"#
        } else if prompt.contains("結論部") {
            "関係代名詞の指導では、文と文をつなぐ機能に注目させることが効果的です。"
        } else if prompt.contains("【執筆する節】") {
            "関係代名詞は名詞を後ろから修飾します[2]。存在しない番号[42]は削除されます。"
        } else if prompt.contains("リード文") {
            "関係代名詞の基本と指導上のポイントを整理します。"
        } else if prompt.contains("文法項目を特定") {
            "- **関係代名詞 who**: 人を先行詞にとる。例: \"the boy who lives next door\""
        } else if prompt.contains("アウトライン") {
            "```markdown\n# 関係代名詞の解説\n## 基本構造 [1]\n### 主格 [2]\n### 目的格 [3]\n## 指導法\n```"
        } else if prompt.contains("検索トピック") {
            "- 関係代名詞 主格 目的格\n- 関係代名詞 指導 中学"
        } else if prompt.contains("検索クエリー") {
            "関係代名詞 用法 指導"
        } else {
            "Hello!"
        };
        Ok(text.to_string())
    }
}

struct UnavailableGenerator;

#[async_trait]
impl TextGenerator for UnavailableGenerator {
    async fn generate(&self, _prompt: &str, _params: GenerationParams) -> Result<String, GenerationError> {
        Err(GenerationError::Timeout(120))
    }
}

struct StaticProvider;

#[async_trait]
impl SearchProvider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    fn capability(&self) -> ProviderCapability {
        ProviderCapability::ScrapeFallback
    }

    async fn search(&self, query: &str) -> Result<String, SearchError> {
        if query.contains("site:") {
            return Err(SearchError::NoResults { provider: "static" });
        }
        Ok(format!("- {}: snippet", query))
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.pipeline.education_domains = vec!["mext.go.jp".to_string()];
    config
}

fn orchestrator(generator: Arc<dyn TextGenerator>) -> PipelineOrchestrator {
    let retrieval = Arc::new(RetrievalClient::new(
        vec![Box::new(StaticProvider)],
        Duration::ZERO,
        2,
    ));
    PipelineOrchestrator::new(GeneratorContext::with_services(test_config(), generator, retrieval))
}

#[tokio::test]
async fn test_pipeline_produces_complete_report() {
    let generator = Arc::new(KeywordGenerator::new());
    let orchestrator = orchestrator(generator.clone());

    let result = orchestrator.run("The boy who lives next door is my friend.").await;

    assert!(result.report.starts_with("# 関係代名詞の解説\n\n関係代名詞の基本と指導上のポイントを整理します。"));
    assert!(result.report.contains("## 基本構造 [1]\n\n### 主格 [2]\n\n関係代名詞は名詞を後ろから修飾します[2]。存在しない番号は削除されます。"));
    assert!(result.report.contains("## 指導法\n\n"));
    assert!(!result.report.contains("[42]"));
    assert!(result.report.contains("## 関連文法事項\n- **関係代名詞 who**"));
    assert!(result.report.contains("## 結論\n関係代名詞の指導では"));

    assert_eq!(result.refined_query, "関係代名詞 用法 指導");
    assert_eq!(result.search_stats.education_results, 0);
    assert_eq!(result.search_stats.general_results, 1);
    assert_eq!(result.search_stats.detailed_results, 2);
    assert_eq!(result.search_stats.total_topics, 2);
    assert!(result.processing_time >= 0.0);

    assert_eq!(result.mindmap.name, "関係代名詞");
    assert_eq!(
        to_markmap(&result.mindmap),
        "# 関係代名詞\n# who / which\n## 先行詞\n## 省略"
    );

    // 连接检查、洗练、展开、大纲、导语、3个小节、相关事项、结论、思维导图
    assert_eq!(generator.calls.load(Ordering::SeqCst), 11);
}

#[tokio::test]
async fn test_unavailable_generation_returns_error_report() {
    let orchestrator = orchestrator(Arc::new(UnavailableGenerator));

    let result = orchestrator.run("仮定法過去").await;

    assert_eq!(result.mindmap.name, "Error Report");
    assert_eq!(result.search_stats.total_topics, 0);
    assert_eq!(result.search_stats.education_results, 0);
    assert_eq!(result.processing_time, 0.0);
    assert!(result.report.contains("仮定法過去"));
    assert!(result.report.contains("timed out"));
}

#[tokio::test]
async fn test_result_export_round_trip() {
    let orchestrator = orchestrator(Arc::new(KeywordGenerator::new()));
    let result = orchestrator.run("関係代名詞を教えて").await;
    let temp_dir = TempDir::new().unwrap();

    outlet::save(temp_dir.path(), &result).await.unwrap();

    let saved: PipelineResult = serde_json::from_str(
        &std::fs::read_to_string(temp_dir.path().join("result.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(saved, result);

    let markmap = std::fs::read_to_string(temp_dir.path().join("mindmap.md")).unwrap();
    let restored = from_markmap(&markmap).unwrap();
    assert_eq!(to_markmap(&restored), markmap);

    let report = std::fs::read_to_string(temp_dir.path().join("report.md")).unwrap();
    assert!(report.starts_with("# English Report Pipeline\n\n## クエリ\n関係代名詞を教えて"));
}
