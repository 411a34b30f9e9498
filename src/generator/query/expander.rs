use std::sync::Arc;
use tracing::{info, warn};

use crate::llm::{GenerationParams, TextGenerator};

/// 检索主题的上限
pub const MAX_TOPICS: usize = 10;

const EXPAND_PROMPT: &str = r#"あなたは日本の英語教育に精通した専門家です。
下記のクエリー（高校入試や教科書からの英文を含む可能性があります）に関して、事前にWeb検索をして簡単に下調べしてあります。
Web検索結果もふまえ、クエリーに関する英語教育的な解説・分析文書を作成するために必要な情報を検索しようとしています。

解説・分析に必要な情報を適切にヒットさせきるための検索トピックを以下の形式でリストアップしてください。

出力フォーマット：
- xxx
- yyy
- ...
- zzz

検索トピックをリストアップするにあたり、以下の条件を遵守してください。

- クエリーの背景にある英語教育的な論点を深く考察すること
- クエリーに対する解説・分析を行うのに必要な情報（英文の文法構造、語彙の難易度、構文の複雑性、読解のポイント、指導上の留意点、関連する学習指導要領（英語）、第二言語習得論、応用言語学、英語教授法、教材研究、国内外の事例、および入力された英文に含まれる具体的な文法項目に関する解説）が揃うように検索トピックをリストアップしてください
- 検索トピックは可能な限り互いに重複せず、個別に調査可能な形にしてください。 **self-contained** であるべきです
- 検索トピックは英語教育分野の文脈に準拠した具体的なものにしてください（短文または具体的な専門用語）
- 検索精度を高めるため、第二言語習得論、応用言語学、英語教授法などの専門用語や、関連するキーワードを含めてください
- 検索トピックをナンバリングする必要はありません。
- 検索トピックの個数は多くても10個までにしてください。

クエリー: {refined_query}
"#;

const FALLBACK_TOPICS: [&str; 7] = [
    "英文法 現在完了進行形 解説",
    "現在完了進行形 指導上の留意点",
    "第二言語習得論 継続相",
    "学習指導要領 英語 現在完了進行形",
    "応用言語学 時制と相",
    "英語教材研究 現在完了進行形 導入",
    "have been -ing ニュアンス 違い",
];

/// 查询展开器 - 将洗练后的查询展开为一组可独立检索的主题
pub struct QueryExpander {
    generator: Arc<dyn TextGenerator>,
}

impl QueryExpander {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// 展开查询，结果非空且不超过10条
    pub async fn expand(&self, refined: &str) -> Vec<String> {
        let prompt = EXPAND_PROMPT.replace("{refined_query}", refined);
        let params = GenerationParams::new(1000, 0.4);

        let response = match self.generator.generate(&prompt, params).await {
            Ok(response) => response,
            Err(e) => {
                warn!("⚠️ 查询展开失败，使用兜底主题: {}", e);
                return fallback_topics();
            }
        };

        let topics = parse_topics(&response);
        if topics.is_empty() {
            warn!("⚠️ 未能从模型输出中解析出检索主题，使用兜底主题");
            return fallback_topics();
        }

        info!("🧭 展开为 {} 个检索主题: {:?}", topics.len(), topics);
        topics
    }
}

/// 兜底主题列表
pub fn fallback_topics() -> Vec<String> {
    FALLBACK_TOPICS.iter().map(|t| t.to_string()).collect()
}

/// 只解析以 `- ` 开头的行，去掉回显的prompt条目与重复项，最多保留10条
pub fn parse_topics(response: &str) -> Vec<String> {
    let echoed = prompt_bullets();
    let mut topics: Vec<String> = Vec::new();

    for line in response.lines() {
        let Some(topic) = line.trim().strip_prefix("- ") else {
            continue;
        };
        let topic = topic.trim();
        if topic.is_empty()
            || echoed.iter().any(|e| *e == topic)
            || topics.iter().any(|t| t == topic)
        {
            continue;
        }
        topics.push(topic.to_string());
        if topics.len() == MAX_TOPICS {
            break;
        }
    }
    topics
}

fn prompt_bullets() -> Vec<&'static str> {
    EXPAND_PROMPT
        .lines()
        .filter_map(|line| line.trim().strip_prefix("- "))
        .map(str::trim)
        .collect()
}
