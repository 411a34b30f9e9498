use std::sync::Arc;
use tracing::{info, warn};

use crate::llm::{GenerationParams, TextGenerator};

const REFINE_PROMPT: &str = r#"あなたはWebの扱いに長けた優秀な英語教育アナリストです。
下記のユーザーのクエリー（高校入試や教科書からの英文を含む可能性があります）にたいして、その英文や関連する英語教育の観点からの解説を与えるのに適した簡潔な検索クエリーを一つ作ってください。
なお、作成にあたっては下記を守って下さい。

- 英語教育の観点からの解説に繋がるクエリーをつくること
- あなたの作ったクエリーは可能な限りユーザーが作ったクエリーの意図と過不足なく一致させること
- クエリーは日本語で作成すること
- Web検索に最適化すること
- 簡潔であること
- 検索クエリーのみを出力すること

ユーザーのクエリー: {user_query}
"#;

/// 查询洗练器 - 将用户的自然语言查询改写为适合检索的简洁查询
pub struct QueryRefiner {
    generator: Arc<dyn TextGenerator>,
}

impl QueryRefiner {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// 洗练查询，失败时返回模板化的兜底查询
    pub async fn refine(&self, initial: &str) -> String {
        let prompt = REFINE_PROMPT.replace("{user_query}", initial);
        let params = GenerationParams::new(500, 0.3);

        match self.generator.generate(&prompt, params).await {
            Ok(response) => match clean_response(&response) {
                Some(refined) => {
                    info!("🔍 洗练后的查询: {}", refined);
                    refined
                }
                None => {
                    warn!("⚠️ 查询洗练结果为空，使用兜底查询");
                    fallback_refinement(initial)
                }
            },
            Err(e) => {
                warn!("⚠️ 查询洗练失败，使用兜底查询: {}", e);
                fallback_refinement(initial)
            }
        }
    }
}

/// 模板化的兜底查询
pub fn fallback_refinement(initial: &str) -> String {
    format!("「{}」に関する英語教育の観点からの解説", initial)
}

/// 去除首尾空白与包裹的引号，结果为空时返回None
fn clean_response(response: &str) -> Option<String> {
    const QUOTES: &[(char, char)] = &[('"', '"'), ('\'', '\''), ('「', '」'), ('『', '』'), ('`', '`')];

    let mut text = response.trim();
    for (open, close) in QUOTES {
        if text.chars().count() >= 2 && text.starts_with(*open) && text.ends_with(*close) {
            text = text[open.len_utf8()..text.len() - close.len_utf8()].trim();
            break;
        }
    }

    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedGenerator;

    #[tokio::test]
    async fn test_refine_uses_model_output() {
        let generator = Arc::new(ScriptedGenerator::always("  比較級 最上級 用法 指導\n"));
        let refiner = QueryRefiner::new(generator.clone());

        let refined = refiner.refine("英語の比較級と最上級の使い方を教えて").await;

        assert_eq!(refined, "比較級 最上級 用法 指導");
        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.contains("ユーザーのクエリー: 英語の比較級と最上級の使い方を教えて"));
        assert_eq!(calls[0].1, GenerationParams::new(500, 0.3));
    }

    #[tokio::test]
    async fn test_refine_strips_quotes() {
        let refiner = QueryRefiner::new(Arc::new(ScriptedGenerator::always("「現在完了進行形 指導法」")));
        assert_eq!(refiner.refine("q").await, "現在完了進行形 指導法");

        let refiner = QueryRefiner::new(Arc::new(ScriptedGenerator::always("\"関係代名詞 解説\"")));
        assert_eq!(refiner.refine("q").await, "関係代名詞 解説");
    }

    #[tokio::test]
    async fn test_refine_falls_back_on_failure() {
        let refiner = QueryRefiner::new(Arc::new(ScriptedGenerator::failing()));

        let refined = refiner.refine("仮定法").await;

        assert_eq!(refined, "「仮定法」に関する英語教育の観点からの解説");
    }

    #[tokio::test]
    async fn test_refine_falls_back_on_blank_output() {
        let refiner = QueryRefiner::new(Arc::new(ScriptedGenerator::always(" \"\" ")));

        assert_eq!(refiner.refine("不定詞").await, fallback_refinement("不定詞"));
    }

    #[test]
    fn test_clean_response_single_quote_char() {
        assert_eq!(clean_response("\""), Some("\"".to_string()));
    }
}
