use std::sync::Arc;
use tracing::{info, warn};

use crate::generator::citations::{ReferenceList, strip_out_of_range};
use crate::llm::{GenerationParams, TextGenerator};
use crate::search::SearchResults;

const OUTLINE_PROMPT: &str = r####"あなたは日本の英語教育に精通し、構成の明快な解説レポートを設計することに定評のある編集者です。
下記のクエリーに関する調査レポートのアウトラインを、収集された情報源に基づいて作成してください。
なお、作成にあたっては下記を守って下さい。

- 1行目は "# タイトル" とし、以降は "## 章" と "### 節" の見出しのみで構成すること
- 見出し以外の文章は出力しないこと
- 各見出しの末尾に、その章・節の根拠となる情報源の番号を "[3][1]" のように付けること
- 存在しない情報源の番号を使わないこと
- 英文の文法構造、指導上の留意点、関連する学習指導要領などの英語教育的な論点を網羅すること

【情報源】
{references}

【クエリー】
{refined_query}
"####;

/// 大纲构建器 - 根据洗练后的查询与检索结果生成带引用标记的Markdown大纲
pub struct OutlineBuilder {
    generator: Arc<dyn TextGenerator>,
}

impl OutlineBuilder {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// 生成大纲，首行保证为 `# 标题`
    pub async fn build(&self, refined: &str, results: &SearchResults) -> String {
        let references = ReferenceList::new(results);
        let prompt = OUTLINE_PROMPT
            .replace("{references}", &references.format_for_prompt())
            .replace("{refined_query}", refined);
        let params = GenerationParams::new(1500, 0.3);

        match self.generator.generate(&prompt, params).await {
            Ok(response) => match normalize_outline(&response, refined, references.len()) {
                Some(outline) => {
                    info!("🗂️ 大纲生成完成，共 {} 个标题", outline.lines().count());
                    outline
                }
                None => {
                    warn!("⚠️ 大纲中没有任何标题，使用兜底大纲");
                    fallback_outline(refined)
                }
            },
            Err(e) => {
                warn!("⚠️ 大纲生成失败，使用兜底大纲: {}", e);
                fallback_outline(refined)
            }
        }
    }
}

pub fn fallback_outline(refined: &str) -> String {
    format!("# {}\n\n## 概要と解説", refined)
}

/// 规范化模型输出：去掉代码块围栏，只保留标题行，删除越界引用，并补齐一级标题
pub fn normalize_outline(response: &str, refined: &str, reference_count: usize) -> Option<String> {
    let headings: Vec<String> = response
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("```"))
        .filter_map(|line| {
            let level = line.chars().take_while(|c| *c == '#').count();
            let title = line[level..].trim();
            if (1..=3).contains(&level) && !title.is_empty() {
                let title = strip_out_of_range(title, reference_count);
                Some(format!("{} {}", "#".repeat(level), title.trim_end()))
            } else {
                None
            }
        })
        .collect();

    if headings.is_empty() {
        return None;
    }

    let mut lines = Vec::with_capacity(headings.len() + 1);
    let mut rest = headings.as_slice();
    match headings.first() {
        Some(first) if first.starts_with("# ") => {
            lines.push(first.clone());
            rest = &headings[1..];
        }
        _ => lines.push(format!("# {}", refined)),
    }
    // 之后出现的一级标题降为二级
    for heading in rest {
        if heading.starts_with("# ") {
            lines.push(format!("#{}", heading));
        } else {
            lines.push(heading.clone());
        }
    }

    Some(lines.join("\n"))
}
