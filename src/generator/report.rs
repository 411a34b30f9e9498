use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::generator::citations::{ReferenceList, strip_out_of_range};
use crate::llm::{GenerationParams, TextGenerator};
use crate::search::SearchResults;

const LEAD_PROMPT: &str = r#"あなたは英語教育問題に精通し、分かりやすい解説記事を書くことに定評のある信頼できるライターです。
下記のクエリーに関する調査レポートの、タイトルの直後に表示する簡潔なリード文を生成してください。
リード文は、レポート全体の要旨、特に英語教育的な観点からの主要な論点や分析の方向性を含めた、140〜280文字程度の簡潔な文章にしてください。
リード文の文章のみを出力してください。

クエリー: {refined_query}
"#;

const SECTION_PROMPT: &str = r#"あなたは日本の英語教育に精通し、客観的なデータと英語教育理論に基づいた分かりやすい解説を書くことに定評のある信頼できるライターです。
下記のクエリー（高校入試や教科書からの英文を含む可能性があります）に関するレポートのアウトラインのうち、【執筆する節】の本文を執筆してください。
アウトラインの中にある引用番号は漏れることなく必ず参照し、収集された情報源の内容を適切に解釈しながら、400字以上で解説を記載してください。
特に、入力された英文がある場合は、その英文の具体的な分析（文法、語彙、構文、読解ポイントなど）を詳細に含めてください。英語教育に詳しくない人向けにわかりやすくかみ砕いて説明することも重要です。
1. 見出しは出力せず、本文のみを出力してください。
2. 必ず情報源の情報に基づき記載し、ハルシネーションに気をつけること。
   記載の根拠となる参照すべき情報源は "...です[4][1]。" "...ます[2]。" のように明示してください。
3. 情報源の番号は【情報源】に存在するものだけを使ってください。
4. 内容に応じて箇条書きを適切に配置し、読者の理解度を深めてください。
5. 日本語の「ですます調」で解説を書いてください。

【情報源】
{references}

【アウトライン】
{outline}

【執筆する節】
{section}

【クエリー】
{refined_query}
"#;

const RELATED_PROMPT: &str = r#"あなたは英文法に精通した専門家です。
下記の英文を分析し、含まれる主要な文法項目を特定してください。
特定した各文法項目について、以下の形式で簡潔に解説してください。

出力フォーマット：
- **[文法項目名]**: [その文法項目の簡潔な説明]。例: [提供された英文からの該当箇所]

以下の条件を遵守してください。
- 英文に含まれる主要な文法項目を網羅的に特定すること
- 同じ文法項目を重複して挙げないこと
- 各文法項目の説明は、高校生が理解できるレベルで簡潔に記述すること
- 提供された英文中の具体的な箇所をそのまま例として引用すること
- 箇条書き形式のみで出力すること

【英文】
{initial_query}
"#;

const CONCLUSION_PROMPT: &str = r###"あなたは英語教育問題に精通し、未来志向の提言をすることに定評のある信頼できるライターです。
レポートのドラフトを踏まえて、レポート全体の要約を本文とはできるだけ異なる表現で記載しつつ、英語教育的な観点からの今後の展望や課題、考えられる対策を含んだ結論部を生成します。
最低でも400字以上、可能なら600字以上記載してください。
結論の文章部分のみ生成し、"## 結論" のようなヘッダは入れないでください。

【レポートドラフト】
{draft}
"###;

const SECTION_PLACEHOLDER: &str = "この節の解説は現在生成できませんでした。";
const RELATED_PLACEHOLDER: &str = "- 関連する文法事項を特定できませんでした。";

/// 大纲中的一个标题
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineHeading {
    pub level: usize,
    pub line: String,
    /// 后面没有更深一级的子标题
    pub is_leaf: bool,
}

/// 解析大纲中的二级及以下标题
pub fn outline_headings(outline: &str) -> Vec<OutlineHeading> {
    let mut headings: Vec<OutlineHeading> = outline
        .lines()
        .filter_map(|line| {
            let line = line.trim_end();
            let level = line.chars().take_while(|c| *c == '#').count();
            if level >= 2 && line[level..].starts_with(' ') {
                Some(OutlineHeading {
                    level,
                    line: line.to_string(),
                    is_leaf: true,
                })
            } else {
                None
            }
        })
        .collect();

    for i in 0..headings.len() {
        if let Some(next) = headings.get(i + 1) {
            if next.level > headings[i].level {
                headings[i].is_leaf = false;
            }
        }
    }
    headings
}

/// 报告撰写器 - 根据大纲与检索结果分段生成完整报告
pub struct ReportWriter {
    generator: Arc<dyn TextGenerator>,
}

impl ReportWriter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// 生成报告：导语、正文、相关语法事项、结论
    pub async fn write(
        &self,
        outline: &str,
        results: &SearchResults,
        initial: &str,
        refined: &str,
    ) -> String {
        info!("✍️ 开始撰写报告...");
        let references = ReferenceList::new(results);

        let title = match outline.lines().next() {
            Some(first) if first.starts_with("# ") => first.trim_end().to_string(),
            _ => format!("# {}", refined),
        };

        let lead = self.write_lead(refined).await;
        debug!("导语已生成");

        let body = self.write_body(outline, &references, refined).await;
        debug!("正文已生成");

        let related = self.write_related(initial).await;
        debug!("相关语法事项已生成");

        let draft = format!("{}\n{}\n{}", title, lead, body);
        let conclusion = self.write_conclusion(&draft, refined).await;
        debug!("结论已生成");

        let report = format!(
            "{}\n\n{}\n\n{}\n\n## 関連文法事項\n{}\n\n## 結論\n{}",
            title, lead, body, related, conclusion
        );
        info!("✅ 报告撰写完成，共 {} 字", report.chars().count());
        report
    }

    async fn write_lead(&self, refined: &str) -> String {
        let prompt = LEAD_PROMPT.replace("{refined_query}", refined);
        match self.generate_trimmed(&prompt, GenerationParams::new(500, 0.5)).await {
            Some(lead) => lead,
            None => format!(
                "この記事では、「{}」について、英語教育の観点から深く掘り下げ、その指導法や理論的背景を解説します。",
                refined
            ),
        }
    }

    async fn write_body(&self, outline: &str, references: &ReferenceList<'_>, refined: &str) -> String {
        let mut headings = outline_headings(outline);
        if headings.is_empty() {
            headings.push(OutlineHeading {
                level: 2,
                line: "## 概要と解説".to_string(),
                is_leaf: true,
            });
        }

        let reference_text = references.format_for_prompt();
        let mut parts = Vec::with_capacity(headings.len() * 2);
        for heading in &headings {
            parts.push(heading.line.clone());
            if !heading.is_leaf {
                continue;
            }

            let prompt = SECTION_PROMPT
                .replace("{references}", &reference_text)
                .replace("{outline}", outline)
                .replace("{section}", &heading.line)
                .replace("{refined_query}", refined);
            let text = match self.generate_trimmed(&prompt, GenerationParams::new(2000, 0.5)).await {
                Some(text) => references.sanitize(&drop_leading_heading(&text, &heading.line)),
                None => SECTION_PLACEHOLDER.to_string(),
            };
            parts.push(text);
        }
        parts.join("\n\n")
    }

    async fn write_related(&self, initial: &str) -> String {
        let prompt = RELATED_PROMPT.replace("{initial_query}", initial);
        let Some(response) = self.generate_trimmed(&prompt, GenerationParams::new(1000, 0.3)).await else {
            return RELATED_PLACEHOLDER.to_string();
        };

        let mut bullets: Vec<&str> = Vec::new();
        for line in response.lines().map(str::trim) {
            if line.starts_with("- ") && !bullets.contains(&line) {
                bullets.push(line);
            }
        }
        if bullets.is_empty() {
            RELATED_PLACEHOLDER.to_string()
        } else {
            bullets.join("\n")
        }
    }

    async fn write_conclusion(&self, draft: &str, refined: &str) -> String {
        let prompt = CONCLUSION_PROMPT.replace("{draft}", draft);
        match self.generate_trimmed(&prompt, GenerationParams::new(1500, 0.5)).await {
            Some(text) => drop_leading_heading(&text, "## 結論"),
            None => format!(
                "本レポートでは「{}」について解説し、今後の英語教育における課題と展望を示しました。",
                refined
            ),
        }
    }

    /// 调用生成服务，失败或空文本时返回None
    async fn generate_trimmed(&self, prompt: &str, params: GenerationParams) -> Option<String> {
        match self.generator.generate(prompt, params).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                warn!("⚠️ 报告片段生成结果为空，使用占位文本");
                None
            }
            Err(e) => {
                warn!("⚠️ 报告片段生成失败，使用占位文本: {}", e);
                None
            }
        }
    }
}

/// 模型有时会重复输出标题，将其去掉（比较时忽略引用标记）
fn drop_leading_heading(text: &str, heading: &str) -> String {
    let same = |line: &str| strip_out_of_range(line, 0).trim() == strip_out_of_range(heading, 0).trim();
    match text.split_once('\n') {
        Some((first, rest)) if same(first) => rest.trim_start().to_string(),
        None if same(text) => String::new(),
        _ => text.to_string(),
    }
}
