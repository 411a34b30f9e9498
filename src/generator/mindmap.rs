use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::{GenerationParams, TextGenerator};

/// prompt中嵌入的报告最大字符数
pub const REPORT_EXCERPT_CHARS: usize = 2000;

const DEFAULT_ROOT_NAME: &str = "English Learning Report";

const MINDMAP_PROMPT: &str = r#"あなたは英語教育の専門家で、レポート内容を構造化してマインドマップを作成するのが得意です。
以下のレポート内容を分析し、階層構造を持つマインドマップデータをJSON形式で生成してください。

マインドマップの構造は以下の形式に従ってください：
- メインノード（レポートのタイトル）
- サブノード（主要な章やセクション）
- さらに細かいノード（詳細な内容）

出力は次のJSON Schemaに適合させてください：
{schema}

レポート内容：
{report_content}

出力は有効なJSON形式でお願いします。JSON以外の文章は出力しないでください。"#;

/// 思维导图节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MindmapNode {
    /// 节点名称，非空
    pub name: String,
    /// 子节点，叶子节点为空数组
    #[serde(default)]
    pub children: Vec<MindmapNode>,
}

impl MindmapNode {
    pub fn new(name: impl Into<String>, children: Vec<MindmapNode>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }

    pub fn leaf(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// 思维导图数据不符合结构要求
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("{0}: expected an object")]
    NotAnObject(String),

    #[error("{0}: missing or empty \"name\"")]
    MissingName(String),

    #[error("{0}: \"children\" must be an array")]
    InvalidChildren(String),
}

/// 解析并严格校验模型返回的JSON文本
///
/// 整段文本能解析为JSON时直接校验（顶层数组等会被拒绝）；
/// 否则视为带有前后说明文字，截取最外层的 `{...}` 再解析。
pub fn parse_mindmap(response: &str) -> Result<MindmapNode, SchemaError> {
    let text = unfence(response);
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            let object = outermost_object(text).ok_or_else(|| SchemaError::InvalidJson(e.to_string()))?;
            serde_json::from_str(object).map_err(|e| SchemaError::InvalidJson(e.to_string()))?
        }
    };
    validate(&value)
}

/// 校验JSON值：顶层为对象，`name` 为非空字符串，`children` 若存在则必须是合法节点数组
pub fn validate(value: &Value) -> Result<MindmapNode, SchemaError> {
    validate_at(value, "$")
}

fn validate_at(value: &Value, path: &str) -> Result<MindmapNode, SchemaError> {
    let object = value
        .as_object()
        .ok_or_else(|| SchemaError::NotAnObject(path.to_string()))?;

    let name = object
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| SchemaError::MissingName(path.to_string()))?;

    let children = match object.get("children") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| validate_at(item, &format!("{}.children[{}]", path, i)))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(SchemaError::InvalidChildren(path.to_string())),
    };

    Ok(MindmapNode::new(name, children))
}

/// 去掉包裹整段内容的代码块围栏
fn unfence(response: &str) -> &str {
    let text = response.trim();
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    // 跳过语言标记所在的首行
    let inner = match inner.find('\n') {
        Some(newline) => &inner[newline + 1..],
        None => inner,
    };
    inner.trim_end().strip_suffix("```").unwrap_or(inner).trim()
}

fn outermost_object(text: &str) -> Option<&str> {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&text[start..=end]),
        _ => None,
    }
}

/// 默认思维导图，根节点取报告的一级标题
pub fn default_tree(report: &str) -> MindmapNode {
    let title = report
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(DEFAULT_ROOT_NAME);

    MindmapNode::new(
        title,
        vec![
            MindmapNode::new(
                "Main Topics",
                vec![
                    MindmapNode::leaf("Grammar"),
                    MindmapNode::leaf("Vocabulary"),
                    MindmapNode::leaf("Usage"),
                ],
            ),
            MindmapNode::new(
                "Key Points",
                vec![
                    MindmapNode::leaf("Important Rules"),
                    MindmapNode::leaf("Examples"),
                    MindmapNode::leaf("Practice Tips"),
                ],
            ),
        ],
    )
}

/// 流水线整体失败时使用的思维导图
pub fn error_tree() -> MindmapNode {
    MindmapNode::new(
        "Error Report",
        vec![
            MindmapNode::leaf("Error"),
            MindmapNode::leaf("Please try again"),
        ],
    )
}

/// 渲染为扁平的markmap文本：有子节点的节点为 `# name`，叶子节点为 `## name`
pub fn to_markmap(node: &MindmapNode) -> String {
    if node.is_leaf() {
        format!("## {}", node.name)
    } else {
        let children: Vec<String> = node.children.iter().map(to_markmap).collect();
        format!("# {}\n{}", node.name, children.join("\n"))
    }
}

/// 从markmap文本还原树
///
/// 第一行 `# ` 为根节点，之后的 `# ` 行为根的分支子节点，`## ` 行挂在最近的分支（或根）下。
/// 对于根下深度不超过2、且叶子子节点排在分支子节点之前的树可以精确还原。
pub fn from_markmap(text: &str) -> Option<MindmapNode> {
    let mut root: Option<MindmapNode> = None;
    let mut branch: Option<usize> = None;

    for line in text.lines().map(str::trim_end) {
        if let Some(name) = line.strip_prefix("## ") {
            let root = root.as_mut()?;
            let leaf = MindmapNode::leaf(name.trim());
            match branch {
                Some(index) => root.children[index].children.push(leaf),
                None => root.children.push(leaf),
            }
        } else if let Some(name) = line.strip_prefix("# ") {
            match root.as_mut() {
                None => root = Some(MindmapNode::leaf(name.trim())),
                Some(root) => {
                    root.children.push(MindmapNode::leaf(name.trim()));
                    branch = Some(root.children.len() - 1);
                }
            }
        }
    }
    root
}

/// 思维导图生成器
pub struct MindmapGenerator {
    generator: Arc<dyn TextGenerator>,
}

impl MindmapGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// 从报告生成思维导图，任何失败都回退到默认结构
    pub async fn generate(&self, report: &str) -> MindmapNode {
        let prompt = build_prompt(report);
        let response = match self
            .generator
            .generate(&prompt, GenerationParams::new(3000, 0.5))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("⚠️ 思维导图生成失败，使用默认结构: {}", e);
                return default_tree(report);
            }
        };

        match parse_mindmap(&response) {
            Ok(node) => {
                info!("🧠 思维导图生成完成，根节点: {}", node.name);
                node
            }
            Err(e) => {
                warn!("⚠️ 思维导图校验失败，使用默认结构: {}", e);
                default_tree(report)
            }
        }
    }
}

fn build_prompt(report: &str) -> String {
    let excerpt: String = report.chars().take(REPORT_EXCERPT_CHARS).collect();
    let schema = serde_json::to_string_pretty(&schemars::schema_for!(MindmapNode)).unwrap_or_default();
    MINDMAP_PROMPT
        .replace("{schema}", &schema)
        .replace("{report_content}", &excerpt)
}
