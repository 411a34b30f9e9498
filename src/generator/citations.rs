//! 引用编号 - 检索结果与正文中 `[n]` 标记之间的对应关系

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::search::SearchResults;

static CITATION_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());

/// 一次生成调用内固定的参考文献列表
///
/// 第 i 条记录（按迭代顺序）对应编号 `[i+1]`。
pub struct ReferenceList<'a> {
    results: &'a SearchResults,
}

impl<'a> ReferenceList<'a> {
    pub fn new(results: &'a SearchResults) -> Self {
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// 生成嵌入prompt的编号列表
    pub fn format_for_prompt(&self) -> String {
        self.results
            .iter()
            .enumerate()
            .map(|(i, record)| format!("[{}] Topic: {}\nResult: {}", i + 1, record.key, record.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// 删除超出 `1..=N` 范围的引用标记
    pub fn sanitize(&self, text: &str) -> String {
        strip_out_of_range(text, self.len())
    }
}

/// 删除超出 `1..=max` 范围的 `[n]` 标记
pub fn strip_out_of_range(text: &str, max: usize) -> String {
    CITATION_REGEX
        .replace_all(text, |caps: &Captures| {
            let in_range = caps[1]
                .parse::<usize>()
                .map(|n| n >= 1 && n <= max)
                .unwrap_or(false);
            if in_range {
                caps[0].to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}
