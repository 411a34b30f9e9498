use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// 检索结果的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    /// 教育/政府站点限定检索
    Education,
    /// 基于洗练后查询的通用检索
    General,
    /// 基于展开主题的详细检索
    Detailed,
}

impl Display for SearchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            SearchSource::Education => "education",
            SearchSource::General => "general",
            SearchSource::Detailed => "detailed",
        };
        write!(f, "{}", str)
    }
}

/// 一条带来源标签的检索记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub source: SearchSource,
    pub key: String,
    pub text: String,
}

/// 有序的检索结果集合
///
/// 同一来源内key唯一（重复插入会原地覆盖）；合并不同来源时保留所有记录，
/// 即使key相同也不会互相覆盖。引用编号按迭代顺序从1开始分配。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    records: Vec<SearchRecord>,
}

impl SearchResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入一条记录，同一来源下的同名key会被原地替换
    pub fn insert(&mut self, source: SearchSource, key: impl Into<String>, text: impl Into<String>) {
        let key = key.into();
        let text = text.into();
        if let Some(existing) = self
            .records
            .iter_mut()
            .find(|r| r.source == source && r.key == key)
        {
            existing.text = text;
            return;
        }
        self.records.push(SearchRecord { source, key, text });
    }

    /// 按顺序追加另一个结果集中的全部记录
    pub fn merge(&mut self, other: SearchResults) {
        self.records.extend(other.records);
    }

    /// 依次合并多个结果集
    pub fn merged<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = SearchResults>,
    {
        let mut merged = SearchResults::new();
        for part in parts {
            merged.merge(part);
        }
        merged
    }

    /// 获取首个匹配key的文本
    pub fn get(&self, key: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.text.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 统计某一来源的记录数
    pub fn count_by(&self, source: SearchSource) -> usize {
        self.records.iter().filter(|r| r.source == source).count()
    }
}

impl IntoIterator for SearchResults {
    type Item = SearchRecord;
    type IntoIter = std::vec::IntoIter<SearchRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_preserves_order() {
        let mut results = SearchResults::new();
        results.insert(SearchSource::Detailed, "b", "text b");
        results.insert(SearchSource::Detailed, "a", "text a");

        let keys: Vec<_> = results.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(results.get("a"), Some("text a"));
    }

    #[test]
    fn test_insert_same_source_replaces_in_place() {
        let mut results = SearchResults::new();
        results.insert(SearchSource::General, "topic", "old");
        results.insert(SearchSource::General, "other", "x");
        results.insert(SearchSource::General, "topic", "new");

        assert_eq!(results.len(), 2);
        assert_eq!(results.keys().next(), Some("topic"));
        assert_eq!(results.get("topic"), Some("new"));
    }

    #[test]
    fn test_merge_keeps_colliding_keys_from_different_sources() {
        let mut general = SearchResults::new();
        general.insert(SearchSource::General, "関係代名詞", "general text");
        let mut detailed = SearchResults::new();
        detailed.insert(SearchSource::Detailed, "関係代名詞", "detailed text");

        let merged = SearchResults::merged([general, detailed]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.count_by(SearchSource::General), 1);
        assert_eq!(merged.count_by(SearchSource::Detailed), 1);
        let texts: Vec<_> = merged.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["general text", "detailed text"]);
    }

    #[test]
    fn test_merged_order_follows_argument_order() {
        let mut education = SearchResults::new();
        education.insert(SearchSource::Education, "education_mext.go.jp", "e");
        let mut general = SearchResults::new();
        general.insert(SearchSource::General, "q", "g");
        let mut detailed = SearchResults::new();
        detailed.insert(SearchSource::Detailed, "t1", "d1");
        detailed.insert(SearchSource::Detailed, "t2", "d2");

        let merged = SearchResults::merged([education, general, detailed]);

        let keys: Vec<_> = merged.keys().collect();
        assert_eq!(keys, vec!["education_mext.go.jp", "q", "t1", "t2"]);
    }

    #[test]
    fn test_source_display() {
        assert_eq!(SearchSource::Education.to_string(), "education");
        assert_eq!(SearchSource::General.to_string(), "general");
        assert_eq!(SearchSource::Detailed.to_string(), "detailed");
    }
}
