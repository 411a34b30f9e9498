use serde::{Deserialize, Serialize};

use crate::generator::mindmap::{MindmapNode, error_tree};
use crate::search::{SearchResults, SearchSource};

/// 检索统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    pub education_results: usize,
    pub general_results: usize,
    pub detailed_results: usize,
    /// 展开后的检索主题数
    pub total_topics: usize,
}

impl SearchStats {
    pub fn collect(results: &SearchResults, total_topics: usize) -> Self {
        Self {
            education_results: results.count_by(SearchSource::Education),
            general_results: results.count_by(SearchSource::General),
            detailed_results: results.count_by(SearchSource::Detailed),
            total_topics,
        }
    }
}

/// 一次流水线运行的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub report: String,
    pub mindmap: MindmapNode,
    pub query: String,
    pub refined_query: String,
    /// 处理耗时（秒）
    pub processing_time: f64,
    pub search_stats: SearchStats,
    /// 整体失败时记录失败所在的阶段，正常结果为 `None`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
}

impl PipelineResult {
    /// 流水线整体失败时的结果
    pub fn failure(query: &str, stage: &str, error: &str) -> Self {
        let report = format!(
            "# エラーレポート\n\n申し訳ございません。「{}」のレポート生成中にエラーが発生しました。\n\nエラー詳細: {}\n\nしばらく時間をおいてから再度お試しください。",
            query, error
        );
        Self {
            report,
            mindmap: error_tree(),
            query: query.to_string(),
            refined_query: query.to_string(),
            processing_time: 0.0,
            search_stats: SearchStats::default(),
            failed_stage: Some(stage.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failed_stage.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_result() {
        let result = PipelineResult::failure("比較級", "refined", "connection refused");

        assert!(result.report.starts_with("# エラーレポート"));
        assert!(result.report.contains("「比較級」"));
        assert!(result.report.contains("connection refused"));
        assert_eq!(result.mindmap.name, "Error Report");
        assert_eq!(result.processing_time, 0.0);
        assert_eq!(result.search_stats, SearchStats::default());
        assert!(result.is_failure());
        assert_eq!(result.failed_stage.as_deref(), Some("refined"));
    }

    #[test]
    fn test_error_report_root_alone_is_not_failure() {
        let result = PipelineResult {
            report: "# Error Report\n\n本文".to_string(),
            mindmap: error_tree(),
            query: "Error Report".to_string(),
            refined_query: "Error Report".to_string(),
            processing_time: 2.0,
            search_stats: SearchStats::default(),
            failed_stage: None,
        };

        assert!(!result.is_failure());
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("failed_stage").is_none());
    }

    #[test]
    fn test_collect_stats() {
        let mut results = SearchResults::new();
        results.insert(SearchSource::Education, "education_mext.go.jp", "e");
        results.insert(SearchSource::Education, "education_nier.go.jp", "e");
        results.insert(SearchSource::General, "q", "g");
        results.insert(SearchSource::Detailed, "t", "d");

        let stats = SearchStats::collect(&results, 3);

        assert_eq!(
            stats,
            SearchStats {
                education_results: 2,
                general_results: 1,
                detailed_results: 1,
                total_topics: 3,
            }
        );
    }

    #[test]
    fn test_result_serializes_to_json() {
        let result = PipelineResult::failure("q", "start", "e");

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["failed_stage"], "start");

        assert_eq!(value["mindmap"]["name"], "Error Report");
        assert_eq!(value["search_stats"]["total_topics"], 0);
        assert_eq!(value["processing_time"], 0.0);
    }
}
