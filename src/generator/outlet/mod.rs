use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::generator::mindmap::to_markmap;
use crate::generator::types::PipelineResult;

pub const REPORT_FILE: &str = "report.md";
pub const MINDMAP_JSON_FILE: &str = "mindmap.json";
pub const MINDMAP_MARKMAP_FILE: &str = "mindmap.md";
pub const RESULT_FILE: &str = "result.json";

/// 保存结果
pub async fn save(output_dir: &Path, result: &PipelineResult) -> Result<()> {
    let outlet = DiskOutlet::new(output_dir.to_path_buf());
    outlet.save(result).await
}

#[allow(async_fn_in_trait)]
pub trait Outlet {
    async fn save(&self, result: &PipelineResult) -> Result<()>;
}

/// 下载用报告：带查询与生成时间的头部
pub fn render_report_document(result: &PipelineResult, generated_at: &DateTime<Local>) -> String {
    format!(
        "# English Report Pipeline\n\n## クエリ\n{}\n\n## 生成日時\n{}\n\n## レポート\n{}\n",
        result.query,
        generated_at.to_rfc3339(),
        result.report
    )
}

pub struct DiskOutlet {
    output_dir: PathBuf,
}

impl DiskOutlet {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    fn write_file(&self, file_name: &str, content: &str) -> Result<()> {
        let path = self.output_dir.join(file_name);
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("💾 已保存: {}", path.display());
        Ok(())
    }
}

impl Outlet for DiskOutlet {
    async fn save(&self, result: &PipelineResult) -> Result<()> {
        info!("🖊️ 结果存储中...");
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "Failed to create output directory {}",
                self.output_dir.display()
            )
        })?;

        let generated_at = Local::now();
        self.write_file(REPORT_FILE, &render_report_document(result, &generated_at))?;
        self.write_file(
            MINDMAP_JSON_FILE,
            &serde_json::to_string_pretty(&result.mindmap).context("Failed to serialize mindmap")?,
        )?;
        self.write_file(MINDMAP_MARKMAP_FILE, &to_markmap(&result.mindmap))?;
        self.write_file(
            RESULT_FILE,
            &serde_json::to_string_pretty(result).context("Failed to serialize result")?,
        )?;

        info!("💾 结果保存完成，输出目录: {}", self.output_dir.display());
        Ok(())
    }
}
