use crate::config::Config;
use crate::generator::context::GeneratorContext;
use crate::generator::mindmap::MindmapGenerator;
use crate::generator::outline::OutlineBuilder;
use crate::generator::query::{QueryExpander, QueryRefiner};
use crate::generator::report::ReportWriter;
use crate::generator::types::{PipelineResult, SearchStats};
use crate::llm::GenerationError;
use crate::search::{SearchResults, SearchSource};

use futures::FutureExt;
use std::any::Any;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// 时间跟踪作用域
pub struct TimingScope {
    start_time: Instant,
    phase_start_times: Vec<(String, Instant)>,
    phase_durations: Vec<(String, Duration)>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phase_start_times: Vec::new(),
            phase_durations: Vec::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &str) {
        self.phase_start_times
            .push((phase_name.to_string(), Instant::now()));
    }

    /// 结束一个阶段的计时
    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let index = self
            .phase_start_times
            .iter()
            .position(|(name, _)| name == phase_name)?;
        let (name, start_time) = self.phase_start_times.remove(index);
        let duration = start_time.elapsed();
        self.phase_durations.push((name, duration));
        Some(duration)
    }

    /// 阶段是否已开始但尚未结束
    pub fn is_running(&self, phase_name: &str) -> bool {
        self.phase_start_times.iter().any(|(name, _)| name == phase_name)
    }

    /// 获取总执行时间
    pub fn get_total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 按完成顺序获取各阶段的执行时间
    pub fn get_phase_durations(&self) -> &[(String, Duration)] {
        &self.phase_durations
    }

    /// 获取格式化的执行时间报告
    pub fn generate_timing_report(&self) -> String {
        let mut report = format!(
            "总执行时间: {:.2}秒\n",
            self.get_total_duration().as_secs_f64()
        );

        if !self.phase_durations.is_empty() {
            report.push_str("\n各阶段执行时间:\n");
            for (phase, duration) in &self.phase_durations {
                report.push_str(&format!("- {}: {:.3}秒\n", phase, duration.as_secs_f64()));
            }
        }

        report
    }
}

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Start,
    Refined,
    EducationSearched,
    GeneralSearched,
    Expanded,
    DetailedSearched,
    Merged,
    Outlined,
    Written,
    Mapped,
    Done,
    FallbackDone,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Start => "start",
            PipelineStage::Refined => "refined",
            PipelineStage::EducationSearched => "education_searched",
            PipelineStage::GeneralSearched => "general_searched",
            PipelineStage::Expanded => "expanded",
            PipelineStage::DetailedSearched => "detailed_searched",
            PipelineStage::Merged => "merged",
            PipelineStage::Outlined => "outlined",
            PipelineStage::Written => "written",
            PipelineStage::Mapped => "mapped",
            PipelineStage::Done => "done",
            PipelineStage::FallbackDone => "fallback_done",
        }
    }

    /// 正常流程中的下一个状态
    pub fn next(&self) -> PipelineStage {
        match self {
            PipelineStage::Start => PipelineStage::Refined,
            PipelineStage::Refined => PipelineStage::EducationSearched,
            PipelineStage::EducationSearched => PipelineStage::GeneralSearched,
            PipelineStage::GeneralSearched => PipelineStage::Expanded,
            PipelineStage::Expanded => PipelineStage::DetailedSearched,
            PipelineStage::DetailedSearched => PipelineStage::Merged,
            PipelineStage::Merged => PipelineStage::Outlined,
            PipelineStage::Outlined => PipelineStage::Written,
            PipelineStage::Written => PipelineStage::Mapped,
            PipelineStage::Mapped => PipelineStage::Done,
            PipelineStage::Done => PipelineStage::Done,
            PipelineStage::FallbackDone => PipelineStage::FallbackDone,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::FallbackDone)
    }
}

impl Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 导致流水线整体失败的错误
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("text generation service is unavailable: {0}")]
    GenerationUnavailable(#[from] GenerationError),

    #[error("pipeline panicked: {0}")]
    Panicked(String),
}

/// 单次运行中的状态与计时
struct Progress {
    stage: PipelineStage,
    timing: TimingScope,
}

impl Progress {
    fn new() -> Self {
        Self {
            stage: PipelineStage::Start,
            timing: TimingScope::new(),
        }
    }

    fn begin(&mut self) {
        self.timing.start_phase(self.stage.next().as_str());
    }

    /// 失败发生时正在执行的阶段：尚未开始任何阶段时为 `start`
    fn failed_stage(&self) -> PipelineStage {
        if self.timing.is_running(self.stage.next().as_str()) {
            self.stage.next()
        } else {
            self.stage
        }
    }

    fn advance(&mut self) {
        let next = self.stage.next();
        if let Some(duration) = self.timing.end_phase(next.as_str()) {
            debug!("{} → {} ({:.3}秒)", self.stage, next, duration.as_secs_f64());
        }
        self.stage = next;
    }
}

/// 流水线编排器 - 依次执行各阶段，保证总能返回结构完整的结果
pub struct PipelineOrchestrator {
    context: GeneratorContext,
    refiner: QueryRefiner,
    expander: QueryExpander,
    outline_builder: OutlineBuilder,
    writer: ReportWriter,
    mindmap_generator: MindmapGenerator,
}

impl PipelineOrchestrator {
    pub fn new(context: GeneratorContext) -> Self {
        let generator = context.generator.clone();
        Self {
            refiner: QueryRefiner::new(generator.clone()),
            expander: QueryExpander::new(generator.clone()),
            outline_builder: OutlineBuilder::new(generator.clone()),
            writer: ReportWriter::new(generator.clone()),
            mindmap_generator: MindmapGenerator::new(generator),
            context,
        }
    }

    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        Ok(Self::new(GeneratorContext::new(config)?))
    }

    /// 运行流水线，任何失败都会转换为兜底结果
    pub async fn run(&self, query: &str) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", %run_id);

        async {
            info!("🚀 开始生成报告: {}", query);
            let mut progress = Progress::new();
            let outcome = AssertUnwindSafe(self.execute(query, &mut progress))
                .catch_unwind()
                .await;

            let error = match outcome {
                Ok(Ok(result)) => return result,
                Ok(Err(e)) => e,
                Err(panic) => PipelineError::Panicked(panic_message(&*panic)),
            };

            let failed_stage = progress.failed_stage();
            error!(
                "❌ 流水线在 {} 阶段失败 → {}: {}",
                failed_stage,
                PipelineStage::FallbackDone,
                error
            );
            PipelineResult::failure(query, failed_stage.as_str(), &error.to_string())
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, query: &str, progress: &mut Progress) -> Result<PipelineResult, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        if self.context.config.pipeline.check_connection {
            self.context.generator.check_connection().await?;
            debug!("模型连接正常");
        }

        progress.begin();
        let refined = self.refiner.refine(query).await;
        progress.advance();

        progress.begin();
        let education = self.search_education(&refined).await;
        progress.advance();

        progress.begin();
        let general = self
            .context
            .retrieval
            .search_with_source(std::slice::from_ref(&refined), SearchSource::General)
            .await;
        progress.advance();

        progress.begin();
        let topics = self.expander.expand(&refined).await;
        progress.advance();

        progress.begin();
        let detailed = self.context.retrieval.search(&topics).await;
        progress.advance();

        progress.begin();
        let merged = SearchResults::merged([education, general, detailed]);
        let search_stats = SearchStats::collect(&merged, topics.len());
        info!(
            "📚 检索结果汇总: 教育 {} 条，通用 {} 条，详细 {} 条",
            search_stats.education_results,
            search_stats.general_results,
            search_stats.detailed_results
        );
        progress.advance();

        progress.begin();
        let outline = self.outline_builder.build(&refined, &merged).await;
        progress.advance();

        progress.begin();
        let report = self.writer.write(&outline, &merged, query, &refined).await;
        progress.advance();

        progress.begin();
        let mindmap = self.mindmap_generator.generate(&report).await;
        progress.advance();

        progress.advance();
        let processing_time = progress.timing.get_total_duration().as_secs_f64();
        debug!("\n{}", progress.timing.generate_timing_report());
        info!("🎉 报告生成完成，耗时 {:.2}秒", processing_time);

        Ok(PipelineResult {
            report,
            mindmap,
            query: query.to_string(),
            refined_query: refined,
            processing_time,
            search_stats,
            failed_stage: None,
        })
    }

    /// 逐个教育/政府站点检索，失败的站点直接跳过
    async fn search_education(&self, refined: &str) -> SearchResults {
        let mut results = SearchResults::new();
        for domain in &self.context.config.pipeline.education_domains {
            match self.context.retrieval.search_domain(refined, domain).await {
                Ok(text) => results.insert(SearchSource::Education, format!("education_{}", domain), text),
                Err(e) => warn!("⚠️ 站点检索失败 {}: {}", domain, e),
            }
        }
        results
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 启动报告生成：运行流水线并在配置了输出目录时导出结果
pub async fn launch(config: &Config, query: &str) -> anyhow::Result<PipelineResult> {
    let orchestrator = PipelineOrchestrator::from_config(config.clone())?;
    let result = orchestrator.run(query).await;

    if let Some(output_dir) = &config.output_path {
        crate::generator::outlet::save(output_dir, &result).await?;
    }

    Ok(result)
}
