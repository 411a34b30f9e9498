use anyhow::Result;
use clap::Parser;
use report_pipeline::cli::Args;
use report_pipeline::generator::mindmap::to_markmap;
use report_pipeline::launch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env 不存在时忽略
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let query = args.query.clone();
    let config = args.into_config()?;
    // 配置文件中的 verbose 同样生效
    init_tracing(config.verbose);

    let result = launch(&config, &query).await?;

    println!("{}", result.report);
    println!("\n---\n");
    println!("{}", to_markmap(&result.mindmap));
    println!("\n---\n");
    println!("🔍 洗练后的查询: {}", result.refined_query);
    println!(
        "📊 检索统计: 教育 {} / 通用 {} / 详细 {} / 主题 {}",
        result.search_stats.education_results,
        result.search_stats.general_results,
        result.search_stats.detailed_results,
        result.search_stats.total_topics
    );
    println!("⏱️ 处理时间: {:.2}秒", result.processing_time);

    if result.is_failure() {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
