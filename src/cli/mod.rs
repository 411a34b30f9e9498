use crate::config::{Config, DEFAULT_CONFIG_FILE, LLMProvider};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::warn;

/// report-pipeline - 面向英语教育的调研报告生成流水线
#[derive(Parser, Debug)]
#[command(name = "report-pipeline")]
#[command(
    about = "Turns a question about English grammar or teaching into a citation-bearing research report and a mind map."
)]
#[command(version)]
pub struct Args {
    /// 用户查询（可包含英文原文）
    pub query: String,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 结果导出目录
    #[arg(short, long)]
    pub output_path: Option<PathBuf>,

    /// 是否启用详细日志
    #[arg(short, long)]
    pub verbose: bool,

    /// 生成模型
    #[arg(long)]
    pub model: Option<String>,

    /// LLM API基地址
    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    /// LLM API KEY
    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// LLM Provider (openai, moonshot, deepseek, mistral, openrouter, anthropic, gemini, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// 逐主题检索的最大并发数
    #[arg(long)]
    pub max_parallels: Option<usize>,

    /// 检索请求间隔（毫秒）
    #[arg(long)]
    pub throttle_ms: Option<u64>,

    /// 跳过启动时的模型连接检查
    #[arg(long)]
    pub skip_connection_check: bool,
}

impl Args {
    /// 将CLI参数转换为配置：默认值 → 配置文件 → 环境变量 → CLI参数
    pub fn into_config(self) -> Result<Config> {
        self.into_config_with_env(|key| std::env::var(key).ok())
    }

    /// 使用给定的环境变量查找函数转换配置
    pub fn into_config_with_env<F>(self, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if let Some(config_path) = &self.config {
            // 显式指定的配置文件必须可读
            Config::from_file(config_path)?
        } else {
            // 如果没有显式指定配置文件，尝试从默认位置加载
            let default_config_path = std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(DEFAULT_CONFIG_FILE);

            if default_config_path.exists() {
                Config::from_file(&default_config_path)?
            } else {
                Config::default()
            }
        };

        config.apply_env_with(lookup);

        // 覆盖LLM配置
        if let Some(provider_str) = self.llm_provider {
            match provider_str.parse::<LLMProvider>() {
                Ok(provider) => config.llm.provider = provider,
                Err(_) => warn!(
                    "⚠️ 警告: 未知的provider: {}，使用 {}",
                    provider_str, config.llm.provider
                ),
            }
        }
        if let Some(llm_api_base_url) = self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url;
        }
        if let Some(llm_api_key) = self.llm_api_key {
            config.llm.api_key = llm_api_key;
        }
        if let Some(model) = self.model {
            config.llm.model = model;
        }

        // 检索配置
        if let Some(max_parallels) = self.max_parallels {
            config.search.max_parallels = max_parallels.max(1);
        }
        if let Some(throttle_ms) = self.throttle_ms {
            config.search.throttle_ms = throttle_ms;
        }

        // 其他配置
        if self.skip_connection_check {
            config.pipeline.check_connection = false;
        }
        if self.output_path.is_some() {
            config.output_path = self.output_path;
        }
        config.verbose = config.verbose || self.verbose;

        Ok(config)
    }
}
