use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "report-pipeline.toml";

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    #[default]
    OpenAI,
    #[serde(rename = "moonshot")]
    Moonshot,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "mistral")]
    Mistral,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
}

impl LLMProvider {
    /// 该provider是否需要API KEY
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LLMProvider::Ollama)
    }
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Moonshot => write!(f, "moonshot"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Mistral => write!(f, "mistral"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "moonshot" => Ok(LLMProvider::Moonshot),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "mistral" => Ok(LLMProvider::Mistral),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "gemini" => Ok(LLMProvider::Gemini),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// LLM模型配置
    pub llm: LLMConfig,

    /// Web检索配置
    pub search: SearchConfig,

    /// 流水线配置
    pub pipeline: PipelineConfig,

    /// 结果导出目录，为空时只输出到终端
    pub output_path: Option<PathBuf>,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 所有生成阶段共用的模型
    pub model: String,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 单次调用超时时间（秒）
    pub timeout_seconds: u64,
}

/// Web检索配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    /// Google Custom Search API KEY
    pub google_api_key: Option<String>,

    /// Google Custom Search 引擎ID
    pub google_engine_id: Option<String>,

    /// Brave Search API KEY
    pub brave_api_key: Option<String>,

    /// 是否启用HTML抓取兜底
    pub enable_scrape_fallback: bool,

    /// HTML抓取时追加到查询后的教育领域关键词
    pub scrape_augmentation: String,

    /// 每个查询保留的结果条数
    pub max_results_per_query: u32,

    /// 请求间隔（毫秒），用于遵守频率限制
    pub throttle_ms: u64,

    /// 单次HTTP请求超时（秒）
    pub request_timeout_seconds: u64,

    /// 逐主题检索的最大并发数，1表示完全串行
    pub max_parallels: usize,

    /// HTTP会话的User-Agent
    pub user_agent: String,
}

/// 流水线配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// 教育领域检索时限定的站点
    pub education_domains: Vec<String>,

    /// 每次运行开始前是否检查模型连接
    pub check_connection: bool,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 使用进程环境变量覆盖凭据与模型设置
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// 使用给定的查找函数覆盖凭据与模型设置，空值会被忽略
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(api_key) = get("OPENAI_API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Some(base_url) = get("OPENAI_BASE_URL") {
            self.llm.api_base_url = base_url;
        }
        if let Some(key) = get("GOOGLE_API_KEY") {
            self.search.google_api_key = Some(key);
        }
        if let Some(engine_id) = get("GOOGLE_ENGINE_ID") {
            self.search.google_engine_id = Some(engine_id);
        }
        if let Some(key) = get("BRAVE_API_KEY") {
            self.search.brave_api_key = Some(key);
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: String::new(),
            api_base_url: String::from("https://api.openai.com/v1"),
            model: String::from("gpt-4-turbo-preview"),
            retry_attempts: 3,
            retry_delay_ms: 2000,
            timeout_seconds: 120,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            google_api_key: None,
            google_engine_id: None,
            brave_api_key: None,
            enable_scrape_fallback: true,
            scrape_augmentation: String::from("英語教育"),
            max_results_per_query: 5,
            throttle_ms: 1000,
            request_timeout_seconds: 15,
            max_parallels: 1,
            user_agent: String::from(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
            ),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            education_domains: vec![
                "mext.go.jp".to_string(),
                "nier.go.jp".to_string(),
                "jstage.jst.go.jp".to_string(),
                "eiken.or.jp".to_string(),
                "britishcouncil.jp".to_string(),
            ],
            check_connection: true,
        }
    }
}
