//! LLM客户端 - 基于rig的文本生成服务实现

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LLMConfig;
use crate::llm::{GenerationError, GenerationParams, TextGenerator};

mod providers;

use providers::ProviderClient;

/// 所有生成调用共用的系统提示词
const PREAMBLE: &str = "あなたは日本の英語教育に精通した、正確さを重んじる専門家です。指示に忠実に従って出力してください。";

/// LLM客户端 - 提供统一的LLM服务接口
#[derive(Clone)]
pub struct LLMClient {
    config: LLMConfig,
    client: ProviderClient,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: LLMConfig) -> Result<Self, GenerationError> {
        let client = ProviderClient::new(&config)?;
        debug!(
            "LLMClient initialized: provider={}, model={}",
            config.provider, config.model
        );
        Ok(Self { client, config })
    }

    /// 单次调用，带超时与空响应检查
    async fn generate_once(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, GenerationError> {
        let agent = self
            .client
            .create_agent(&self.config.model, PREAMBLE, params)?;

        let text = with_timeout(self.config.timeout_seconds, agent.prompt(prompt)).await??;

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for LLMClient {
    async fn generate(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, GenerationError> {
        let text = retry_with_backoff(
            self.config.retry_attempts,
            Duration::from_millis(self.config.retry_delay_ms),
            || self.generate_once(prompt, params),
        )
        .await?;
        debug!("Generated text successfully ({} chars)", text.chars().count());
        Ok(text)
    }
}

/// 通用重试逻辑，最多尝试 `max_attempts` 次（至少1次），每次失败后固定等待 `delay`
pub async fn retry_with_backoff<T, F, Fut>(
    max_attempts: u32,
    delay: Duration,
    operation: F,
) -> Result<T, GenerationError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let max_retries = max_attempts.max(1);
    let mut retries = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                retries += 1;
                warn!(
                    "❌ 调用模型服务出错 (第 {} / {}次尝试): {}",
                    retries, max_retries, err
                );
                if retries >= max_retries {
                    return Err(err);
                }
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// 为单次调用加上超时限制
pub async fn with_timeout<Fut>(timeout_seconds: u64, call: Fut) -> Result<Fut::Output, GenerationError>
where
    Fut: Future,
{
    tokio::time::timeout(Duration::from_secs(timeout_seconds), call)
        .await
        .map_err(|_| GenerationError::Timeout(timeout_seconds))
}
