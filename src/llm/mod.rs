//! 文本生成服务 - 所有合成阶段共用的LLM调用边界

use async_trait::async_trait;
use thiserror::Error;

pub mod client;

#[cfg(test)]
pub mod mock;

pub use client::LLMClient;

/// 单次生成调用的参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// 最大生成token数
    pub max_tokens: u32,
    /// 温度，取值范围 [0, 1]
    pub temperature: f64,
}

impl GenerationParams {
    pub fn new(max_tokens: u32, temperature: f64) -> Self {
        Self {
            max_tokens,
            temperature: temperature.clamp(0.0, 1.0),
        }
    }
}

/// 文本生成失败的原因
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("missing API key for provider {0}")]
    MissingApiKey(String),

    #[error("failed to build provider client: {0}")]
    ClientBuild(String),

    #[error("completion request failed: {0}")]
    Request(String),

    #[error("completion timed out after {0}s")]
    Timeout(u64),

    #[error("model returned an empty response")]
    EmptyResponse,
}

/// 文本生成服务
///
/// 给定prompt返回生成的文本。后端不可达、未认证、超时或返回空文本时失败。
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, GenerationError>;

    /// 检查模型连接是否正常
    async fn check_connection(&self) -> Result<(), GenerationError> {
        self.generate("Hello", GenerationParams::new(16, 0.0))
            .await
            .map(|_| ())
    }
}
