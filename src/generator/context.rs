use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{
    config::Config,
    llm::{LLMClient, TextGenerator},
    search::RetrievalClient,
};

#[derive(Clone)]
pub struct GeneratorContext {
    /// 文本生成服务，所有合成阶段共用
    pub generator: Arc<dyn TextGenerator>,
    /// 信息检索客户端
    pub retrieval: Arc<RetrievalClient>,
    /// 配置
    pub config: Config,
}

impl GeneratorContext {
    /// 根据配置创建生成器上下文
    pub fn new(config: Config) -> Result<Self> {
        let llm_client =
            LLMClient::new(config.llm.clone()).context("Failed to create LLM client")?;
        let retrieval = RetrievalClient::from_config(&config.search)
            .context("Failed to create retrieval client")?;

        Ok(Self::with_services(
            config,
            Arc::new(llm_client),
            Arc::new(retrieval),
        ))
    }

    /// 使用外部提供的服务创建上下文
    pub fn with_services(
        config: Config,
        generator: Arc<dyn TextGenerator>,
        retrieval: Arc<RetrievalClient>,
    ) -> Self {
        Self {
            generator,
            retrieval,
            config,
        }
    }
}
