//! 测试用的可编排文本生成服务

use async_trait::async_trait;
use std::sync::Mutex;

use crate::llm::{GenerationError, GenerationParams, TextGenerator};

type Responder = Box<dyn Fn(&str) -> Result<String, GenerationError> + Send + Sync>;

/// 根据prompt内容返回预设响应，并记录所有调用
pub struct ScriptedGenerator {
    responder: Responder,
    calls: Mutex<Vec<(String, GenerationParams)>>,
}

impl ScriptedGenerator {
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String, GenerationError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 总是返回同一段文本
    pub fn always(text: &str) -> Self {
        let text = text.to_string();
        Self::from_fn(move |_| Ok(text.clone()))
    }

    /// 总是失败
    pub fn failing() -> Self {
        Self::from_fn(|_| Err(GenerationError::Request("connection refused".to_string())))
    }

    pub fn calls(&self) -> Vec<(String, GenerationParams)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), params));
        (self.responder)(prompt)
    }
}
