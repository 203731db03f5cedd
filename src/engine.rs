use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::Settings;

pub const STUBBED_RESPONSE: &str = "I'm a local AI model, running offline!";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to LLM failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("LLM returned HTTP {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("failed to decode LLM response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("no choices in response")]
    NoChoices,

    #[error("LLM did not answer within {0:?}")]
    Timeout(Duration),
}

/// 统一的生成后端抽象
#[async_trait]
pub trait LlmEngine: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// stubbed 模式：固定回复，不发任何网络请求
pub struct StubEngine;

#[async_trait]
impl LlmEngine for StubEngine {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok(STUBBED_RESPONSE.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

impl ChatCompletionRequest {
    pub fn single_user_message(model: &str, prompt: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            }],
        }
    }
}

/// 取第一个 choice 的内容
pub fn first_choice(response: ChatCompletionResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or(LlmError::NoChoices)
}

/// `base` 末尾没有 `/` 时补上，否则 join 会吃掉最后一段路径
pub fn completions_url(base: &Url) -> Url {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    // 相对路径 join 对 http(s) 基址总是成功
    base.join("chat/completions").unwrap_or(base)
}

/// OpenAI 兼容的 chat completion 客户端（Ollama、vLLM、llama.cpp server 等）
pub struct OpenAiEngine {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiEngine {
    pub fn new(
        base_url: &Url,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder().build().map_err(LlmError::Transport)?;

        Ok(Self {
            client,
            endpoint: completions_url(base_url),
            model: model.to_string(),
            api_key,
            timeout,
        })
    }

    async fn send(&self, prompt: &str) -> Result<String, LlmError> {
        let body = ChatCompletionRequest::single_user_message(&self.model, prompt);

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(LlmError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP error: {}", status));
            return Err(LlmError::Api { status, body });
        }

        let parsed = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(LlmError::Decode)?;
        debug!(choices = parsed.choices.len(), "LLM answered");

        first_choice(parsed)
    }
}

#[async_trait]
impl LlmEngine for OpenAiEngine {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        match tokio::time::timeout(self.timeout, self.send(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.timeout)),
        }
    }
}

/// 根据配置选择 Engine
pub fn build_engine(settings: &Settings) -> Result<Arc<dyn LlmEngine>, LlmError> {
    if settings.stubbed {
        return Ok(Arc::new(StubEngine));
    }

    let engine = OpenAiEngine::new(
        &settings.llm_base_url,
        &settings.llm_model,
        settings.llm_api_key.clone(),
        settings.llm_timeout,
    )?;
    Ok(Arc::new(engine))
}
