//! Chat completion client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::Role;
use crate::search::with_retry;

/// One message in a completion prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Speaker role
    pub role: Role,
    /// Message text
    pub content: String,
}

impl PromptMessage {
    /// System prompt message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Chat completion abstraction, stateless per call
#[async_trait]
pub trait ChatCompletionService: Send + Sync {
    /// Generate one completion for the given prompt
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String>;
}

/// OpenAI-compatible chat completions client
pub struct OpenAiChatService {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
}

impl OpenAiChatService {
    /// Build a client from the llm section of the app config
    pub fn new(config: &AppConfig) -> Result<Self> {
        let llm = &config.llm;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(llm.request_timeout))
            .build()
            .map_err(|e| AppError::Config(format!("llm http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: llm.endpoint.clone(),
            api_key: llm.api_key.clone(),
            model: llm.model.clone(),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            max_retries: llm.max_retries,
        })
    }
}

#[async_trait]
impl ChatCompletionService for OpenAiChatService {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = with_retry(self.max_retries, 200, || async {
            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;

            let status = resp.status();
            if status.is_server_error() {
                return Err(AppError::Connection(format!("llm returned {status}")));
            }
            if !status.is_success() {
                return Err(AppError::Llm(format!("llm returned {status}")));
            }
            let parsed: serde_json::Value = resp.json().await?;
            Ok(parsed)
        })
        .await?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AppError::Llm("completion response missing content".to_string()))?
            .to_string();

        debug!(model = %self.model, chars = content.len(), "completion generated");
        Ok(content)
    }
}

/// Create the production chat completion service
pub fn create_chat_service(config: &AppConfig) -> Result<Arc<dyn ChatCompletionService>> {
    Ok(Arc::new(OpenAiChatService::new(config)?))
}
