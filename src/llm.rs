//! Chat completion clients.
//!
//! [`CompletionClient`] is the boundary every generating operation goes
//! through. [`OpenAiChatClient`] talks to an OpenAI-compatible
//! `POST {url}/chat/completions`; [`DisabledClient`] fails every call and is
//! used when `[llm] provider = "disabled"`.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::LlmConfig;
use crate::http::{api_key_from_env, build_client, post_json_with_retry};

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the text of the first choice.
    async fn complete(&self, messages: &[ChatMessage], options: CompletionOptions)
        -> Result<String>;
}

pub struct DisabledClient;

#[async_trait]
impl CompletionClient for DisabledClient {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _options: CompletionOptions,
    ) -> Result<String> {
        bail!("LLM provider is disabled. Set [llm] provider in config.")
    }
}

pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl OpenAiChatClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_retries,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = api_key_from_env(&config.api_key_env)?;
        let base_url = config.url.as_deref().unwrap_or(DEFAULT_OPENAI_URL);

        Ok(Self::new(
            build_client(config.timeout_secs)?,
            base_url.trim_end_matches('/'),
            api_key,
            model,
            config.max_retries,
        ))
    }
}

#[async_trait]
impl CompletionClient for OpenAiChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });
        let url = format!("{}/chat/completions", self.base_url);
        let response = post_json_with_retry(
            &self.client,
            &url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_chat_response(&response)
    }
}

fn parse_chat_response(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}

pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn CompletionClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledClient)),
        "openai" => Ok(Arc::new(OpenAiChatClient::from_config(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_serialize_with_lowercase_roles() {
        let json = serde_json::to_value([ChatMessage::system("s"), ChatMessage::user("u")]).unwrap();
        assert_eq!(
            json,
            json!([{"role": "system", "content": "s"}, {"role": "user", "content": "u"}])
        );
    }

    #[test]
    fn test_parse_chat_response() {
        let json = json!({"choices": [{"message": {"role": "assistant", "content": "hi"}}]});
        assert_eq!(parse_chat_response(&json).unwrap(), "hi");
        assert!(parse_chat_response(&json!({"choices": []})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_client_fails() {
        let options = CompletionOptions {
            temperature: 0.3,
            max_tokens: 10,
        };
        assert!(DisabledClient.complete(&[], options).await.is_err());
    }
}
