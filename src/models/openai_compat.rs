//! Client for any OpenAI-compatible chat completions API (OpenAI,
//! OpenRouter, Ollama, vLLM, LM Studio, ...).
//!
//! ```yaml
//! model:
//!   endpoint: http://localhost:11434/v1/chat/completions
//!   model: llama3
//!   api_key: $OLLAMA_KEY   # optional
//! ```

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{parse_assistant_message, parse_token_usage, serialize_messages};
use super::{ChatMessage, ChatModel, ModelReply, ToolDefinition};

pub struct OpenAICompatClient {
    api_key: String,
    endpoint: String,
    model: String,
    client: Client,
}

impl std::fmt::Debug for OpenAICompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAICompatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAICompatClient {
    /// `api_key` may be empty for local servers that don't require auth.
    pub fn new(endpoint: String, api_key: String, model: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self::with_client(client, endpoint, api_key, model))
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(client: Client, endpoint: String, api_key: String, model: String) -> Self {
        Self {
            api_key,
            endpoint,
            model,
            client,
        }
    }

    async fn post(&self, body: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let mut req = self.client.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let resp = req.send().await.context("chat completion request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI-compat API returned {status}: {text}");
        }
        resp.json().await.context("invalid chat completion body")
    }
}

#[async_trait]
impl ChatModel for OpenAICompatClient {
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> anyhow::Result<ModelReply> {
        let mut body = json!({
            "model": self.model,
            "messages": serialize_messages(messages),
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "chat completion");

        let json = tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("request cancelled"),
            r = self.post(body) => r?,
        };

        let message = parse_assistant_message(&json)
            .ok_or_else(|| anyhow::anyhow!("response has no choices[0].message"))?;
        Ok(ModelReply {
            message,
            usage: parse_token_usage(&json),
        })
    }

    fn name(&self) -> &str {
        &self.model
    }
}
