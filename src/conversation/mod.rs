//! Bounded multi-round tool-calling conversation.
//!
//! One call to [`ConversationLoop::run`] drives a single exchange:
//! build `[system] + history + [user]`, ask the model, execute any
//! requested tools through the [`ToolExecutor`], feed the results back,
//! and repeat until the model answers without tool calls or the round
//! budget runs out.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{CapabilityError, Result};
use crate::models::{ChatMessage, ChatModel, TokenUsage, ToolDefinition, ROLE_SYSTEM};
use crate::policy::Policy;
use crate::tools::ToolExecutor;

/// Round budget for agent conversations.
pub const DEFAULT_MAX_ROUNDS: usize = 10;
/// Round budget for [`ConversationLoop::chat`].
pub const CHAT_MAX_ROUNDS: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct ConversationOptions {
    /// Prior turns. System messages in here are dropped.
    pub history: Vec<ChatMessage>,
    /// Overrides the caller's round budget.
    pub max_steps: Option<usize>,
    /// Working directory handed to tool handlers. Defaults to the
    /// current directory.
    pub base_path: Option<PathBuf>,
    /// Tool calls this policy rejects are answered with an error result
    /// and never reach a handler.
    pub policy: Policy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallSummary {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationResult {
    /// Final assistant text.
    pub content: String,
    /// Full history, system message included.
    pub messages: Vec<ChatMessage>,
    /// Model calls made.
    pub steps: usize,
    pub tool_calls: Vec<ToolCallSummary>,
    pub usage: TokenUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ConversationResult {
    /// Total number of tool invocations across all rounds.
    pub fn total_tool_calls(&self) -> usize {
        self.tool_calls.iter().map(|t| t.count).sum()
    }
}

pub struct ConversationLoop {
    model: Arc<dyn ChatModel>,
    executor: Arc<ToolExecutor>,
}

impl std::fmt::Debug for ConversationLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationLoop")
            .field("model", &self.model.name())
            .field("executor", &self.executor)
            .finish()
    }
}

/// `[system] + history (minus system messages) + [user]`.
pub fn build_messages(system_prompt: &str, history: &[ChatMessage], user_message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(history.iter().filter(|m| m.role != ROLE_SYSTEM).cloned());
    messages.push(ChatMessage::user(user_message));
    messages
}

impl ConversationLoop {
    pub fn new(model: Arc<dyn ChatModel>, executor: Arc<ToolExecutor>) -> Self {
        Self { model, executor }
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    /// Run with every registered tool and a budget of [`CHAT_MAX_ROUNDS`].
    pub async fn chat(
        &self,
        system_prompt: &str,
        user_message: &str,
        options: &ConversationOptions,
        cancel: &CancellationToken,
    ) -> Result<ConversationResult> {
        let tools = self.executor.definitions();
        self.run(system_prompt, user_message, &tools, options, CHAT_MAX_ROUNDS, cancel)
            .await
    }

    /// Drive the conversation with the given tool set.
    ///
    /// `options.max_steps` wins over `max_rounds`. The model is called at
    /// most that many times; if every call asked for tools the result is
    /// [`CapabilityError::MaxRoundsExceeded`] and the partial history is
    /// discarded.
    pub async fn run(
        &self,
        system_prompt: &str,
        user_message: &str,
        tools: &[ToolDefinition],
        options: &ConversationOptions,
        max_rounds: usize,
        cancel: &CancellationToken,
    ) -> Result<ConversationResult> {
        let max_rounds = options.max_steps.unwrap_or(max_rounds);
        let base_path = match &options.base_path {
            Some(p) => p.clone(),
            None => std::env::current_dir()?,
        };
        let started_at = Utc::now();
        let mut messages = build_messages(system_prompt, &options.history, user_message);
        let mut usage = TokenUsage::default();
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();

        debug!(
            model = %self.model.name(),
            tools = tools.len(),
            max_rounds,
            "conversation started"
        );

        for step in 1..=max_rounds {
            if cancel.is_cancelled() {
                return Err(CapabilityError::Cancelled);
            }

            let reply = match self.model.chat_with_tools(&messages, tools, cancel).await {
                Ok(r) => r,
                Err(_) if cancel.is_cancelled() => return Err(CapabilityError::Cancelled),
                Err(e) => {
                    warn!(step, error = %e, "model call failed");
                    return Err(CapabilityError::ModelError(format!("{e:#}")));
                }
            };
            if let Some(u) = &reply.usage {
                usage.accumulate(u);
            }

            let assistant = reply.message;
            let calls = assistant.tool_calls.clone();
            messages.push(assistant);

            if calls.is_empty() {
                let content = messages
                    .last()
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                let tool_calls = counts
                    .into_iter()
                    .map(|(name, count)| ToolCallSummary { name, count })
                    .collect();
                info!(steps = step, total_tokens = usage.total_tokens, "conversation completed");
                return Ok(ConversationResult {
                    content,
                    messages,
                    steps: step,
                    tool_calls,
                    usage,
                    agent_name: None,
                    started_at,
                    finished_at: Utc::now(),
                });
            }

            for call in &calls {
                *counts.entry(call.function.name.clone()).or_default() += 1;
                let result = self
                    .executor
                    .execute_with_policy(call, &options.policy, &base_path, cancel)
                    .await;
                if result.is_error {
                    debug!(tool = %call.function.name, "tool returned an error result");
                }
                messages.push(ChatMessage::tool(call.id.clone(), result.content));
            }
            debug!(step, calls = calls.len(), "round finished");
        }

        warn!(max_rounds, "conversation exceeded its round budget");
        Err(CapabilityError::MaxRoundsExceeded(max_rounds))
    }
}
