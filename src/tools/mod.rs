//! Tool registry and safe executor.
//!
//! A [`ToolRegistry`] pairs each advertised [`ToolDefinition`] with an
//! async handler. It is assembled once through [`ToolRegistryBuilder`] and
//! is read-only afterwards, so one [`ToolExecutor`] can serve concurrent
//! conversations.
//!
//! Handler failures never abort a conversation: the executor folds every
//! problem (unknown tool, bad arguments, handler error) into an
//! error-flagged [`ToolResult`] the model can read and react to.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{CapabilityError, Result};
use crate::models::{ToolCall, ToolDefinition, ToolResult};
use crate::policy::Policy;

pub mod builtins;
pub mod safety;

/// Default cap on a single tool result.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 10_000;

/// Async tool handler: `(arguments, base_path, cancel) -> text`.
pub type ToolHandler = Arc<
    dyn Fn(Value, PathBuf, CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send>>
        + Send
        + Sync,
>;

/// Wrap an async fn or closure as a [`ToolHandler`].
pub fn handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Value, PathBuf, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    Arc::new(move |args, base, cancel| Box::pin(f(args, base, cancel)))
}

// ── Registry ────────────────────────────────────────────────

struct ToolEntry {
    definition: ToolDefinition,
    handler: ToolHandler,
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    entries: Vec<ToolEntry>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A later registration with the same name replaces the
    /// earlier one.
    pub fn register(&mut self, definition: ToolDefinition, handler: ToolHandler) -> &mut Self {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.definition.name() == definition.name())
        {
            warn!(tool = %definition.name(), "tool registered twice; replacing");
            existing.definition = definition;
            existing.handler = handler;
        } else {
            self.entries.push(ToolEntry { definition, handler });
        }
        self
    }

    pub fn build(self) -> ToolRegistry {
        let index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.definition.name().to_string(), i))
            .collect();
        ToolRegistry {
            entries: self.entries,
            index,
        }
    }
}

pub struct ToolRegistry {
    entries: Vec<ToolEntry>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<&ToolHandler> {
        self.index.get(name).map(|&i| &self.entries[i].handler)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(|e| e.definition.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.definition.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Output shaping ──────────────────────────────────────────

/// Cut `s` to at most `max_bytes` on a char boundary and append a marker
/// saying how many bytes were dropped.
pub fn truncate_output(mut s: String, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let cut = s.len() - end;
    s.truncate(end);
    s.push_str(&format!("\n... ({cut} more bytes truncated)"));
    s
}

fn parse_arguments(raw: &str) -> std::result::Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
}

// ── Executor ────────────────────────────────────────────────

/// Runs model-requested tool calls against a [`ToolRegistry`].
#[derive(Debug)]
pub struct ToolExecutor {
    registry: ToolRegistry,
    max_result_bytes: usize,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }

    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Every registered tool definition.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Definitions admitted by `policy`.
    pub fn definitions_for(&self, policy: &Policy) -> Vec<ToolDefinition> {
        policy.filter(self.registry.definitions(), |d| d.name())
    }

    /// Execute one call. Never fails: problems become error results.
    pub async fn execute(&self, call: &ToolCall, base_path: &Path, cancel: &CancellationToken) -> ToolResult {
        self.execute_with_policy(call, &Policy::default(), base_path, cancel)
            .await
    }

    /// Like [`execute`](Self::execute), but a name `policy` rejects is
    /// refused before any handler lookup.
    pub async fn execute_with_policy(
        &self,
        call: &ToolCall,
        policy: &Policy,
        base_path: &Path,
        cancel: &CancellationToken,
    ) -> ToolResult {
        if call.kind != "function" {
            return ToolResult::error(format!("Unsupported tool call type: {}", call.kind));
        }
        let name = call.function.name.as_str();
        if !policy.is_allowed(name) {
            warn!(tool = name, call_id = %call.id, "tool call rejected by policy");
            return ToolResult::error(format!("Tool not allowed: {name}"));
        }
        let Some(handler) = self.registry.get(name) else {
            return ToolResult::error(format!("Unknown tool: {name}"));
        };
        let args = match parse_arguments(&call.function.arguments) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("Invalid arguments for {name}: {e}")),
        };

        debug!(tool = name, call_id = %call.id, "executing tool");
        let fut = handler(args, base_path.to_path_buf(), cancel.clone());
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return ToolResult::error(format!("Tool {name} cancelled")),
            r = fut => r,
        };

        match outcome {
            Ok(out) => ToolResult::ok(truncate_output(out, self.max_result_bytes)),
            Err(e) => {
                debug!(tool = name, error = %e, "tool failed");
                ToolResult::error(truncate_output(
                    format!("Tool {name} failed: {e:#}"),
                    self.max_result_bytes,
                ))
            }
        }
    }

    /// Execute calls in order.
    pub async fn execute_all(
        &self,
        calls: &[ToolCall],
        base_path: &Path,
        cancel: &CancellationToken,
    ) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call, base_path, cancel).await);
        }
        results
    }

    /// Check that every call names a known tool and carries JSON arguments.
    pub fn validate_tool_calls(&self, calls: &[ToolCall]) -> Result<()> {
        for call in calls {
            if !self.registry.contains(&call.function.name) {
                return Err(CapabilityError::not_found("tool", call.function.name.clone()));
            }
            if let Err(e) = parse_arguments(&call.function.arguments) {
                return Err(CapabilityError::ExecutionFailed(format!(
                    "invalid arguments for {}: {e}",
                    call.function.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_registry() -> ToolRegistry {
        let mut b = ToolRegistry::builder();
        b.register(
            ToolDefinition::new("echo", "Echo the `text` argument", json!({"type": "object"})),
            handler(|args, _base, _cancel| async move {
                Ok(args["text"].as_str().unwrap_or_default().to_string())
            }),
        );
        b.register(
            ToolDefinition::new("fail", "Always fails", json!({"type": "object"})),
            handler(|_args, _base, _cancel| async move { Err(anyhow::anyhow!("boom")) }),
        );
        b.build()
    }

    #[test]
    fn truncation_reports_dropped_bytes() {
        let out = truncate_output("x".repeat(10_005), 10_000);
        assert!(out.starts_with(&"x".repeat(10_000)));
        assert!(out.ends_with("\n... (5 more bytes truncated)"));
        assert_eq!(truncate_output("short".into(), 10), "short");

        // 'é' is two bytes; never split it.
        let out = truncate_output("éé".into(), 3);
        assert!(out.starts_with("é\n"));
        assert!(out.contains("(2 more bytes truncated)"));
    }

    #[tokio::test]
    async fn executes_known_tool() {
        let exec = ToolExecutor::new(echo_registry());
        let call = ToolCall::function("1", "echo", r#"{"text":"hello"}"#);
        let r = exec.execute(&call, Path::new("."), &CancellationToken::new()).await;
        assert_eq!(r, ToolResult::ok("hello"));
    }

    #[tokio::test]
    async fn policy_rejects_before_the_handler_runs() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let mut b = ToolRegistry::builder();
        b.register(
            ToolDefinition::new("touch", "Side effect", json!({"type": "object"})),
            handler(move |_args, _base, _cancel| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok("touched".to_string())
                }
            }),
        );
        let exec = ToolExecutor::new(b.build());
        let cancel = CancellationToken::new();
        let call = ToolCall::function("1", "touch", "{}");

        let denied = Policy::new(vec![], vec!["touch".into()]);
        let r = exec.execute_with_policy(&call, &denied, Path::new("."), &cancel).await;
        assert_eq!(r, ToolResult::error("Tool not allowed: touch"));
        let outside_allow = Policy::new(vec!["other".into()], vec![]);
        let r = exec.execute_with_policy(&call, &outside_allow, Path::new("."), &cancel).await;
        assert_eq!(r.content, "Tool not allowed: touch");
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let r = exec.execute(&call, Path::new("."), &cancel).await;
        assert_eq!(r, ToolResult::ok("touched"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_become_error_results() {
        let exec = ToolExecutor::new(echo_registry());
        let cancel = CancellationToken::new();

        let r = exec.execute(&ToolCall::function("1", "nope", "{}"), Path::new("."), &cancel).await;
        assert!(r.is_error && r.content.contains("Unknown tool: nope"));

        let r = exec.execute(&ToolCall::function("2", "fail", "{}"), Path::new("."), &cancel).await;
        assert!(r.is_error && r.content.contains("boom"));

        let r = exec.execute(&ToolCall::function("3", "echo", "{not json"), Path::new("."), &cancel).await;
        assert!(r.is_error && r.content.contains("Invalid arguments"));

        let mut odd = ToolCall::function("4", "echo", "{}");
        odd.kind = "retrieval".into();
        let r = exec.execute(&odd, Path::new("."), &cancel).await;
        assert!(r.is_error && r.content.contains("retrieval"));
    }

    #[tokio::test]
    async fn oversized_output_is_truncated() {
        let exec = ToolExecutor::new(echo_registry()).with_max_result_bytes(4);
        let call = ToolCall::function("1", "echo", r#"{"text":"abcdefgh"}"#);
        let r = exec.execute(&call, Path::new("."), &CancellationToken::new()).await;
        assert_eq!(r.content, "abcd\n... (4 more bytes truncated)");
    }

    #[test]
    fn validates_calls_and_filters_definitions() {
        let exec = ToolExecutor::new(echo_registry());
        assert!(exec.validate_tool_calls(&[ToolCall::function("1", "echo", "")]).is_ok());
        assert!(exec.validate_tool_calls(&[ToolCall::function("1", "ghost", "{}")]).is_err());
        assert!(exec.validate_tool_calls(&[ToolCall::function("1", "echo", "[")]).is_err());

        let policy = Policy::new(vec![], vec!["fail".into()]);
        let names: Vec<_> = exec.definitions_for(&policy).into_iter().map(|d| d.function.name).collect();
        assert_eq!(names, vec!["echo".to_string()]);
    }
}
