//! Invocable skills.
//!
//! A skill whose front-matter carries a `provider` block can be offered
//! to the model as a tool. `builtin` providers dispatch to an in-process
//! handler registered in [`BuiltinSkills`]; `http` providers POST the
//! call arguments as JSON to the configured endpoint.
//!
//! ```yaml
//! ---
//! name: lint-report
//! description: Run the linter service and summarise findings
//! provider:
//!   type: http
//!   endpoint: http://localhost:8080/lint
//!   timeout: 20
//!   headers:
//!     X-Team: platform
//! parameters:
//!   type: object
//!   properties:
//!     path: { type: string }
//! ---
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::capability::{ProviderKind, ProviderSpec, Skill, SkillKind};
use crate::models::{ToolCall, ToolDefinition, ToolResult};
use crate::registry::Registry;
use crate::tools::{handler, ToolHandler, ToolRegistryBuilder};

/// Timeout for `http` providers that don't set one.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// In-process handlers for `builtin` skills, keyed by skill name.
#[derive(Default, Clone)]
pub struct BuiltinSkills {
    handlers: HashMap<String, ToolHandler>,
}

impl std::fmt::Debug for BuiltinSkills {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_list().entries(names).finish()
    }
}

impl BuiltinSkills {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: ToolHandler) -> &mut Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolHandler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

#[derive(Debug)]
pub struct SkillInvoker {
    registry: Arc<Registry<SkillKind>>,
    builtins: BuiltinSkills,
    client: Client,
}

fn default_parameters() -> Value {
    json!({ "type": "object", "properties": {} })
}

impl SkillInvoker {
    pub fn new(registry: Arc<Registry<SkillKind>>, builtins: BuiltinSkills, client: Client) -> Self {
        Self {
            registry,
            builtins,
            client,
        }
    }

    /// Tool definitions for every enabled skill that has a provider.
    pub fn to_tools(&self) -> Vec<ToolDefinition> {
        let mut skills: Vec<Arc<Skill>> = self
            .registry
            .list_enabled()
            .into_iter()
            .filter(|s| s.provider.is_some())
            .collect();
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
            .iter()
            .map(|s| {
                ToolDefinition::new(
                    s.name.clone(),
                    s.description.clone(),
                    s.parameters.clone().unwrap_or_else(default_parameters),
                )
            })
            .collect()
    }

    /// Execute a model tool call against the named skill. Never fails;
    /// problems become error-flagged results.
    pub async fn invoke(&self, call: &ToolCall, base_path: &Path, cancel: &CancellationToken) -> ToolResult {
        let name = call.function.name.as_str();
        let skill = match self.lookup(name) {
            Ok(s) => s,
            Err(msg) => return ToolResult::error(msg),
        };
        let args = if call.function.arguments.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str(&call.function.arguments) {
                Ok(v) => v,
                Err(e) => return ToolResult::error(format!("Execution failed: invalid arguments: {e}")),
            }
        };

        match self.execute(&skill, args, base_path.to_path_buf(), cancel.clone()).await {
            Ok(content) => ToolResult::ok(content),
            Err(e) => {
                warn!(skill = name, error = %e, "skill execution failed");
                ToolResult::error(format!("Execution failed: {e:#}"))
            }
        }
    }

    /// The named skill if it exists and is enabled, else the error text
    /// reported to the model.
    fn lookup(&self, name: &str) -> std::result::Result<Arc<Skill>, String> {
        let Ok(skill) = self.registry.get(name) else {
            return Err(format!("Skill not found: {name}"));
        };
        if !self.registry.is_enabled(name) {
            return Err(format!("Skill is disabled: {name}"));
        }
        Ok(skill)
    }

    async fn execute(
        &self,
        skill: &Skill,
        args: Value,
        base_path: PathBuf,
        cancel: CancellationToken,
    ) -> anyhow::Result<String> {
        let provider = skill
            .provider
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("skill {} has no provider", skill.name))?;
        debug!(skill = %skill.name, provider = ?provider.kind, "invoking skill");
        match provider.kind {
            ProviderKind::Builtin => {
                let h = self
                    .builtins
                    .get(&skill.name)
                    .ok_or_else(|| anyhow::anyhow!("no builtin handler registered for {}", skill.name))?;
                h(args, base_path, cancel).await
            }
            ProviderKind::Http => {
                tokio::select! {
                    _ = cancel.cancelled() => anyhow::bail!("cancelled"),
                    r = self.post(&skill.name, provider, args) => r,
                }
            }
        }
    }

    async fn post(&self, skill: &str, provider: &ProviderSpec, args: Value) -> anyhow::Result<String> {
        let endpoint = provider
            .endpoint
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("skill {skill}: http provider has no endpoint"))?;
        let timeout = provider
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);

        let mut req = self.client.post(endpoint).timeout(timeout).json(&args);
        for (k, v) in &provider.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("request to {endpoint} failed"))?;

        let status = resp.status();
        let text = resp.text().await.context("failed to read response body")?;
        if !status.is_success() {
            anyhow::bail!("{endpoint} returned {status}: {text}");
        }
        // Re-serialize JSON so the model sees a compact document.
        Ok(match serde_json::from_str::<Value>(&text) {
            Ok(v) => v.to_string(),
            Err(_) => text,
        })
    }

    /// Add every invocable skill to `builder` so the conversation loop can
    /// call skills like any other tool. The set is fixed at build time.
    pub fn register_tools(self: &Arc<Self>, builder: &mut ToolRegistryBuilder) -> usize {
        let defs = self.to_tools();
        let count = defs.len();
        for def in defs {
            let invoker = Arc::clone(self);
            let name = def.name().to_string();
            builder.register(
                def,
                handler(move |args, base, cancel| {
                    let invoker = Arc::clone(&invoker);
                    let name = name.clone();
                    async move {
                        let skill = invoker.lookup(&name).map_err(anyhow::Error::msg)?;
                        invoker.execute(&skill, args, base, cancel).await
                    }
                }),
            );
        }
        count
    }
}
