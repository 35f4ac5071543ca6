//! Agent selection.
//!
//! Resolution order: explicit agent name, then the entry-point route
//! table, then the default agent. A name that was asked for but is not
//! registered is an error; it never falls through to the next step.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::capability::{Agent, AgentKind};
use crate::error::{CapabilityError, Result};
use crate::registry::Registry;

/// What is known about an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RouterContext {
    pub agent_name: Option<String>,
    pub entry_point: Option<String>,
    pub task_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl RouterContext {
    pub fn for_agent(name: impl Into<String>) -> Self {
        Self {
            agent_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn for_entry_point(entry: impl Into<String>) -> Self {
        Self {
            entry_point: Some(entry.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct RouteTable {
    default_agent: Option<String>,
    routes: HashMap<String, String>,
}

#[derive(Debug)]
pub struct Router {
    registry: Arc<Registry<AgentKind>>,
    table: RwLock<RouteTable>,
}

impl Router {
    pub fn new(registry: Arc<Registry<AgentKind>>) -> Self {
        Self {
            registry,
            table: RwLock::new(RouteTable::default()),
        }
    }

    pub fn route(&self, ctx: &RouterContext) -> Result<Arc<Agent>> {
        let non_empty = |s: &Option<String>| s.as_deref().filter(|v| !v.is_empty()).map(str::to_owned);

        let name = if let Some(name) = non_empty(&ctx.agent_name) {
            debug!(agent = %name, "routing by explicit name");
            name
        } else if let Some(target) = non_empty(&ctx.entry_point).and_then(|e| self.route_for(&e)) {
            debug!(agent = %target, "routing by entry point");
            target
        } else if let Some(default) = self.default_agent() {
            debug!(agent = %default, "routing to default agent");
            default
        } else {
            return Err(CapabilityError::NoMatchingAgent);
        };

        let agent = self.registry.get(&name)?;
        if !self.registry.is_enabled(&name) {
            return Err(CapabilityError::Disabled {
                kind: "agent",
                name,
            });
        }
        Ok(agent)
    }

    /// Set the default agent. The name must currently be registered.
    pub fn set_default(&self, name: &str) -> Result<()> {
        if !self.registry.exists(name) {
            return Err(CapabilityError::not_found("agent", name));
        }
        self.table.write().expect("router lock poisoned").default_agent = Some(name.to_string());
        Ok(())
    }

    pub fn default_agent(&self) -> Option<String> {
        self.table.read().expect("router lock poisoned").default_agent.clone()
    }

    pub fn register_route(&self, entry_point: impl Into<String>, agent: impl Into<String>) {
        self.table
            .write()
            .expect("router lock poisoned")
            .routes
            .insert(entry_point.into(), agent.into());
    }

    pub fn remove_route(&self, entry_point: &str) -> Option<String> {
        self.table.write().expect("router lock poisoned").routes.remove(entry_point)
    }

    pub fn route_for(&self, entry_point: &str) -> Option<String> {
        self.table.read().expect("router lock poisoned").routes.get(entry_point).cloned()
    }

    pub fn routes(&self) -> HashMap<String, String> {
        self.table.read().expect("router lock poisoned").routes.clone()
    }
}
