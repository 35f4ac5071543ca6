//! Allow/deny gating for the tools and skills exposed to an agent.
//!
//! Deny is checked first and always wins; a non-empty allow-list then
//! restricts what is left. Two empty lists let everything through.

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl Policy {
    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        Self { allow, deny }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        if self.deny.iter().any(|d| d == name) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|a| a == name)
    }

    /// Keep the candidates this policy admits, preserving their order.
    pub fn filter<T, F>(&self, candidates: Vec<T>, name_of: F) -> Vec<T>
    where
        F: Fn(&T) -> &str,
    {
        if self.is_unrestricted() {
            return candidates;
        }
        candidates
            .into_iter()
            .filter(|c| {
                let name = name_of(c);
                let keep = self.is_allowed(name);
                if !keep {
                    debug!(name, "filtered out by policy");
                }
                keep
            })
            .collect()
    }
}
