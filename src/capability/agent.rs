//! Agent units: one YAML or JSON file per agent in a flat directory.
//!
//! ```yaml
//! name: code-reviewer
//! version: v1.2
//! description: Reviews pull requests for correctness and style
//! systemPrompt: |
//!   You are a meticulous reviewer...
//! mcp:
//!   allowed: [filesystem]
//!   maxCalls: 20
//! skills:
//!   allow: [read_file, search_text]
//!   deny: [execute_bash]
//! policies:
//!   riskLevel: read
//!   maxSteps: 8
//!   requireConfirmation: false
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clock::Clock;
use super::validate::{validate_description, validate_name, validate_version};
use super::{is_hidden, CapabilityKind, Unit};
use crate::error::{CapabilityError, Result};
use crate::policy::Policy;
use crate::registry::RegisterStrategy;
use crate::watcher::WatchLayout;

/// File extensions recognised as agent definitions.
pub const AGENT_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Read,
    Write,
    Admin,
}

impl std::str::FromStr for RiskLevel {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "admin" => Ok(Self::Admin),
            other => Err(CapabilityError::InvalidConfig(format!(
                "policies.riskLevel must be one of read, write, admin: {other}"
            ))),
        }
    }
}

/// Which MCP servers the agent may reach and how often.
#[derive(Debug, Clone, Default, Serialize)]
pub struct McpPolicy {
    pub allowed: Vec<String>,
    pub max_calls: u32,
}

impl McpPolicy {
    /// An empty allow-list permits every server.
    pub fn is_allowed(&self, server: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|s| s == server)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimePolicy {
    pub risk_level: RiskLevel,
    /// `0` defers to the executor's default round budget.
    pub max_steps: usize,
    pub require_confirmation: bool,
}

/// A validated agent definition.
#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    pub name: String,
    pub version: String,
    pub description: String,
    pub system_prompt: String,
    pub mcp: McpPolicy,
    /// Sub-capability (tool / skill) allow and deny lists.
    pub skills: Policy,
    pub policies: RuntimePolicy,
    pub source_path: PathBuf,
    pub loaded_at: DateTime<Utc>,
}

impl Agent {
    pub fn is_skill_allowed(&self, name: &str) -> bool {
        self.skills.is_allowed(name)
    }

    pub fn is_mcp_allowed(&self, server: &str) -> bool {
        self.mcp.is_allowed(server)
    }
}

impl Unit for Agent {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn source_path(&self) -> &Path {
        &self.source_path
    }
    fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

// ── On-disk shape ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    system_prompt: String,
    #[serde(default)]
    mcp: McpFile,
    #[serde(default)]
    skills: Policy,
    #[serde(default)]
    policies: PoliciesFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct McpFile {
    #[serde(default)]
    allowed: Vec<String>,
    #[serde(default)]
    max_calls: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoliciesFile {
    #[serde(default)]
    risk_level: String,
    #[serde(default)]
    max_steps: usize,
    #[serde(default)]
    require_confirmation: bool,
}

impl AgentFile {
    fn into_agent(self, source_path: PathBuf, loaded_at: DateTime<Utc>) -> Result<Agent> {
        validate_name(&self.name)?;
        validate_version(&self.version)?;
        validate_description(&self.description)?;
        if self.system_prompt.trim().is_empty() {
            return Err(CapabilityError::InvalidConfig(format!(
                "systemPrompt is required for agent {}",
                self.name
            )));
        }
        let risk_level = self.policies.risk_level.parse()?;

        Ok(Agent {
            name: self.name,
            version: self.version,
            description: self.description,
            system_prompt: self.system_prompt,
            mcp: McpPolicy {
                allowed: self.mcp.allowed,
                max_calls: self.mcp.max_calls,
            },
            skills: self.skills,
            policies: RuntimePolicy {
                risk_level,
                max_steps: self.policies.max_steps,
                require_confirmation: self.policies.require_confirmation,
            },
            source_path,
            loaded_at,
        })
    }
}

/// Decode an agent document, choosing the format by extension.
pub fn parse_agent_str(path: &Path, content: &str, clock: &dyn Clock) -> Result<Agent> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let file: AgentFile = if is_json {
        serde_json::from_str(content).map_err(|e| CapabilityError::InvalidStructure {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    } else {
        serde_yaml::from_str(content).map_err(|e| CapabilityError::InvalidStructure {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    };

    file.into_agent(path.to_path_buf(), clock.now())
}

// ── Kind hooks ──────────────────────────────────────────────

/// Marker type selecting agent behaviour in the generic pipeline.
#[derive(Debug)]
pub struct AgentKind;

impl CapabilityKind for AgentKind {
    type Unit = Agent;

    const KIND: &'static str = "agent";
    const REGISTER_STRATEGY: RegisterStrategy = RegisterStrategy::Upsert;
    const EMIT_INITIAL_CREATES: bool = true;

    fn watch_layout() -> WatchLayout {
        WatchLayout::Flat {
            extensions: AGENT_EXTENSIONS,
        }
    }

    fn is_candidate(path: &Path) -> bool {
        !is_hidden(path) && path.is_file() && has_agent_extension(path)
    }

    fn parse(location: &Path, clock: &dyn Clock) -> Result<(Agent, String)> {
        let content = match std::fs::read_to_string(location) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CapabilityError::ConfigNotFound(location.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let agent = parse_agent_str(location, &content, clock)?;
        Ok((agent, String::new()))
    }
}

pub(crate) fn has_agent_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            AGENT_EXTENSIONS
                .iter()
                .any(|known| e.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
