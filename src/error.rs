//! Error taxonomy for the capability runtime.
//!
//! Library code returns [`CapabilityError`]; the binary and tool handlers
//! work in `anyhow` and wrap these with context at the edges.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the parser, registry, loader, router and
/// conversation loop.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("config not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("invalid structure in {}: {reason}", .path.display())]
    InvalidStructure { path: PathBuf, reason: String },

    #[error("invalid frontmatter: {0}")]
    InvalidFrontmatter(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid description: {0}")]
    InvalidDescription(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("no matching agent for request")]
    NoMatchingAgent,

    #[error("{kind} is disabled: {name}")]
    Disabled { kind: &'static str, name: String },

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("max rounds exceeded ({0})")]
    MaxRoundsExceeded(usize),

    #[error("model error: {0}")]
    ModelError(String),

    #[error("path escapes base directory: {}", .0.display())]
    PathEscape(PathBuf),

    #[error("command rejected by safety policy: {0}")]
    UnsafeCommand(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CapabilityError {
    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// `true` for the validation family (name, description, config).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidName(_) | Self::InvalidDescription(_) | Self::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CapabilityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_embed_the_offending_name() {
        let err = CapabilityError::not_found("agent", "ghost");
        assert_eq!(err.to_string(), "agent not found: ghost");

        let err = CapabilityError::InvalidName("name must not contain '--': a--b".into());
        assert!(err.to_string().contains("a--b"));
        assert!(err.is_validation());
        assert!(!CapabilityError::NoMatchingAgent.is_validation());
    }
}
