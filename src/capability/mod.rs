//! Capability units: the two catalog kinds (agents and skills) behind one
//! generic [`CapabilityKind`] trait.
//!
//! The registry, loader and watcher are written once against this trait;
//! each kind supplies the hooks that differ: where a unit lives on disk,
//! how it is parsed and validated, how duplicate registration behaves and
//! how the watcher should lay out its snapshot.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::registry::RegisterStrategy;
use crate::watcher::WatchLayout;

pub mod agent;
pub mod clock;
pub mod skill;
pub mod validate;

pub use agent::{Agent, AgentKind, McpPolicy, RiskLevel, RuntimePolicy};
pub use clock::{Clock, FixedClock, SystemClock};
pub use skill::{ProviderKind, ProviderSpec, ResourceFlags, Skill, SkillKind, SkillRisk};

/// Accessors every capability record exposes to the generic machinery.
pub trait Unit: std::fmt::Debug + Send + Sync + 'static {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// Path the unit was loaded from (file for agents, directory for skills).
    fn source_path(&self) -> &Path;
    fn loaded_at(&self) -> DateTime<Utc>;
}

/// Kind-specific hooks for the shared load/register/watch pipeline.
pub trait CapabilityKind: Send + Sync + 'static {
    type Unit: Unit;

    /// Lower-case label used in errors and log fields.
    const KIND: &'static str;

    /// Behaviour of [`Registry::register`](crate::registry::Registry::register)
    /// on a name that is already present.
    const REGISTER_STRATEGY: RegisterStrategy;

    /// Whether the watcher reports pre-existing entries as `Create` on its
    /// initial scan.
    const EMIT_INITIAL_CREATES: bool;

    /// Directory-listing shape for the watcher.
    fn watch_layout() -> WatchLayout;

    /// Return `true` if `path` (an immediate child of the catalog
    /// directory) looks like a unit of this kind.
    fn is_candidate(path: &Path) -> bool;

    /// Parse and validate the unit at `location`, returning the record and
    /// its instruction body (empty when the kind has none).
    fn parse(location: &Path, clock: &dyn Clock) -> Result<(Self::Unit, String)>;
}

/// Hidden entries (dot-prefixed) are never catalog units.
pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}
