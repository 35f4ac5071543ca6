//! Concurrency-safe in-memory catalog: unique name → unit, with an
//! independent enabled flag per name.
//!
//! One `RwLock` guards the map. Units are handed out as `Arc`s so readers
//! racing a reload see either the old or the new record, never a mix.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::capability::{CapabilityKind, Unit};
use crate::error::{CapabilityError, Result};

/// What [`Registry::register`] does when the name is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterStrategy {
    /// Replace the existing unit (agents).
    Upsert,
    /// Fail with [`CapabilityError::AlreadyExists`] (skills).
    RejectDuplicate,
}

struct Entry<U> {
    unit: Arc<U>,
    enabled: bool,
}

pub struct Registry<K: CapabilityKind> {
    entries: RwLock<HashMap<String, Entry<K::Unit>>>,
    strategy: RegisterStrategy,
    _kind: PhantomData<K>,
}

impl<K: CapabilityKind> Default for Registry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: CapabilityKind> std::fmt::Debug for Registry<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &K::KIND)
            .field("strategy", &self.strategy)
            .field("len", &self.len())
            .finish()
    }
}

impl<K: CapabilityKind> Registry<K> {
    /// Registry using the kind's own duplicate strategy.
    pub fn new() -> Self {
        Self::with_strategy(K::REGISTER_STRATEGY)
    }

    pub fn with_strategy(strategy: RegisterStrategy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            strategy,
            _kind: PhantomData,
        }
    }

    pub fn strategy(&self) -> RegisterStrategy {
        self.strategy
    }

    // ── Writes ──────────────────────────────────────────────

    /// Insert a unit according to the registry's [`RegisterStrategy`].
    /// New names start enabled.
    pub fn register(&self, unit: impl Into<Arc<K::Unit>>) -> Result<()> {
        let unit = unit.into();
        check_name::<K>(&unit)?;
        let mut map = self.entries.write().expect("registry lock poisoned");
        let name = unit.name().to_string();
        match map.get_mut(&name) {
            Some(_) if self.strategy == RegisterStrategy::RejectDuplicate => {
                Err(CapabilityError::AlreadyExists {
                    kind: K::KIND,
                    name,
                })
            }
            Some(existing) => {
                existing.unit = unit;
                debug!(kind = K::KIND, name = %name, "replaced unit");
                Ok(())
            }
            None => {
                map.insert(name, Entry { unit, enabled: true });
                Ok(())
            }
        }
    }

    /// Insert or replace regardless of strategy. Returns `true` when the
    /// name was already present. A replaced unit keeps its enabled flag.
    pub fn upsert(&self, unit: impl Into<Arc<K::Unit>>) -> Result<bool> {
        let unit = unit.into();
        check_name::<K>(&unit)?;
        let mut map = self.entries.write().expect("registry lock poisoned");
        match map.get_mut(unit.name()) {
            Some(existing) => {
                existing.unit = unit;
                Ok(true)
            }
            None => {
                map.insert(unit.name().to_string(), Entry { unit, enabled: true });
                Ok(false)
            }
        }
    }

    pub fn unregister(&self, name: &str) -> Result<Arc<K::Unit>> {
        let mut map = self.entries.write().expect("registry lock poisoned");
        map.remove(name)
            .map(|e| e.unit)
            .ok_or_else(|| CapabilityError::not_found(K::KIND, name))
    }

    pub fn enable(&self, name: &str) -> Result<()> {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> Result<()> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut map = self.entries.write().expect("registry lock poisoned");
        let entry = map
            .get_mut(name)
            .ok_or_else(|| CapabilityError::not_found(K::KIND, name))?;
        entry.enabled = enabled;
        Ok(())
    }

    // ── Reads ───────────────────────────────────────────────

    pub fn get(&self, name: &str) -> Result<Arc<K::Unit>> {
        let map = self.entries.read().expect("registry lock poisoned");
        map.get(name)
            .map(|e| Arc::clone(&e.unit))
            .ok_or_else(|| CapabilityError::not_found(K::KIND, name))
    }

    pub fn exists(&self, name: &str) -> bool {
        let map = self.entries.read().expect("registry lock poisoned");
        map.contains_key(name)
    }

    /// `false` for unknown names.
    pub fn is_enabled(&self, name: &str) -> bool {
        let map = self.entries.read().expect("registry lock poisoned");
        map.get(name).map(|e| e.enabled).unwrap_or(false)
    }

    /// Snapshot of every unit. Order is unspecified.
    pub fn list(&self) -> Vec<Arc<K::Unit>> {
        let map = self.entries.read().expect("registry lock poisoned");
        map.values().map(|e| Arc::clone(&e.unit)).collect()
    }

    /// Snapshot of enabled units. Order is unspecified.
    pub fn list_enabled(&self) -> Vec<Arc<K::Unit>> {
        let map = self.entries.read().expect("registry lock poisoned");
        map.values()
            .filter(|e| e.enabled)
            .map(|e| Arc::clone(&e.unit))
            .collect()
    }

    /// The unit whose recorded source path equals `path`, if any.
    pub fn find_by_source(&self, path: &Path) -> Option<Arc<K::Unit>> {
        let map = self.entries.read().expect("registry lock poisoned");
        map.values()
            .find(|e| e.unit.source_path() == path)
            .map(|e| Arc::clone(&e.unit))
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_name<K: CapabilityKind>(unit: &K::Unit) -> Result<()> {
    if unit.name().is_empty() {
        return Err(CapabilityError::InvalidStructure {
            path: unit.source_path().to_path_buf(),
            reason: format!("{} has an empty name", K::KIND),
        });
    }
    Ok(())
}
