//! Loader: drives the kind's parser into a [`Registry`] and keeps the
//! instruction bodies cached by name.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capability::{CapabilityKind, Clock, SystemClock, Unit};
use crate::error::{CapabilityError, Result};
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadAction {
    Created,
    Updated,
    Failed,
}

/// Outcome of loading one unit during a directory scan.
#[derive(Debug)]
pub struct LoadResult<U> {
    /// Location that was parsed.
    pub path: std::path::PathBuf,
    pub unit: Option<Arc<U>>,
    pub error: Option<CapabilityError>,
    pub action: LoadAction,
}

/// Counts of created / updated / failed outcomes.
pub fn summarize<U>(results: &[LoadResult<U>]) -> (usize, usize, usize) {
    results.iter().fold((0, 0, 0), |(c, u, f), r| match r.action {
        LoadAction::Created => (c + 1, u, f),
        LoadAction::Updated => (c, u + 1, f),
        LoadAction::Failed => (c, u, f + 1),
    })
}

pub struct Loader<K: CapabilityKind> {
    registry: Arc<Registry<K>>,
    bodies: RwLock<HashMap<String, String>>,
    clock: Arc<dyn Clock>,
}

impl<K: CapabilityKind> std::fmt::Debug for Loader<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("kind", &K::KIND)
            .field("registry", &self.registry)
            .finish()
    }
}

impl<K: CapabilityKind> Loader<K> {
    pub fn new(registry: Arc<Registry<K>>) -> Self {
        Self::with_clock(registry, Arc::new(SystemClock))
    }

    pub fn with_clock(registry: Arc<Registry<K>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            bodies: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn registry(&self) -> &Arc<Registry<K>> {
        &self.registry
    }

    /// Load every candidate under `dir`. A missing directory yields an
    /// empty result; one unit failing does not stop the scan.
    pub fn load_from_dir(&self, dir: &Path) -> Result<Vec<LoadResult<K::Unit>>> {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(kind = K::KIND, dir = %dir.display(), "catalog directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| K::is_candidate(p))
            .collect();
        paths.sort();

        let results = paths
            .into_iter()
            .map(|path| match self.load_one(&path) {
                Ok((unit, action)) => LoadResult {
                    path,
                    unit: Some(unit),
                    error: None,
                    action,
                },
                Err(error) => {
                    warn!(kind = K::KIND, path = %path.display(), error = %error, "failed to load");
                    LoadResult {
                        path,
                        unit: None,
                        error: Some(error),
                        action: LoadAction::Failed,
                    }
                }
            })
            .collect();
        Ok(results)
    }

    /// Load a single unit, surfacing any error directly.
    pub fn load_from_path(&self, path: &Path) -> Result<(Arc<K::Unit>, LoadAction)> {
        self.load_one(path)
    }

    fn load_one(&self, path: &Path) -> Result<(Arc<K::Unit>, LoadAction)> {
        let (unit, body) = K::parse(path, self.clock.as_ref())?;
        let unit = Arc::new(unit);
        let name = unit.name().to_string();

        let existed = self.registry.upsert(Arc::clone(&unit))?;
        self.bodies
            .write()
            .expect("body cache lock poisoned")
            .insert(name.clone(), body);

        let action = if existed {
            LoadAction::Updated
        } else {
            LoadAction::Created
        };
        info!(kind = K::KIND, name = %name, action = ?action, path = %path.display(), "loaded");
        Ok((unit, action))
    }

    /// Evict the cached body and remove the unit from the registry.
    pub fn unload(&self, name: &str) -> Result<Arc<K::Unit>> {
        let unit = self.registry.unregister(name)?;
        self.bodies
            .write()
            .expect("body cache lock poisoned")
            .remove(name);
        info!(kind = K::KIND, name, "unloaded");
        Ok(unit)
    }

    /// Unload `name` and load it again from its recorded source path.
    ///
    /// Not atomic: if the second step fails the name stays unregistered
    /// and the error is returned.
    pub fn reload(&self, name: &str) -> Result<Arc<K::Unit>> {
        let source = self.registry.get(name)?.source_path().to_path_buf();
        self.unload(name)?;
        let (unit, _) = self.load_one(&source)?;
        if unit.name() != name {
            warn!(kind = K::KIND, old = name, new = %unit.name(), "reload changed unit name");
        }
        Ok(unit)
    }

    pub fn get_body(&self, name: &str) -> Result<String> {
        self.bodies
            .read()
            .expect("body cache lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| CapabilityError::not_found(K::KIND, name))
    }
}
