//! Polling file watcher.
//!
//! Every tick the watched directory is re-listed and each entry's identity
//! (modification time and size) is compared with the previous snapshot.
//! There is no content hashing: an edit that preserves both size and
//! mtime within the filesystem's timestamp resolution goes unnoticed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::is_hidden;
use crate::error::{CapabilityError, Result};

/// Shape of the directory being watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchLayout {
    /// Immediate files whose extension is in the list. Keyed by file path.
    Flat { extensions: &'static [&'static str] },
    /// Immediate sub-directories containing `marker`. Keyed by
    /// sub-directory; identity comes from the marker file.
    MarkerDirs { marker: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Create,
    Modify,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

pub type Snapshot = HashMap<PathBuf, FileIdentity>;

pub type WatchCallback = Arc<dyn Fn(FileEvent) + Send + Sync>;

// ── Scanning ────────────────────────────────────────────────

fn identity(path: &Path) -> std::io::Result<FileIdentity> {
    let meta = std::fs::metadata(path)?;
    Ok(FileIdentity {
        modified: meta.modified().ok(),
        len: meta.len(),
    })
}

/// List `dir` according to `layout`. A missing directory is an empty
/// snapshot.
pub fn scan(dir: &Path, layout: WatchLayout) -> std::io::Result<Snapshot> {
    let mut snapshot = Snapshot::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(snapshot),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let path = entry?.path();
        if is_hidden(&path) {
            continue;
        }
        match layout {
            WatchLayout::Flat { extensions } => {
                let matches = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
                    .unwrap_or(false);
                if !matches || !path.is_file() {
                    continue;
                }
                // The file may vanish between listing and stat.
                if let Ok(id) = identity(&path) {
                    snapshot.insert(path, id);
                }
            }
            WatchLayout::MarkerDirs { marker } => {
                if !path.is_dir() {
                    continue;
                }
                if let Ok(id) = identity(&path.join(marker)) {
                    snapshot.insert(path, id);
                }
            }
        }
    }
    Ok(snapshot)
}

/// Events that turn `old` into `new`, sorted by path within each kind.
pub fn diff(old: &Snapshot, new: &Snapshot) -> Vec<FileEvent> {
    let mut events: Vec<FileEvent> = new
        .iter()
        .filter_map(|(path, id)| match old.get(path) {
            None => Some(FileEvent {
                kind: FileEventKind::Create,
                path: path.clone(),
            }),
            Some(prev) if prev != id => Some(FileEvent {
                kind: FileEventKind::Modify,
                path: path.clone(),
            }),
            Some(_) => None,
        })
        .collect();
    events.extend(old.keys().filter(|p| !new.contains_key(*p)).map(|p| FileEvent {
        kind: FileEventKind::Delete,
        path: p.clone(),
    }));
    events.sort_by(|a, b| a.path.cmp(&b.path));
    events
}

// ── Watcher ─────────────────────────────────────────────────

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct FileWatcher {
    dir: PathBuf,
    interval: Duration,
    layout: WatchLayout,
    emit_initial: bool,
    callback: WatchCallback,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("dir", &self.dir)
            .field("interval", &self.interval)
            .field("layout", &self.layout)
            .field("running", &self.is_running())
            .finish()
    }
}

impl FileWatcher {
    pub fn new(
        dir: impl Into<PathBuf>,
        interval: Duration,
        layout: WatchLayout,
        callback: WatchCallback,
    ) -> Self {
        Self {
            dir: dir.into(),
            interval,
            layout,
            emit_initial: false,
            callback,
            running: Mutex::new(None),
        }
    }

    /// Report entries found by the initial scan as `Create` events.
    pub fn emit_initial(mut self, emit: bool) -> Self {
        self.emit_initial = emit;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .expect("watcher lock poisoned")
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    /// Seed the snapshot synchronously, then poll on a background task.
    /// Calling `start` on a running watcher does nothing.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock().expect("watcher lock poisoned");
        if running.is_some() {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| CapabilityError::ExecutionFailed("no async runtime".into()))?;

        let mut snapshot = scan(&self.dir, self.layout)?;
        if self.emit_initial {
            for event in diff(&Snapshot::new(), &snapshot) {
                (self.callback)(event);
            }
        }
        debug!(dir = %self.dir.display(), entries = snapshot.len(), "watcher seeded");

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let dir = self.dir.clone();
        let layout = self.layout;
        let period = self.interval;
        let callback = Arc::clone(&self.callback);

        let handle = runtime.spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {}
                }
                match scan(&dir, layout) {
                    Ok(next) => {
                        for event in diff(&snapshot, &next) {
                            debug!(kind = ?event.kind, path = %event.path.display(), "file event");
                            callback(event);
                        }
                        snapshot = next;
                    }
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "watcher scan failed; retrying next tick");
                    }
                }
            }
            debug!(dir = %dir.display(), "watcher stopped");
        });

        info!(dir = %self.dir.display(), interval_ms = self.interval.as_millis() as u64, "watching for changes");
        *running = Some(Running { cancel, handle });
        Ok(())
    }

    /// Stop polling. Safe to call any number of times.
    pub fn stop(&self) {
        if let Some(r) = self.running.lock().expect("watcher lock poisoned").take() {
            r.cancel.cancel();
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.running.lock() {
            if let Some(r) = guard.take() {
                r.cancel.cancel();
            }
        }
    }
}
