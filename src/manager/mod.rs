//! Catalog managers.
//!
//! A [`CatalogManager`] ties one capability kind's registry, loader and
//! watcher to a directory: it performs the initial load, applies file
//! events as they arrive, and can re-sync the whole catalog on demand.
//! [`AgentManager`] and [`SkillManager`] add the kind-specific consumers
//! (router; matcher and injector).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::capability::{Agent, AgentKind, CapabilityKind, Clock, Skill, SkillKind, SystemClock, Unit};
use crate::config::{self, CatalogSettings};
use crate::error::Result;
use crate::injector::Injector;
use crate::loader::{summarize, LoadResult, Loader};
use crate::matcher::{Match, Matcher, Task};
use crate::registry::Registry;
use crate::router::{Router, RouterContext};
use crate::watcher::{FileEvent, FileEventKind, FileWatcher, WatchCallback};

pub struct CatalogManager<K: CapabilityKind> {
    dir: PathBuf,
    settings: CatalogSettings,
    registry: Arc<Registry<K>>,
    loader: Arc<Loader<K>>,
    watcher: Mutex<Option<FileWatcher>>,
}

impl<K: CapabilityKind> std::fmt::Debug for CatalogManager<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogManager")
            .field("kind", &K::KIND)
            .field("dir", &self.dir)
            .field("units", &self.registry.len())
            .field("watching", &self.is_watching())
            .finish()
    }
}

impl<K: CapabilityKind> CatalogManager<K> {
    /// Resolve the catalog directory, create it if needed and load every
    /// unit in it. The watcher is not started.
    pub fn new(
        settings: &CatalogSettings,
        env_var: &str,
        default_name: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let dir = config::resolve_catalog_dir(env_var, settings.dir.as_deref(), default_name)?;
        Self::with_dir(dir, settings, clock)
    }

    /// Like [`new`](Self::new) with an already-resolved directory.
    pub fn with_dir(dir: PathBuf, settings: &CatalogSettings, clock: Arc<dyn Clock>) -> Result<Self> {
        info!(kind = K::KIND, dir = %dir.display(), "catalog directory");
        std::fs::create_dir_all(&dir)?;

        let registry = Arc::new(Registry::<K>::new());
        let loader = Arc::new(Loader::with_clock(Arc::clone(&registry), clock));
        let results = loader.load_from_dir(&dir)?;
        log_summary::<K>(&results);

        Ok(Self {
            dir,
            settings: settings.clone(),
            registry,
            loader,
            watcher: Mutex::new(None),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn registry(&self) -> &Arc<Registry<K>> {
        &self.registry
    }

    pub fn loader(&self) -> &Arc<Loader<K>> {
        &self.loader
    }

    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .expect("manager lock poisoned")
            .as_ref()
            .map(FileWatcher::is_running)
            .unwrap_or(false)
    }

    /// Start hot reload if `auto_reload` is set. Returns whether a watcher
    /// is running afterwards.
    pub fn start_watching(&self) -> Result<bool> {
        if !self.settings.auto_reload {
            debug!(kind = K::KIND, "auto reload disabled");
            return Ok(false);
        }
        let mut slot = self.watcher.lock().expect("manager lock poisoned");
        if slot.as_ref().map(FileWatcher::is_running).unwrap_or(false) {
            return Ok(true);
        }

        let loader = Arc::clone(&self.loader);
        let callback: WatchCallback = Arc::new(move |event| apply_event(&loader, &event));
        let watcher = FileWatcher::new(
            self.dir.clone(),
            self.settings.reload_interval(),
            K::watch_layout(),
            callback,
        )
        .emit_initial(K::EMIT_INITIAL_CREATES);
        watcher.start()?;
        *slot = Some(watcher);
        Ok(true)
    }

    /// Re-scan the directory, then drop units whose source is gone.
    pub fn reload_all(&self) -> Result<Vec<LoadResult<K::Unit>>> {
        let results = self.loader.load_from_dir(&self.dir)?;
        for unit in self.registry.list() {
            if !unit.source_path().exists() {
                if let Err(e) = self.loader.unload(unit.name()) {
                    warn!(kind = K::KIND, name = %unit.name(), error = %e, "failed to unload stale unit");
                }
            }
        }
        log_summary::<K>(&results);
        Ok(results)
    }

    /// Stop hot reload. Safe to call repeatedly.
    pub fn stop(&self) {
        if let Some(w) = self.watcher.lock().expect("manager lock poisoned").take() {
            w.stop();
        }
    }
}

fn log_summary<K: CapabilityKind>(results: &[LoadResult<K::Unit>]) {
    let (created, updated, failed) = summarize(results);
    for r in results {
        if let Some(e) = &r.error {
            warn!(kind = K::KIND, path = %r.path.display(), error = %e, "failed to load unit");
        }
    }
    info!(kind = K::KIND, created, updated, failed, "catalog loaded");
}

/// Apply one watcher event to the catalog.
fn apply_event<K: CapabilityKind>(loader: &Loader<K>, event: &FileEvent) {
    let registry = loader.registry();
    let path = event.path.as_path();
    match event.kind {
        FileEventKind::Create => match loader.load_from_path(path) {
            Ok((unit, _)) => info!(kind = K::KIND, name = %unit.name(), "hot-loaded"),
            Err(e) => warn!(kind = K::KIND, path = %path.display(), error = %e, "failed to load new unit"),
        },
        FileEventKind::Modify => match registry.find_by_source(path) {
            // Reload unloads the old name first, so a rename inside the
            // file leaves only the new name registered.
            Some(existing) => match loader.reload(existing.name()) {
                Ok(unit) => info!(kind = K::KIND, name = %unit.name(), "reloaded"),
                Err(e) => warn!(kind = K::KIND, name = %existing.name(), error = %e, "failed to reload"),
            },
            None => match loader.load_from_path(path) {
                Ok((unit, _)) => info!(kind = K::KIND, name = %unit.name(), "loaded from modified file"),
                Err(e) => warn!(kind = K::KIND, path = %path.display(), error = %e, "failed to load"),
            },
        },
        FileEventKind::Delete => {
            if let Some(existing) = registry.find_by_source(path) {
                match loader.unload(existing.name()) {
                    Ok(_) => info!(kind = K::KIND, name = %existing.name(), "unloaded"),
                    Err(e) => warn!(kind = K::KIND, name = %existing.name(), error = %e, "failed to unload"),
                }
            } else {
                debug!(kind = K::KIND, path = %path.display(), "deleted file had no loaded unit");
            }
        }
    }
}

// ── Agents ──────────────────────────────────────────────────

#[derive(Debug)]
pub struct AgentManager {
    catalog: CatalogManager<AgentKind>,
    router: Router,
}

impl AgentManager {
    pub fn new(settings: &CatalogSettings) -> Result<Self> {
        Self::from_catalog(
            CatalogManager::new(settings, config::AGENTS_DIR_ENV, "agents", Arc::new(SystemClock))?,
            settings,
        )
    }

    /// Wrap an already-loaded catalog and apply the route table and
    /// default agent from `settings`.
    pub fn from_catalog(catalog: CatalogManager<AgentKind>, settings: &CatalogSettings) -> Result<Self> {
        let router = Router::new(Arc::clone(catalog.registry()));
        for (entry, agent) in &settings.routes {
            router.register_route(entry.clone(), agent.clone());
        }
        if let Some(default) = &settings.default_agent {
            if let Err(e) = router.set_default(default) {
                warn!(agent = %default, error = %e, "failed to set default agent");
            }
        }
        Ok(Self { catalog, router })
    }

    pub fn catalog(&self) -> &CatalogManager<AgentKind> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<Registry<AgentKind>> {
        self.catalog.registry()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn select_agent(&self, ctx: &RouterContext) -> Result<Arc<Agent>> {
        self.router.route(ctx)
    }

    pub fn start_watching(&self) -> Result<bool> {
        self.catalog.start_watching()
    }

    pub fn reload_all(&self) -> Result<Vec<LoadResult<Agent>>> {
        self.catalog.reload_all()
    }

    pub fn stop(&self) {
        self.catalog.stop()
    }
}

// ── Skills ──────────────────────────────────────────────────

#[derive(Debug)]
pub struct SkillManager {
    catalog: CatalogManager<SkillKind>,
    matcher: Matcher,
    injector: Injector,
}

impl SkillManager {
    pub fn new(settings: &CatalogSettings) -> Result<Self> {
        Ok(Self::from_catalog(CatalogManager::new(
            settings,
            config::SKILLS_DIR_ENV,
            "skills",
            Arc::new(SystemClock),
        )?))
    }

    pub fn from_catalog(catalog: CatalogManager<SkillKind>) -> Self {
        let matcher = Matcher::new(Arc::clone(catalog.registry()));
        let injector = Injector::new(Arc::clone(catalog.loader()));
        Self {
            catalog,
            matcher,
            injector,
        }
    }

    pub fn catalog(&self) -> &CatalogManager<SkillKind> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<Registry<SkillKind>> {
        self.catalog.registry()
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    /// Match skills for `task` and append their instructions to
    /// `system_prompt`. With no matches the prompt comes back unchanged.
    pub fn match_and_inject(&self, system_prompt: &str, task: &Task) -> (String, Vec<Match>) {
        let matches = self.matcher.match_task(task);
        if matches.is_empty() {
            return (system_prompt.to_string(), matches);
        }
        debug!(matched = matches.len(), "injecting skills into prompt");
        (self.injector.inject_to_prompt(system_prompt, &matches), matches)
    }

    pub fn match_and_inject_by_description(&self, system_prompt: &str, description: &str) -> (String, Vec<Match>) {
        let task = Task {
            description: description.to_string(),
            ..Default::default()
        };
        self.match_and_inject(system_prompt, &task)
    }

    /// The skill record and its instruction body.
    pub fn skill_content(&self, name: &str) -> Result<(Arc<Skill>, String)> {
        let skill = self.registry().get(name)?;
        let body = self.catalog.loader().get_body(name)?;
        Ok((skill, body))
    }

    pub fn start_watching(&self) -> Result<bool> {
        self.catalog.start_watching()
    }

    pub fn reload_all(&self) -> Result<Vec<LoadResult<Skill>>> {
        self.catalog.reload_all()
    }

    pub fn stop(&self) {
        self.catalog.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn agent_yaml(name: &str, description: &str) -> String {
        format!("name: {name}\nversion: v1\ndescription: {description}\nsystemPrompt: you are {name}\n")
    }

    fn agents_in(dir: &Path, routes: &[(&str, &str)], default: Option<&str>) -> AgentManager {
        let settings = CatalogSettings {
            dir: Some(dir.to_path_buf()),
            default_agent: default.map(str::to_owned),
            routes: routes.iter().map(|(e, a)| (e.to_string(), a.to_string())).collect(),
            ..Default::default()
        };
        let catalog = CatalogManager::with_dir(dir.to_path_buf(), &settings, Arc::new(SystemClock)).unwrap();
        AgentManager::from_catalog(catalog, &settings).unwrap()
    }

    #[test]
    fn initial_load_and_routing() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("reviewer.yaml"), agent_yaml("reviewer", "reviews code")).unwrap();
        fs::write(tmp.path().join("writer.yaml"), agent_yaml("writer", "writes docs")).unwrap();

        let mgr = agents_in(tmp.path(), &[("docs", "writer")], Some("reviewer"));
        assert_eq!(mgr.registry().len(), 2);
        assert_eq!(mgr.select_agent(&RouterContext::for_entry_point("docs")).unwrap().name, "writer");
        assert_eq!(mgr.select_agent(&RouterContext::default()).unwrap().name, "reviewer");
    }

    #[test]
    fn missing_default_agent_is_not_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mgr = agents_in(tmp.path(), &[], Some("ghost"));
        assert!(mgr.router().default_agent().is_none());
    }

    #[test]
    fn events_apply_to_registry() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.yaml");
        fs::write(&path, agent_yaml("alpha", "first")).unwrap();
        let mgr = agents_in(tmp.path(), &[], None);
        let loader = mgr.catalog().loader();

        // Rename inside the file: only the new name survives.
        fs::write(&path, agent_yaml("beta", "renamed")).unwrap();
        apply_event(loader, &FileEvent { kind: FileEventKind::Modify, path: path.clone() });
        assert!(!mgr.registry().exists("alpha"));
        assert_eq!(mgr.registry().get("beta").unwrap().description, "renamed");

        fs::remove_file(&path).unwrap();
        apply_event(loader, &FileEvent { kind: FileEventKind::Delete, path });
        assert!(mgr.registry().is_empty());
    }

    #[test]
    fn reload_all_drops_units_whose_source_vanished() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("a.yaml"), agent_yaml("alpha", "first")).unwrap();
        fs::write(tmp.path().join("b.yaml"), agent_yaml("bravo", "second")).unwrap();
        let mgr = agents_in(tmp.path(), &[], None);

        fs::remove_file(tmp.path().join("b.yaml")).unwrap();
        let results = mgr.reload_all().unwrap();
        assert_eq!(summarize(&results), (0, 1, 0));
        assert!(mgr.registry().exists("alpha"));
        assert!(!mgr.registry().exists("bravo"));
    }

    #[test]
    fn skill_match_and_inject() {
        let tmp = tempfile::TempDir::new().unwrap();
        let d = tmp.path().join("api-docs");
        fs::create_dir_all(&d).unwrap();
        fs::write(
            d.join("SKILL.md"),
            "---\nname: api-docs\ndescription: Document REST api endpoints\n---\nList every endpoint.\n",
        )
        .unwrap();
        let catalog =
            CatalogManager::<SkillKind>::with_dir(tmp.path().to_path_buf(), &CatalogSettings::default(), Arc::new(SystemClock))
                .unwrap();
        let mgr = SkillManager::from_catalog(catalog);

        let (prompt, matches) = mgr.match_and_inject_by_description("Base.", "document the api endpoints");
        assert_eq!(matches.len(), 1);
        assert!(prompt.starts_with("Base."));
        assert!(prompt.contains("List every endpoint."));

        let (prompt, matches) = mgr.match_and_inject_by_description("Base.", "zzz qqq");
        assert!(matches.is_empty());
        assert_eq!(prompt, "Base.");

        let (skill, body) = mgr.skill_content("api-docs").unwrap();
        assert_eq!(skill.name, "api-docs");
        assert_eq!(body, "List every endpoint.");
        assert!(mgr.skill_content("ghost").is_err());
    }

    #[test]
    fn auto_reload_off_never_watches() {
        let tmp = tempfile::TempDir::new().unwrap();
        let settings = CatalogSettings {
            auto_reload: false,
            ..Default::default()
        };
        let catalog = CatalogManager::<AgentKind>::with_dir(tmp.path().to_path_buf(), &settings, Arc::new(SystemClock))
            .unwrap();
        assert!(!catalog.start_watching().unwrap());
        assert!(!catalog.is_watching());
    }
}
