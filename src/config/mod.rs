use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::capability::validate::validate_name;

/// Environment variable overriding the agent catalog directory.
pub const AGENTS_DIR_ENV: &str = "AGENTS_DIR";
/// Environment variable overriding the skill catalog directory.
pub const SKILLS_DIR_ENV: &str = "SKILLS_DIR";

fn default_true() -> bool {
    true
}

fn default_reload_interval_secs() -> u64 {
    5
}

fn default_max_rounds() -> usize {
    crate::conversation::DEFAULT_MAX_ROUNDS
}

fn default_max_result_bytes() -> usize {
    crate::tools::DEFAULT_MAX_RESULT_BYTES
}

fn default_command_timeout_secs() -> u64 {
    30
}

/// Settings shared by the agent and skill catalogs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogSettings {
    /// Catalog directory. Falls back to the environment, then to a
    /// directory next to the executable, then to the working directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Poll the directory and hot-reload changed units.
    #[serde(default = "default_true")]
    pub auto_reload: bool,
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,
    /// Agent used when a request names none and no route applies.
    /// Ignored for skills.
    #[serde(default)]
    pub default_agent: Option<String>,
    /// Entry point → agent name. Ignored for skills.
    #[serde(default)]
    pub routes: HashMap<String, String>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            dir: None,
            auto_reload: true,
            reload_interval_secs: default_reload_interval_secs(),
            default_agent: None,
            routes: HashMap::new(),
        }
    }
}

impl CatalogSettings {
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }
}

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSettings {
    pub endpoint: String,
    pub model: String,
    /// Literal key or `$ENV_VAR` reference. May be omitted for local
    /// servers.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1/chat/completions".into(),
            model: "llama3".into(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorSettings {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Tool output beyond this many bytes is cut.
    #[serde(default = "default_max_result_bytes")]
    pub max_result_bytes: usize,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Working directory for tools. Defaults to the current directory.
    #[serde(default)]
    pub base_path: Option<PathBuf>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_result_bytes: default_max_result_bytes(),
            command_timeout_secs: default_command_timeout_secs(),
            base_path: None,
        }
    }
}

/// Top-level configuration loaded from `capstan.yaml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub agents: CatalogSettings,
    #[serde(default)]
    pub skills: CatalogSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub executor: ExecutorSettings,
}

impl Config {
    /// Read and parse a YAML configuration file. A missing file yields the
    /// defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };

        let config = Self::from_yaml(&contents)?;
        tracing::debug!(
            path = %path.display(),
            routes = config.agents.routes.len(),
            model = %config.model.model,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(contents: &str) -> anyhow::Result<Config> {
        let config: Config = if contents.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(contents).context("failed to parse config YAML")?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate semantic constraints that serde cannot enforce.
    fn validate(&self) -> anyhow::Result<()> {
        for (label, catalog) in [("agents", &self.agents), ("skills", &self.skills)] {
            if catalog.reload_interval_secs == 0 {
                anyhow::bail!("config: {label}.reload_interval_secs must be greater than 0");
            }
        }

        if let Some(default) = &self.agents.default_agent {
            validate_name(default)
                .with_context(|| format!("config: agents.default_agent '{default}'"))?;
        }
        for (entry, agent) in &self.agents.routes {
            if entry.trim().is_empty() {
                anyhow::bail!("config: agents.routes has an empty entry point");
            }
            validate_name(agent)
                .with_context(|| format!("config: route '{entry}' targets invalid agent name '{agent}'"))?;
        }

        if self.executor.max_rounds == 0 {
            anyhow::bail!("config: executor.max_rounds must be greater than 0");
        }
        if self.executor.max_result_bytes == 0 {
            anyhow::bail!("config: executor.max_result_bytes must be greater than 0");
        }
        if self.executor.command_timeout_secs == 0 {
            anyhow::bail!("config: executor.command_timeout_secs must be greater than 0");
        }
        if self.model.endpoint.trim().is_empty() {
            anyhow::bail!("config: model.endpoint must not be empty");
        }
        Ok(())
    }

    /// Serialize and write the configuration back to a YAML file.
    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = serde_yaml::to_string(self).context("serialize config YAML")?;
        tokio::fs::write(path, &contents)
            .await
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Resolve an `api_key` value. `$NAME` reads the environment variable
/// `NAME` (unset means no key); anything else is taken literally.
pub fn resolve_api_key(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.strip_prefix('$') {
        Some(var) => std::env::var(var).ok().filter(|v| !v.is_empty()),
        None => Some(raw.to_string()),
    }
}

fn absolutize(p: &Path) -> std::io::Result<PathBuf> {
    if p.is_absolute() {
        Ok(p.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(p))
    }
}

/// Pick a catalog directory: `$env_var`, then `configured`, then
/// `<exe dir>/<default_name>` if it exists, then `<cwd>/<default_name>`.
/// The result is always absolute.
pub fn resolve_catalog_dir(
    env_var: &str,
    configured: Option<&Path>,
    default_name: &str,
) -> std::io::Result<PathBuf> {
    if let Some(dir) = std::env::var_os(env_var).filter(|v| !v.is_empty()) {
        return absolutize(Path::new(&dir));
    }
    if let Some(dir) = configured.filter(|d| !d.as_os_str().is_empty()) {
        return absolutize(dir);
    }
    if let Some(beside_exe) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join(default_name)))
        .filter(|p| p.is_dir())
    {
        return Ok(beside_exe);
    }
    Ok(std::env::current_dir()?.join(default_name))
}
