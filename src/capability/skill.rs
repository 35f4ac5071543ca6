//! Skill units: one directory per skill holding a `SKILL.md` manifest
//! (YAML front-matter between `---` fences, markdown body = instructions)
//! and optional `scripts/`, `references/` and `assets/` sub-directories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clock::Clock;
use super::validate::{validate_description, validate_name};
use super::{is_hidden, CapabilityKind, Unit};
use crate::error::{CapabilityError, Result};
use crate::registry::RegisterStrategy;
use crate::watcher::WatchLayout;

pub const SKILL_MD: &str = "SKILL.md";

// ── Types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillRisk {
    Read,
    Write,
    Destructive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Handled by an in-process function registered with the invoker.
    Builtin,
    /// Arguments are POSTed as JSON to `endpoint`.
    Http,
}

/// How a skill is executed when a model calls it as a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
    pub headers: HashMap<String, String>,
}

/// Which auxiliary sub-directories are present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceFlags {
    pub has_scripts: bool,
    pub has_references: bool,
    pub has_assets: bool,
}

/// A validated skill definition. The markdown body lives in the loader's
/// body cache, not here.
#[derive(Debug, Clone, Serialize)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub license: Option<String>,
    pub compatibility: Option<String>,
    pub metadata: HashMap<String, String>,
    pub allowed_tools: Option<String>,
    pub provider: Option<ProviderSpec>,
    pub risk_level: Option<SkillRisk>,
    /// JSON schema for the tool arguments when the skill is invocable.
    pub parameters: Option<serde_json::Value>,
    /// Skill directory.
    pub source_path: PathBuf,
    pub skill_md_path: PathBuf,
    pub resources: ResourceFlags,
    pub loaded_at: DateTime<Utc>,
}

impl Unit for Skill {
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

// ── Front-matter ────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct SkillFrontmatter {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    compatibility: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default, rename = "allowed-tools")]
    allowed_tools: Option<String>,
    #[serde(default)]
    provider: Option<ProviderFile>,
    #[serde(default)]
    risk_level: Option<String>,
    #[serde(default)]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ProviderFile {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

impl ProviderFile {
    fn into_spec(self, skill: &str) -> Result<ProviderSpec> {
        let kind = match self.kind.as_str() {
            "builtin" => ProviderKind::Builtin,
            "http" => ProviderKind::Http,
            other => {
                return Err(CapabilityError::InvalidConfig(format!(
                    "skill {skill}: provider.type must be builtin or http: {other}"
                )))
            }
        };
        let endpoint = self.endpoint.filter(|e| !e.trim().is_empty());
        if kind == ProviderKind::Http && endpoint.is_none() {
            return Err(CapabilityError::InvalidConfig(format!(
                "skill {skill}: provider.endpoint is required for http provider"
            )));
        }
        Ok(ProviderSpec {
            kind,
            endpoint,
            timeout_secs: self.timeout.filter(|t| *t > 0),
            headers: self.headers,
        })
    }
}

fn parse_risk(skill: &str, raw: Option<String>) -> Result<Option<SkillRisk>> {
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some("read") => Ok(Some(SkillRisk::Read)),
        Some("write") => Ok(Some(SkillRisk::Write)),
        Some("destructive") => Ok(Some(SkillRisk::Destructive)),
        Some(other) => Err(CapabilityError::InvalidConfig(format!(
            "skill {skill}: risk_level must be one of read, write, destructive: {other}"
        ))),
    }
}

/// Split a `SKILL.md` document into `(yaml_front_matter, body)`.
///
/// Line endings are normalised to `\n`; the document must open with a
/// `---` line and the front-matter must be closed by a later `---` line.
/// The body is trimmed.
pub fn split_frontmatter(content: &str) -> Result<(String, String)> {
    let content = content.replace("\r\n", "\n");
    if !content.starts_with("---\n") {
        return Err(CapabilityError::InvalidFrontmatter(
            "SKILL.md must start with YAML frontmatter".into(),
        ));
    }
    // Search from the newline ending the opening fence so an empty block
    // (`---\n---`) closes immediately.
    let after_open = &content[3..];
    let close = after_open.find("\n---").ok_or_else(|| {
        CapabilityError::InvalidFrontmatter("YAML frontmatter not properly closed".into())
    })?;

    let yaml = after_open[..close].to_string();
    let body = after_open[close + 4..].trim().to_string();
    Ok((yaml, body))
}

/// Parse `SKILL.md` text into a skill record plus body. `dir` is the skill
/// directory; resource flags are detected from it.
pub fn parse_skill_str(dir: &Path, content: &str, clock: &dyn Clock) -> Result<(Skill, String)> {
    let (yaml, body) = split_frontmatter(content)?;
    let fm: SkillFrontmatter = if yaml.trim().is_empty() {
        SkillFrontmatter::default()
    } else {
        serde_yaml::from_str(&yaml).map_err(|e| CapabilityError::InvalidFrontmatter(e.to_string()))?
    };

    validate_name(&fm.name)?;
    validate_description(&fm.description)?;
    let provider = fm.provider.map(|p| p.into_spec(&fm.name)).transpose()?;
    let risk_level = parse_risk(&fm.name, fm.risk_level)?;

    let skill = Skill {
        name: fm.name,
        description: fm.description,
        license: fm.license,
        compatibility: fm.compatibility,
        metadata: fm.metadata,
        allowed_tools: fm.allowed_tools,
        provider,
        risk_level,
        parameters: fm.parameters,
        source_path: dir.to_path_buf(),
        skill_md_path: dir.join(SKILL_MD),
        resources: ResourceFlags {
            has_scripts: dir.join("scripts").is_dir(),
            has_references: dir.join("references").is_dir(),
            has_assets: dir.join("assets").is_dir(),
        },
        loaded_at: clock.now(),
    };
    Ok((skill, body))
}

// ── Kind hooks ──────────────────────────────────────────────

/// Marker type selecting skill behaviour in the generic pipeline.
#[derive(Debug)]
pub struct SkillKind;

impl CapabilityKind for SkillKind {
    type Unit = Skill;

    const KIND: &'static str = "skill";
    const REGISTER_STRATEGY: RegisterStrategy = RegisterStrategy::RejectDuplicate;
    const EMIT_INITIAL_CREATES: bool = false;

    fn watch_layout() -> WatchLayout {
        WatchLayout::MarkerDirs { marker: SKILL_MD }
    }

    fn is_candidate(path: &Path) -> bool {
        !is_hidden(path) && path.is_dir() && path.join(SKILL_MD).is_file()
    }

    fn parse(location: &Path, clock: &dyn Clock) -> Result<(Skill, String)> {
        let md = location.join(SKILL_MD);
        let content = match std::fs::read_to_string(&md) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CapabilityError::ConfigNotFound(md))
            }
            Err(e) => return Err(e.into()),
        };
        parse_skill_str(location, &content, clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::clock::SystemClock;

    #[test]
    fn splits_frontmatter_and_trims_body() {
        let (yaml, body) =
            split_frontmatter("---\r\nname: x\r\n---\r\n\r\n# Guide\r\nDo it.\r\n").unwrap();
        assert_eq!(yaml.trim(), "name: x");
        assert_eq!(body, "# Guide\nDo it.");
    }

    #[test]
    fn frontmatter_errors_are_distinct() {
        let err = split_frontmatter("# no fences\n").unwrap_err();
        assert!(err.to_string().contains("must start with YAML frontmatter"));

        let err = split_frontmatter("---\nname: x\nbody without close\n").unwrap_err();
        assert!(err.to_string().contains("not properly closed"));
    }

    #[test]
    fn parses_provider_and_risk() {
        let md = "---\nname: lookup\ndescription: Looks things up\nrisk_level: read\nprovider:\n  type: http\n  endpoint: http://localhost:9/lookup\n  timeout: 5\n  headers:\n    X-Key: abc\nparameters:\n  type: object\n  properties:\n    q: { type: string }\n---\nbody\n";
        let (skill, body) = parse_skill_str(Path::new("/skills/lookup"), md, &SystemClock).unwrap();
        assert_eq!(body, "body");
        let provider = skill.provider.unwrap();
        assert_eq!(provider.kind, ProviderKind::Http);
        assert_eq!(provider.timeout_secs, Some(5));
        assert_eq!(provider.headers.get("X-Key").map(String::as_str), Some("abc"));
        assert_eq!(skill.risk_level, Some(SkillRisk::Read));
        assert_eq!(skill.parameters.unwrap()["type"], "object");
        assert_eq!(skill.skill_md_path, Path::new("/skills/lookup/SKILL.md"));
    }

    #[test]
    fn http_provider_requires_endpoint() {
        let md = "---\nname: s\ndescription: d\nprovider:\n  type: http\n---\n";
        let err = parse_skill_str(Path::new("/s"), md, &SystemClock).unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidConfig(_)));
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn unknown_risk_level_is_rejected() {
        let md = "---\nname: s\ndescription: d\nrisk_level: spicy\n---\n";
        let err = parse_skill_str(Path::new("/s"), md, &SystemClock).unwrap_err();
        assert!(err.to_string().contains("spicy"));
    }

    #[test]
    fn missing_description_is_invalid_description() {
        let md = "---\nname: s\n---\nbody";
        let err = parse_skill_str(Path::new("/s"), md, &SystemClock).unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidDescription(_)));
    }

    #[test]
    fn resource_flags_reflect_subdirectories() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("demo");
        std::fs::create_dir_all(dir.join("scripts")).unwrap();
        std::fs::create_dir_all(dir.join("assets")).unwrap();
        std::fs::write(dir.join(SKILL_MD), "---\nname: demo\ndescription: Demo skill\n---\nUse it.").unwrap();

        assert!(SkillKind::is_candidate(&dir));
        let (skill, body) = SkillKind::parse(&dir, &SystemClock).unwrap();
        assert_eq!(body, "Use it.");
        assert_eq!(
            skill.resources,
            ResourceFlags {
                has_scripts: true,
                has_references: false,
                has_assets: true
            }
        );
    }

    #[test]
    fn missing_skill_md_is_config_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = SkillKind::parse(tmp.path(), &SystemClock).unwrap_err();
        assert!(matches!(err, CapabilityError::ConfigNotFound(_)));
        assert!(!SkillKind::is_candidate(tmp.path()));
    }
}
