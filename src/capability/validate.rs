//! Field validation shared by both capability kinds.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CapabilityError, Result};

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_DESCRIPTION_LEN: usize = 1024;

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^v\d+(\.\d+)?(\.\d+)?$").expect("static regex"));

/// Unit names: 1–64 chars of `[a-z0-9-]`, no leading/trailing hyphen and
/// no `--` run.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CapabilityError::InvalidName("name is required".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CapabilityError::InvalidName(format!(
            "name exceeds {MAX_NAME_LEN} characters: {name}"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(CapabilityError::InvalidName(format!(
            "name must contain only lowercase letters, digits and hyphens: {name}"
        )));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(CapabilityError::InvalidName(format!(
            "name must not start or end with a hyphen: {name}"
        )));
    }
    if name.contains("--") {
        return Err(CapabilityError::InvalidName(format!(
            "name must not contain '--': {name}"
        )));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<()> {
    if description.trim().is_empty() {
        return Err(CapabilityError::InvalidDescription(
            "description is required".into(),
        ));
    }
    let len = description.chars().count();
    if len > MAX_DESCRIPTION_LEN {
        return Err(CapabilityError::InvalidDescription(format!(
            "description exceeds {MAX_DESCRIPTION_LEN} characters ({len})"
        )));
    }
    Ok(())
}

/// Agent versions look like `v1`, `v1.2` or `v1.2.3`.
pub fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() {
        return Err(CapabilityError::InvalidConfig("version is required".into()));
    }
    if !VERSION_RE.is_match(version) {
        return Err(CapabilityError::InvalidConfig(format!(
            "version must match v<major>[.<minor>[.<patch>]]: {version}"
        )));
    }
    Ok(())
}
