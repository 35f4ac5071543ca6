//! Path containment and shell command screening for tool handlers.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CapabilityError, Result};

/// Command fragments that are never executed: recursive/forced `rm`,
/// redirection into absolute paths, command chaining and substitution.
static DANGEROUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\brm\s+-[rf]",
        r">\s*/",
        r";",
        r"\|\s*rm",
        r"\$\(",
        r"`",
        r"&&\s*rm",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// Reject commands matching any dangerous pattern.
pub fn validate_command(command: &str) -> Result<()> {
    if command.trim().is_empty() {
        return Err(CapabilityError::UnsafeCommand("empty command".into()));
    }
    if let Some(re) = DANGEROUS_PATTERNS.iter().find(|re| re.is_match(command)) {
        return Err(CapabilityError::UnsafeCommand(format!(
            "{command} (matches /{}/)",
            re.as_str()
        )));
    }
    Ok(())
}

/// Make `p` absolute against the current directory and fold away `.` and
/// `..` without touching the filesystem.
pub fn normalize(p: &Path) -> PathBuf {
    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(p))
            .unwrap_or_else(|_| p.to_path_buf())
    };
    let mut out = PathBuf::new();
    for comp in abs.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the longest existing prefix of `p` (resolving symlinks)
/// and re-append the remainder.
pub fn resolve(p: &Path) -> PathBuf {
    let lexical = normalize(p);
    let mut existing = lexical.clone();
    let mut tail: Vec<OsString> = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => tail.push(name.to_os_string()),
            None => return lexical,
        }
        if !existing.pop() {
            return lexical;
        }
    }
    let mut resolved = existing.canonicalize().unwrap_or(existing);
    for part in tail.into_iter().rev() {
        resolved.push(part);
    }
    resolved
}

/// `true` when `target` is `base` itself or lies underneath it.
///
/// Comparison is per path component, so `/srv/app` does not contain
/// `/srv/app-old`.
pub fn is_descendant_of(base: &Path, target: &Path) -> bool {
    let base = resolve(base);
    let target = resolve(target);
    target.starts_with(&base)
}

/// Resolve `raw` (relative to `base`, or absolute) and require it to stay
/// inside `base`.
pub fn validate_path(base: &Path, raw: &str) -> Result<PathBuf> {
    let candidate = if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        base.join(raw)
    };
    let resolved = resolve(&candidate);
    if !resolved.starts_with(resolve(base)) {
        return Err(CapabilityError::PathEscape(resolved));
    }
    Ok(resolved)
}
