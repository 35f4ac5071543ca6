//! `search_files`: find files under a directory by glob.
//!
//! A pattern without `/` is matched against file names at any depth
//! (`*.rs`). A pattern with `/` is matched against the path relative to
//! the search directory, where a `**` segment spans any number of
//! directories (`src/**/*.rs`).

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::models::ToolDefinition;
use crate::tools::safety::{resolve, validate_path};

pub const NAME: &str = "search_files";
const MAX_ENTRIES: usize = 500;

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        NAME,
        "Search for files matching a glob pattern inside the working directory. '*.rs' matches file names at any depth; 'src/**/*.rs' matches relative paths.",
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Glob pattern, e.g. '*.go' or 'src/**/*.js'." },
                "path": { "type": "string", "description": "Directory to search in (default '.')." }
            },
            "required": ["pattern"]
        }),
    )
}

pub async fn run(args: Value, base: PathBuf, cancel: CancellationToken) -> anyhow::Result<String> {
    let pattern = args
        .get("pattern")
        .and_then(Value::as_str)
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("search_files: missing `pattern` argument"))?
        .to_owned();
    let raw = args.get("path").and_then(Value::as_str).unwrap_or(".");
    let dir = validate_path(&base, raw)?;
    if !dir.is_dir() {
        anyhow::bail!("search_files: '{raw}' is not a directory");
    }

    let root = resolve(&base);
    let (files, truncated) = tokio::task::spawn_blocking(move || {
        let glob = Glob::new(&pattern);
        let mut files = Vec::new();
        let truncated = collect(&dir, &dir, &root, &glob, &cancel, &mut files);
        (files, truncated)
    })
    .await?;

    if files.is_empty() {
        return Ok("No files found.".into());
    }
    let mut out = files.join("\n");
    if truncated {
        out.push_str(&format!("\n... (stopped after {MAX_ENTRIES} entries)"));
    }
    Ok(out)
}

/// Depth-first walk. Returns `true` if the entry cap was hit.
fn collect(
    dir: &Path,
    search_root: &Path,
    display_root: &Path,
    glob: &Glob,
    cancel: &CancellationToken,
    out: &mut Vec<String>,
) -> bool {
    let Ok(rd) = std::fs::read_dir(dir) else {
        return false;
    };
    let mut entries: Vec<_> = rd.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    entries.sort();

    for path in entries {
        if out.len() >= MAX_ENTRIES || cancel.is_cancelled() {
            return true;
        }
        if crate::capability::is_hidden(&path) {
            continue;
        }
        if path.is_dir() {
            if collect(&path, search_root, display_root, glob, cancel, out) {
                return true;
            }
            continue;
        }
        let rel = path.strip_prefix(search_root).unwrap_or(&path);
        if glob.matches(rel) {
            let shown = path.strip_prefix(display_root).unwrap_or(&path);
            out.push(shown.to_string_lossy().to_string());
        }
    }
    false
}

enum Glob {
    /// Matched against the file name only.
    Name(String),
    /// Matched segment by segment against the relative path.
    Path(Vec<String>),
}

impl Glob {
    fn new(pattern: &str) -> Self {
        let pattern = pattern.trim().trim_start_matches("./");
        if pattern.contains('/') {
            Glob::Path(pattern.split('/').filter(|s| !s.is_empty()).map(str::to_owned).collect())
        } else {
            Glob::Name(pattern.to_owned())
        }
    }

    fn matches(&self, rel: &Path) -> bool {
        match self {
            Glob::Name(p) => rel
                .file_name()
                .map(|n| glob_match(p, &n.to_string_lossy()))
                .unwrap_or(false),
            Glob::Path(segs) => {
                let parts: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect();
                match_segments(segs, &parts)
            }
        }
    }
}

fn match_segments(pattern: &[String], parts: &[String]) -> bool {
    match pattern.split_first() {
        None => parts.is_empty(),
        Some((head, rest)) if head == "**" => {
            (0..=parts.len()).any(|skip| match_segments(rest, &parts[skip..]))
        }
        Some((head, rest)) => match parts.split_first() {
            Some((part, tail)) => glob_match(head, part) && match_segments(rest, tail),
            None => false,
        },
    }
}

/// Single-segment glob: `*` matches any run, `?` one char.
fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = name.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(sp) = star {
            pi = sp + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_basics() {
        assert!(glob_match("*.rs", "main.rs"));
        assert!(glob_match("ma?n.*", "main.rs"));
        assert!(!glob_match("*.rs", "main.go"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn double_star_spans_directories() {
        let g = Glob::new("src/**/*.rs");
        assert!(g.matches(Path::new("src/lib.rs")));
        assert!(g.matches(Path::new("src/a/b/mod.rs")));
        assert!(!g.matches(Path::new("tests/it.rs")));
        assert!(Glob::new("**/*.go").matches(Path::new("cmd/main.go")));
        assert!(!Glob::new("cmd/*.go").matches(Path::new("cmd/sub/main.go")));
    }

    fn tree() -> tempfile::TempDir {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("src/nested")).unwrap();
        std::fs::write(tmp.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(tmp.path().join("src/nested/mod.rs"), "").unwrap();
        std::fs::write(tmp.path().join("README.md"), "").unwrap();
        std::fs::write(tmp.path().join(".secret.rs"), "").unwrap();
        tmp
    }

    #[tokio::test]
    async fn name_patterns_search_recursively() {
        let tmp = tree();
        let out = run(json!({"pattern": "*.rs"}), tmp.path().to_path_buf(), CancellationToken::new())
            .await
            .unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec!["src/lib.rs", "src/nested/mod.rs"]);
    }

    #[tokio::test]
    async fn path_patterns_are_relative_to_the_search_dir() {
        let tmp = tree();
        let base = tmp.path().to_path_buf();
        let out = run(json!({"pattern": "nested/*.rs", "path": "src"}), base.clone(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "src/nested/mod.rs");

        let out = run(json!({"pattern": "*.py"}), base.clone(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "No files found.");

        let err = run(json!({"path": "src"}), base, CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("missing `pattern`"));
    }
}
