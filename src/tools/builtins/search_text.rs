//! `search_text`: regex search over file contents under the base path.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::models::ToolDefinition;
use crate::tools::safety::{resolve, validate_path};

pub const NAME: &str = "search_text";
const MAX_HITS: usize = 200;
/// Files larger than this are skipped.
const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        NAME,
        "Search file contents with a regular expression. Returns up to 200 matches as path:line:text.",
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regular expression." },
                "path": { "type": "string", "description": "File or directory to search (default '.')." }
            },
            "required": ["pattern"]
        }),
    )
}

pub async fn run(args: Value, base: PathBuf, cancel: CancellationToken) -> anyhow::Result<String> {
    let pattern = args
        .get("pattern")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("search_text: missing `pattern` argument"))?;
    let re = Regex::new(pattern).map_err(|e| anyhow::anyhow!("search_text: invalid pattern: {e}"))?;
    let raw = args.get("path").and_then(Value::as_str).unwrap_or(".");
    let target = validate_path(&base, raw)?;
    let root = resolve(&base);

    let hits = tokio::task::spawn_blocking(move || {
        let mut hits = Vec::new();
        walk(&target, &root, &re, &cancel, &mut hits);
        hits
    })
    .await?;

    if hits.is_empty() {
        return Ok("No matches.".into());
    }
    let mut out = hits.join("\n");
    if hits.len() >= MAX_HITS {
        out.push_str(&format!("\n... (stopped after {MAX_HITS} matches)"));
    }
    Ok(out)
}

fn walk(path: &Path, root: &Path, re: &Regex, cancel: &CancellationToken, hits: &mut Vec<String>) {
    if hits.len() >= MAX_HITS || cancel.is_cancelled() {
        return;
    }
    if path.is_dir() {
        let Ok(rd) = std::fs::read_dir(path) else {
            return;
        };
        let mut entries: Vec<_> = rd.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        entries.sort();
        for entry in entries {
            if crate::capability::is_hidden(&entry) {
                continue;
            }
            walk(&entry, root, re, cancel, hits);
        }
        return;
    }

    let too_big = std::fs::metadata(path).map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true);
    if too_big {
        return;
    }
    // Binary and non-UTF-8 files fail here and are skipped.
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let rel = path.strip_prefix(root).unwrap_or(path).to_string_lossy().to_string();
    for (i, line) in content.lines().enumerate() {
        if re.is_match(line) {
            hits.push(format!("{rel}:{}:{}", i + 1, line.trim_end()));
            if hits.len() >= MAX_HITS {
                return;
            }
        }
    }
}
