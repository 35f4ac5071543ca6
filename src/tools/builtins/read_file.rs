//! `read_file`: read a text file inside the base path.
//!
//! Supports optional `start_line` / `end_line` (1-based, inclusive) for
//! partial reads.

use std::path::PathBuf;

use anyhow::Context;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::models::ToolDefinition;
use crate::tools::safety::validate_path;

pub const NAME: &str = "read_file";

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        NAME,
        "Read a text file inside the working directory. Optionally restrict to a 1-based inclusive line range.",
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the working directory." },
                "start_line": { "type": "integer", "minimum": 1 },
                "end_line": { "type": "integer", "minimum": 1 }
            },
            "required": ["path"]
        }),
    )
}

pub async fn run(args: Value, base: PathBuf, _cancel: CancellationToken) -> anyhow::Result<String> {
    let raw = args
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("read_file: missing `path` argument"))?;
    let path = validate_path(&base, raw)?;

    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("read_file: cannot read {}", path.display()))?;

    let start = args.get("start_line").and_then(Value::as_u64).map(|v| v as usize);
    let end = args.get("end_line").and_then(Value::as_u64).map(|v| v as usize);
    if start.is_none() && end.is_none() {
        return Ok(content);
    }

    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();
    let s = start.unwrap_or(1);
    let e = end.unwrap_or(total).min(total);
    if s < 1 || s > total || e < s {
        anyhow::bail!("read_file: line range {s}..{e} out of bounds (file has {total} lines)");
    }
    Ok(lines[s - 1..e].join("\n"))
}
