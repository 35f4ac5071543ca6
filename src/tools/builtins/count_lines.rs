//! `count_lines`: number of lines in a file.

use std::path::PathBuf;

use anyhow::Context;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::models::ToolDefinition;
use crate::tools::safety::validate_path;

pub const NAME: &str = "count_lines";

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        NAME,
        "Count the lines of a file inside the working directory.",
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" }
            },
            "required": ["path"]
        }),
    )
}

pub async fn run(args: Value, base: PathBuf, _cancel: CancellationToken) -> anyhow::Result<String> {
    let raw = args
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("count_lines: missing `path` argument"))?;
    let path = validate_path(&base, raw)?;
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("count_lines: cannot read {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(format!("{raw}: {} lines", text.lines().count()))
}
