//! `execute_bash`: run a screened shell command in the base path.
//!
//! The child gets a scrubbed environment (only `PATH` and `HOME`) and is
//! killed when the timeout fires or the conversation is cancelled.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::CapabilityError;
use crate::models::ToolDefinition;
use crate::tools::safety::validate_command;

pub const NAME: &str = "execute_bash";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        NAME,
        "Run a shell command in the working directory and return stdout, stderr and the exit code.",
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string" },
                "timeout_secs": { "type": "integer", "minimum": 1, "description": "Defaults to 30." }
            },
            "required": ["command"]
        }),
    )
}

pub async fn run(
    args: Value,
    base: PathBuf,
    cancel: CancellationToken,
    default_timeout: Duration,
) -> anyhow::Result<String> {
    let command = args
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("execute_bash: missing `command` argument"))?;
    validate_command(command)?;
    let timeout = args
        .get("timeout_secs")
        .and_then(Value::as_u64)
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
        .unwrap_or(default_timeout);

    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(&base)
        .env_clear()
        .env("PATH", "/usr/local/bin:/usr/bin:/bin")
        .env("HOME", base.to_string_lossy().to_string())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| anyhow::anyhow!("execute_bash: spawn failed: {e}"))?;

    let output = tokio::select! {
        _ = cancel.cancelled() => return Err(CapabilityError::Cancelled.into()),
        r = tokio::time::timeout(timeout, child.wait_with_output()) => match r {
            Ok(out) => out.map_err(|e| anyhow::anyhow!("execute_bash: {e}"))?,
            Err(_) => return Err(CapabilityError::Timeout(timeout).into()),
        },
    };

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let mut out = String::new();
    if !stdout.trim().is_empty() {
        out.push_str(stdout.trim_end());
        out.push('\n');
    }
    if !stderr.trim().is_empty() {
        out.push_str("[stderr]\n");
        out.push_str(stderr.trim_end());
        out.push('\n');
    }
    out.push_str(&format!("[exit code: {code}]"));
    Ok(out)
}
