//! Builtin tools driven through the executor, confined to a base directory.

use std::path::Path;

use capstan::models::ToolCall;
use capstan::tools::builtins::{self, BuiltinOptions};
use capstan::tools::ToolExecutor;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn executor() -> ToolExecutor {
    ToolExecutor::new(builtins::default_registry(&BuiltinOptions::default()))
}

async fn call(exec: &ToolExecutor, base: &Path, name: &str, args: serde_json::Value) -> (bool, String) {
    let r = exec
        .execute(
            &ToolCall::function("t", name, args.to_string()),
            base,
            &CancellationToken::new(),
        )
        .await;
    (r.is_error, r.content)
}

#[tokio::test]
async fn paths_cannot_leave_the_base() {
    let root = TempDir::new().unwrap();
    let work = root.path().join("work");
    let sibling = root.path().join("work-evil");
    std::fs::create_dir_all(&work).unwrap();
    std::fs::create_dir_all(&sibling).unwrap();
    std::fs::write(sibling.join("secret.txt"), "nope").unwrap();
    std::fs::write(work.join("ok.txt"), "fine").unwrap();

    let exec = executor();
    for args in [
        json!({ "path": "../work-evil/secret.txt" }),
        json!({ "path": sibling.join("secret.txt") }),
        json!({ "path": "/etc/passwd" }),
    ] {
        let (is_error, content) = call(&exec, &work, "read_file", args).await;
        assert!(is_error);
        assert!(content.contains("escapes"), "{content}");
    }

    let (is_error, content) = call(&exec, &work, "search_files", json!({ "pattern": "*", "path": ".." })).await;
    assert!(is_error, "{content}");

    let (is_error, content) = call(&exec, &work, "read_file", json!({ "path": "./sub/../ok.txt" })).await;
    assert!(!is_error, "{content}");
    assert_eq!(content, "fine");
}

#[tokio::test]
async fn dangerous_commands_are_refused() {
    let tmp = TempDir::new().unwrap();
    let exec = executor();
    for cmd in ["rm -rf /", "echo x > /etc/passwd", "ls; rm a.txt", "echo $(whoami)"] {
        let (is_error, content) = call(&exec, tmp.path(), "execute_bash", json!({ "command": cmd })).await;
        assert!(is_error, "{cmd} was allowed");
        assert!(content.contains("safety policy"), "{content}");
    }

    let (is_error, content) = call(&exec, tmp.path(), "execute_bash", json!({ "command": "echo hi" })).await;
    assert!(!is_error, "{content}");
    assert!(content.contains("hi"));
}

#[tokio::test]
async fn large_results_are_truncated() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("big.txt"), "x".repeat(4096)).unwrap();
    let exec = executor().with_max_result_bytes(100);

    let (is_error, content) = call(&exec, tmp.path(), "read_file", json!({ "path": "big.txt" })).await;
    assert!(!is_error);
    assert!(content.starts_with(&"x".repeat(100)));
    assert!(content.ends_with("(3996 more bytes truncated)"));
}

#[tokio::test]
async fn search_and_count_work_together() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("src")).unwrap();
    std::fs::write(tmp.path().join("src/lib.rs"), "fn alpha() {}\nfn beta() {}\n").unwrap();
    std::fs::write(tmp.path().join(".hidden"), "fn alpha() {}\n").unwrap();
    let exec = executor();

    let (is_error, content) = call(&exec, tmp.path(), "search_text", json!({ "pattern": "fn a\\w+" })).await;
    assert!(!is_error, "{content}");
    assert!(content.contains("src/lib.rs:1:"));
    assert!(!content.contains(".hidden"));

    let (_, content) = call(&exec, tmp.path(), "count_lines", json!({ "path": "src/lib.rs" })).await;
    assert_eq!(content, "src/lib.rs: 2 lines");

    let (_, content) = call(&exec, tmp.path(), "search_files", json!({ "pattern": "src/**/*.rs" })).await;
    assert!(content.contains("lib.rs"));
}
