//! Loading configuration files from disk.

use std::path::Path;

use capstan::config::{resolve_catalog_dir, Config};
use tempfile::TempDir;

const FULL: &str = r#"
agents:
  dir: ./agents
  reload_interval_secs: 2
  default_agent: general
  routes:
    ide: coder
    chat: general
skills:
  auto_reload: false
model:
  endpoint: http://localhost:8000/v1/chat/completions
  model: qwen2
  api_key: $CAPSTAN_TEST_UNSET_KEY
executor:
  max_rounds: 12
  command_timeout_secs: 5
"#;

#[tokio::test]
async fn loads_a_full_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("capstan.yaml");
    std::fs::write(&path, FULL).unwrap();

    let cfg = Config::load(&path).await.unwrap();
    assert_eq!(cfg.agents.dir.as_deref(), Some(Path::new("./agents")));
    assert_eq!(cfg.agents.reload_interval().as_secs(), 2);
    assert_eq!(cfg.agents.default_agent.as_deref(), Some("general"));
    assert_eq!(cfg.agents.routes.get("ide").map(String::as_str), Some("coder"));
    assert!(!cfg.skills.auto_reload);
    assert_eq!(cfg.model.model, "qwen2");
    assert_eq!(cfg.executor.max_rounds, 12);
    assert_eq!(cfg.executor.command_timeout_secs, 5);
    assert_eq!(capstan::config::resolve_api_key(cfg.model.api_key.as_deref()), None);
}

#[tokio::test]
async fn missing_file_means_defaults() {
    let tmp = TempDir::new().unwrap();
    let cfg = Config::load(&tmp.path().join("absent.yaml")).await.unwrap();
    assert!(cfg.agents.auto_reload);
    assert!(cfg.agents.routes.is_empty());
    assert!(cfg.executor.max_rounds > 0);
}

#[tokio::test]
async fn bad_files_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("capstan.yaml");

    for bad in [
        "agents:\n  routes:\n    ide: Not A Name\n",
        "executor:\n  max_rounds: 0\n",
        "agents:\n  unknown_key: 1\n",
        "model: [not, a, map]\n",
    ] {
        std::fs::write(&path, bad).unwrap();
        assert!(Config::load(&path).await.is_err(), "accepted: {bad}");
    }
}

#[tokio::test]
async fn save_then_load_preserves_routes() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("capstan.yaml");
    let mut cfg = Config::from_yaml(FULL).unwrap();
    cfg.agents.routes.insert("cli".into(), "coder".into());
    cfg.save(&path).await.unwrap();

    let back = Config::load(&path).await.unwrap();
    assert_eq!(back.agents.routes.len(), 3);
    assert_eq!(back.agents.default_agent.as_deref(), Some("general"));
}

#[test]
fn configured_catalog_dir_is_made_absolute() {
    let dir = resolve_catalog_dir("CAPSTAN_TEST_UNSET_DIR", Some(Path::new("catalog/agents")), "agents").unwrap();
    assert!(dir.is_absolute());
    assert!(dir.ends_with("catalog/agents"));
}
