//! Command implementations behind the `capstan` binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{self, Config};
use crate::conversation::ConversationOptions;
use crate::manager::{AgentManager, SkillManager};
use crate::matcher::Task;
use crate::models::OpenAICompatClient;
use crate::router::RouterContext;
use crate::runtime::AgentRuntime;
use crate::skills::{BuiltinSkills, SkillInvoker};
use crate::tools::builtins::{self, BuiltinOptions};
use crate::tools::{ToolExecutor, ToolRegistry};

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

/// Load both catalogs, watch them and block until Ctrl-C.
pub async fn start(config_path: &Path) -> anyhow::Result<()> {
    let cfg = Config::load(config_path).await?;
    let agents = AgentManager::new(&cfg.agents).context("failed to load agent catalog")?;
    let skills = SkillManager::new(&cfg.skills).context("failed to load skill catalog")?;

    agents.start_watching()?;
    skills.start_watching()?;
    info!(
        agents = agents.registry().len(),
        skills = skills.registry().len(),
        "capstan running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    agents.stop();
    skills.stop();
    Ok(())
}

pub async fn list_agents(config_path: &Path) -> anyhow::Result<()> {
    let cfg = Config::load(config_path).await?;
    let mgr = AgentManager::new(&cfg.agents)?;
    let mut agents = mgr.registry().list();
    agents.sort_by(|a, b| a.name.cmp(&b.name));

    if agents.is_empty() {
        println!("No agents in {}.", mgr.catalog().dir().display());
        return Ok(());
    }

    let default = mgr.router().default_agent();
    println!("{:<24} {:<8} {:<7} {:<48}", "NAME", "VERSION", "ENABLED", "DESCRIPTION");
    println!("{}", "─".repeat(90));
    for a in &agents {
        let marker = if default.as_deref() == Some(a.name.as_str()) { "*" } else { "" };
        println!(
            "{:<24} {:<8} {:<7} {:<48}",
            format!("{}{marker}", a.name),
            a.version,
            mgr.registry().is_enabled(&a.name),
            truncate(&a.description, 48),
        );
    }
    println!("\n{} agent(s). * = default", agents.len());
    Ok(())
}

pub async fn route_agent(config_path: &Path, agent: Option<String>, entry: Option<String>) -> anyhow::Result<()> {
    let cfg = Config::load(config_path).await?;
    let mgr = AgentManager::new(&cfg.agents)?;
    let ctx = RouterContext {
        agent_name: agent,
        entry_point: entry,
        ..Default::default()
    };
    let chosen = mgr.select_agent(&ctx)?;
    println!("{} ({})", chosen.name, chosen.source_path.display());
    Ok(())
}

pub async fn list_skills(config_path: &Path) -> anyhow::Result<()> {
    let cfg = Config::load(config_path).await?;
    let mgr = SkillManager::new(&cfg.skills)?;
    let mut skills = mgr.registry().list();
    skills.sort_by(|a, b| a.name.cmp(&b.name));

    if skills.is_empty() {
        println!("No skills in {}.", mgr.catalog().dir().display());
        return Ok(());
    }

    println!("{:<28} {:<9} {:<52}", "NAME", "PROVIDER", "DESCRIPTION");
    println!("{}", "─".repeat(90));
    for s in &skills {
        let provider = match &s.provider {
            Some(p) => format!("{:?}", p.kind).to_lowercase(),
            None => "-".into(),
        };
        println!("{:<28} {:<9} {:<52}", s.name, provider, truncate(&s.description, 52));
    }
    println!("\n{} skill(s).", skills.len());
    Ok(())
}

pub async fn match_skills(config_path: &Path, task: Task) -> anyhow::Result<()> {
    let cfg = Config::load(config_path).await?;
    let mgr = SkillManager::new(&cfg.skills)?;
    let matches = mgr.matcher().match_task(&task);
    if matches.is_empty() {
        println!("No matching skills.");
        return Ok(());
    }
    for m in &matches {
        println!("{:>5.1}%  {:<28} {}", m.score * 100.0, m.skill.name, m.reason);
    }
    Ok(())
}

pub async fn show_skill(config_path: &Path, name: &str) -> anyhow::Result<()> {
    let cfg = Config::load(config_path).await?;
    let mgr = SkillManager::new(&cfg.skills)?;
    let (skill, body) = mgr.skill_content(name)?;

    let sep = "─".repeat(50);
    println!("\n{sep}");
    println!("  Skill: {}", skill.name);
    println!("  Path:  {}", skill.skill_md_path.display());
    println!("{sep}");
    println!("{}\n", skill.description);
    if let Some(license) = &skill.license {
        println!("license: {license}");
    }
    if let Some(p) = &skill.provider {
        println!("provider: {:?} {}", p.kind, p.endpoint.as_deref().unwrap_or(""));
    }
    println!("\n{body}");
    Ok(())
}

pub struct RunArgs {
    pub message: String,
    pub agent: Option<String>,
    pub entry: Option<String>,
    pub max_steps: Option<usize>,
}

/// One conversation through the configured model with the builtin tools
/// and every invocable skill.
pub async fn run(config_path: &Path, args: RunArgs) -> anyhow::Result<()> {
    let cfg = Config::load(config_path).await?;
    let agents = Arc::new(AgentManager::new(&cfg.agents)?);
    let skills = Arc::new(SkillManager::new(&cfg.skills)?);

    let api_key = config::resolve_api_key(cfg.model.api_key.as_deref()).unwrap_or_default();
    if api_key.is_empty() {
        debug!("no model API key configured");
    }
    let model = Arc::new(OpenAICompatClient::new(
        cfg.model.endpoint.clone(),
        api_key,
        cfg.model.model.clone(),
    )?);

    let mut builder = ToolRegistry::builder();
    builtins::register_all(
        &mut builder,
        &BuiltinOptions {
            command_timeout: std::time::Duration::from_secs(cfg.executor.command_timeout_secs),
        },
    );
    let invoker = Arc::new(SkillInvoker::new(
        Arc::clone(skills.registry()),
        BuiltinSkills::new(),
        reqwest::Client::new(),
    ));
    let skill_tools = invoker.register_tools(&mut builder);
    debug!(skill_tools, "skill tools registered");
    let executor = Arc::new(ToolExecutor::new(builder.build()).with_max_result_bytes(cfg.executor.max_result_bytes));

    let runtime = AgentRuntime::new(agents, model, executor)
        .with_skills(skills)
        .with_default_max_rounds(cfg.executor.max_rounds);

    let base_path = match &cfg.executor.base_path {
        Some(p) => p.clone(),
        None => std::env::current_dir()?,
    };
    let options = ConversationOptions {
        history: Vec::new(),
        max_steps: args.max_steps,
        base_path: Some(base_path),
        ..Default::default()
    };
    let ctx = RouterContext {
        agent_name: args.agent,
        entry_point: args.entry,
        ..Default::default()
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let result = runtime.execute(&ctx, &args.message, options, &cancel).await?;
    println!("{}", result.content);
    eprintln!(
        "\n[{}] {} step(s), {} tool call(s), {} tokens",
        result.agent_name.as_deref().unwrap_or("-"),
        result.steps,
        result.total_tool_calls(),
        result.usage.total_tokens,
    );
    Ok(())
}

/// `capstan.yaml` in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("capstan.yaml")
}
