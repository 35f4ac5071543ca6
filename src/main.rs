use capstan::cli;
use capstan::matcher::Task;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "capstan", version, about = "Hot-reloading agent and skill runtime")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load both catalogs and hot-reload them until Ctrl-C
    Start,
    /// Inspect the agent catalog
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },
    /// Inspect the skill catalog
    Skills {
        #[command(subcommand)]
        action: SkillsAction,
    },
    /// Run one conversation through a routed agent
    Run {
        /// User message
        #[arg(short, long)]
        message: String,
        /// Agent name (overrides routing)
        #[arg(long)]
        agent: Option<String>,
        /// Entry point used for route lookup
        #[arg(long)]
        entry: Option<String>,
        /// Round budget override
        #[arg(long)]
        max_steps: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum AgentsAction {
    /// List loaded agents
    List,
    /// Show which agent a request would be routed to
    Route {
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        entry: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SkillsAction {
    /// List loaded skills
    List,
    /// Rank skills for a task
    Match {
        #[arg(short, long)]
        description: String,
        #[arg(long, default_value = "")]
        task_type: String,
        #[arg(long, default_value = "")]
        repo_type: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Print a skill's metadata and instructions
    Show { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(cli::default_config_path);

    match cli.command.unwrap_or(Command::Start) {
        Command::Start => cli::start(&config_path).await,
        Command::Agents { action } => match action {
            AgentsAction::List => cli::list_agents(&config_path).await,
            AgentsAction::Route { agent, entry } => cli::route_agent(&config_path, agent, entry).await,
        },
        Command::Skills { action } => match action {
            SkillsAction::List => cli::list_skills(&config_path).await,
            SkillsAction::Match {
                description,
                task_type,
                repo_type,
                tags,
            } => {
                let task = Task {
                    task_type,
                    description,
                    repo_type,
                    tags,
                };
                cli::match_skills(&config_path, task).await
            }
            SkillsAction::Show { name } => cli::show_skill(&config_path, &name).await,
        },
        Command::Run {
            message,
            agent,
            entry,
            max_steps,
        } => {
            cli::run(
                &config_path,
                cli::RunArgs {
                    message,
                    agent,
                    entry,
                    max_steps,
                },
            )
            .await
        }
    }
}
