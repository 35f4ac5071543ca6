//! Request execution: route to an agent, gate its tools, optionally
//! inject matching skills, and run the conversation.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::conversation::{ConversationLoop, ConversationOptions, ConversationResult, DEFAULT_MAX_ROUNDS};
use crate::error::Result;
use crate::manager::{AgentManager, SkillManager};
use crate::matcher::Task;
use crate::models::ChatModel;
use crate::router::RouterContext;
use crate::tools::ToolExecutor;

/// Most skills injected into one system prompt.
pub const MAX_INJECTED_SKILLS: usize = 3;

#[derive(Debug)]
pub struct AgentRuntime {
    agents: Arc<AgentManager>,
    skills: Option<Arc<SkillManager>>,
    conversation: ConversationLoop,
    default_max_rounds: usize,
}

impl AgentRuntime {
    pub fn new(agents: Arc<AgentManager>, model: Arc<dyn ChatModel>, executor: Arc<ToolExecutor>) -> Self {
        Self {
            agents,
            skills: None,
            conversation: ConversationLoop::new(model, executor),
            default_max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Inject matching skill instructions into each agent's system prompt.
    pub fn with_skills(mut self, skills: Arc<SkillManager>) -> Self {
        self.skills = Some(skills);
        self
    }

    /// Budget used when neither the call nor the agent sets one.
    pub fn with_default_max_rounds(mut self, rounds: usize) -> Self {
        self.default_max_rounds = rounds;
        self
    }

    pub fn agents(&self) -> &Arc<AgentManager> {
        &self.agents
    }

    /// Route `ctx` to an agent and run `user_message` through it.
    pub async fn execute(
        &self,
        ctx: &RouterContext,
        user_message: &str,
        mut options: ConversationOptions,
        cancel: &CancellationToken,
    ) -> Result<ConversationResult> {
        let agent = self.agents.select_agent(ctx)?;
        options.policy = agent.skills.clone();
        let tools = self.conversation.executor().definitions_for(&options.policy);
        let max_rounds = match agent.policies.max_steps {
            0 => self.default_max_rounds,
            n => n,
        };

        let system_prompt = match &self.skills {
            Some(skills) => {
                let task = Task {
                    task_type: ctx.task_type.clone().unwrap_or_default(),
                    description: user_message.to_string(),
                    ..Default::default()
                };
                let mut matches = agent
                    .skills
                    .filter(skills.matcher().match_task(&task), |m| m.skill.name.as_str());
                matches.truncate(MAX_INJECTED_SKILLS);
                debug!(agent = %agent.name, matched = matches.len(), "skills selected");
                skills.injector().inject_to_prompt(&agent.system_prompt, &matches)
            }
            None => agent.system_prompt.clone(),
        };

        info!(
            agent = %agent.name,
            tools = tools.len(),
            max_rounds = options.max_steps.unwrap_or(max_rounds),
            "executing request"
        );
        let mut result = self
            .conversation
            .run(&system_prompt, user_message, &tools, &options, max_rounds, cancel)
            .await?;
        result.agent_name = Some(agent.name.clone());
        Ok(result)
    }
}
