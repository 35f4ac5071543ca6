//! Integration tests for the conversation loop and agent runtime using
//! scripted mock models.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use capstan::capability::SystemClock;
use capstan::config::CatalogSettings;
use capstan::conversation::{ConversationLoop, ConversationOptions};
use capstan::manager::{AgentManager, CatalogManager};
use capstan::models::{ChatMessage, ChatModel, ModelReply, TokenUsage, ToolCall, ToolDefinition};
use capstan::policy::Policy;
use capstan::router::RouterContext;
use capstan::runtime::AgentRuntime;
use capstan::tools::builtins::{self, BuiltinOptions};
use capstan::tools::ToolExecutor;
use capstan::CapabilityError;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Always asks for `search_files`.
struct LoopingModel {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatModel for LoopingModel {
    async fn chat_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolDefinition],
        _cancel: &CancellationToken,
    ) -> anyhow::Result<ModelReply> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModelReply {
            message: ChatMessage::assistant_with_tools(
                "",
                vec![ToolCall::function(format!("call_{n}"), "search_files", r#"{"pattern":"*"}"#)],
            ),
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 2,
                total_tokens: 12,
            }),
        })
    }
}

/// Replays a fixed list of replies and records what it was sent.
struct ScriptedModel {
    replies: Mutex<VecDeque<ChatMessage>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
    tools_seen: Mutex<Vec<Vec<String>>>,
}

impl ScriptedModel {
    fn new(replies: Vec<ChatMessage>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
            tools_seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        _cancel: &CancellationToken,
    ) -> anyhow::Result<ModelReply> {
        self.seen.lock().unwrap().push(messages.to_vec());
        self.tools_seen
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name().to_string()).collect());
        let message = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))?;
        Ok(ModelReply {
            message,
            usage: Some(TokenUsage {
                prompt_tokens: 5,
                completion_tokens: 5,
                total_tokens: 10,
            }),
        })
    }
}

struct FailingModel;

#[async_trait]
impl ChatModel for FailingModel {
    async fn chat_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolDefinition],
        _cancel: &CancellationToken,
    ) -> anyhow::Result<ModelReply> {
        anyhow::bail!("upstream returned 503")
    }
}

fn executor() -> Arc<ToolExecutor> {
    Arc::new(ToolExecutor::new(builtins::default_registry(&BuiltinOptions::default())))
}

fn options_in(dir: &Path) -> ConversationOptions {
    ConversationOptions {
        base_path: Some(dir.to_path_buf()),
        ..Default::default()
    }
}

#[tokio::test]
async fn max_rounds_calls_model_exactly_max_times() {
    let tmp = TempDir::new().unwrap();
    let model = Arc::new(LoopingModel {
        calls: AtomicUsize::new(0),
    });
    let conv = ConversationLoop::new(model.clone(), executor());
    let tools = conv.executor().definitions();

    let err = conv
        .run("sys", "loop forever", &tools, &options_in(tmp.path()), 3, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::MaxRoundsExceeded(3)));
    assert_eq!(model.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn max_steps_option_overrides_budget() {
    let tmp = TempDir::new().unwrap();
    let model = Arc::new(LoopingModel {
        calls: AtomicUsize::new(0),
    });
    let conv = ConversationLoop::new(model.clone(), executor());
    let mut opts = options_in(tmp.path());
    opts.max_steps = Some(2);

    let err = conv
        .chat("sys", "go", &opts, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::MaxRoundsExceeded(2)));
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn tool_results_feed_back_and_loop_terminates() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("notes.txt"), "remember the milk").unwrap();

    let model = Arc::new(ScriptedModel::new(vec![
        ChatMessage::assistant_with_tools(
            "",
            vec![
                ToolCall::function("c1", "read_file", r#"{"path":"notes.txt"}"#),
                ToolCall::function("c2", "no_such_tool", "{}"),
            ],
        ),
        ChatMessage::assistant_with_tools("", vec![ToolCall::function("c3", "read_file", r#"{"path":"../x"}"#)]),
        ChatMessage::assistant("The note says to remember the milk."),
    ]));
    let conv = ConversationLoop::new(model.clone(), executor());

    let history = vec![ChatMessage::system("stale"), ChatMessage::user("earlier")];
    let opts = ConversationOptions {
        history,
        ..options_in(tmp.path())
    };
    let result = conv
        .chat("You are helpful.", "what does my note say?", &opts, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.content, "The note says to remember the milk.");
    assert_eq!(result.steps, 3);
    assert_eq!(result.usage.total_tokens, 30);
    assert_eq!(result.total_tool_calls(), 3);
    let read = result.tool_calls.iter().find(|t| t.name == "read_file").unwrap();
    assert_eq!(read.count, 2);

    // Exactly one system message, and it's the new one.
    let systems: Vec<_> = result.messages.iter().filter(|m| m.role == "system").collect();
    assert_eq!(systems.len(), 1);
    assert_eq!(result.messages[0].content, "You are helpful.");

    // Tool results are correlated by id and errors are visible to the model.
    let seen = model.seen.lock().unwrap();
    let second_call = &seen[1];
    let c1 = second_call.iter().find(|m| m.tool_call_id.as_deref() == Some("c1")).unwrap();
    assert_eq!(c1.content, "remember the milk");
    let c2 = second_call.iter().find(|m| m.tool_call_id.as_deref() == Some("c2")).unwrap();
    assert!(c2.content.contains("Unknown tool: no_such_tool"));
    let c3 = seen[2].iter().find(|m| m.tool_call_id.as_deref() == Some("c3")).unwrap();
    assert!(c3.content.contains("escapes"));
}

#[tokio::test]
async fn model_error_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let conv = ConversationLoop::new(Arc::new(FailingModel), executor());
    let err = conv
        .chat("sys", "hi", &options_in(tmp.path()), &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        CapabilityError::ModelError(msg) => assert!(msg.contains("503")),
        other => panic!("expected ModelError, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_before_start() {
    let tmp = TempDir::new().unwrap();
    let model = Arc::new(LoopingModel {
        calls: AtomicUsize::new(0),
    });
    let conv = ConversationLoop::new(model.clone(), executor());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = conv.chat("sys", "hi", &options_in(tmp.path()), &cancel).await.unwrap_err();
    assert!(matches!(err, CapabilityError::Cancelled));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

// ── Runtime ─────────────────────────────────────────────────

const RESTRICTED_AGENT: &str = r#"
name: reader
version: v1
description: Reads files but never runs commands
systemPrompt: You only read.
skills:
  deny: [execute_bash]
policies:
  riskLevel: read
  maxSteps: 2
"#;

fn agent_manager(dir: &Path) -> Arc<AgentManager> {
    std::fs::write(dir.join("reader.yaml"), RESTRICTED_AGENT).unwrap();
    let settings = CatalogSettings {
        default_agent: Some("reader".into()),
        ..Default::default()
    };
    let catalog = CatalogManager::with_dir(dir.to_path_buf(), &settings, Arc::new(SystemClock)).unwrap();
    Arc::new(AgentManager::from_catalog(catalog, &settings).unwrap())
}

#[tokio::test]
async fn runtime_filters_tools_and_applies_agent_budget() {
    let agents_dir = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let agents = agent_manager(agents_dir.path());

    let model = Arc::new(ScriptedModel::new(vec![ChatMessage::assistant("done")]));
    let runtime = AgentRuntime::new(agents.clone(), model.clone(), executor());
    let result = runtime
        .execute(&RouterContext::default(), "hello", options_in(work.path()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.agent_name.as_deref(), Some("reader"));
    assert_eq!(result.messages[0].content, "You only read.");

    let tools = model.tools_seen.lock().unwrap();
    assert!(tools[0].contains(&"read_file".to_string()));
    assert!(!tools[0].contains(&"execute_bash".to_string()));

    // maxSteps: 2 from the agent file.
    let looping = Arc::new(LoopingModel {
        calls: AtomicUsize::new(0),
    });
    let runtime = AgentRuntime::new(agents, looping.clone(), executor());
    let err = runtime
        .execute(&RouterContext::for_agent("reader"), "go", options_in(work.path()), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::MaxRoundsExceeded(2)));
    assert_eq!(looping.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn runtime_refuses_denied_tool_calls() {
    let agents_dir = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    std::fs::write(work.path().join("notes.txt"), "hello").unwrap();
    let agents = agent_manager(agents_dir.path());

    // The model asks for a tool it was never offered.
    let model = Arc::new(ScriptedModel::new(vec![
        ChatMessage::assistant_with_tools(
            "",
            vec![
                ToolCall::function("x", "execute_bash", r#"{"command":"touch created"}"#),
                ToolCall::function("y", "read_file", r#"{"path":"notes.txt"}"#),
            ],
        ),
        ChatMessage::assistant("gave up"),
    ]));
    let runtime = AgentRuntime::new(agents, model.clone(), executor());
    let result = runtime
        .execute(&RouterContext::for_agent("reader"), "run it", options_in(work.path()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.content, "gave up");
    assert!(!work.path().join("created").exists());
    let seen = model.seen.lock().unwrap();
    let denied = seen[1].iter().find(|m| m.tool_call_id.as_deref() == Some("x")).unwrap();
    assert_eq!(denied.content, "Tool not allowed: execute_bash");
    let read = seen[1].iter().find(|m| m.tool_call_id.as_deref() == Some("y")).unwrap();
    assert_eq!(read.content, "hello");
}

#[tokio::test]
async fn loop_honours_caller_policy() {
    let tmp = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::new(vec![
        ChatMessage::assistant_with_tools("", vec![ToolCall::function("a", "search_files", r#"{"pattern":"*"}"#)]),
        ChatMessage::assistant("ok"),
    ]));
    let conv = ConversationLoop::new(model.clone(), executor());
    let opts = ConversationOptions {
        policy: Policy::new(vec!["read_file".into()], vec![]),
        ..options_in(tmp.path())
    };
    let tools = conv.executor().definitions_for(&opts.policy);
    let result = conv
        .run("sys", "list", &tools, &opts, 5, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.steps, 2);
    assert_eq!(model.tools_seen.lock().unwrap()[0], vec!["read_file".to_string()]);
    let msg = result.messages.iter().find(|m| m.tool_call_id.as_deref() == Some("a")).unwrap();
    assert_eq!(msg.content, "Tool not allowed: search_files");
}

#[tokio::test]
async fn runtime_surfaces_routing_errors() {
    let agents_dir = TempDir::new().unwrap();
    let agents = agent_manager(agents_dir.path());
    let model = Arc::new(ScriptedModel::new(vec![]));
    let runtime = AgentRuntime::new(agents, model, executor());

    let err = runtime
        .execute(
            &RouterContext::for_agent("ghost"),
            "hi",
            ConversationOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::NotFound { .. }));
}
