//! 会话编排循环端到端测试：脚本化 LLM + 替身智能体/构件管线

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use sleuth::agents::{AgentDescriptor, AgentInvoker, AgentRegistry};
use sleuth::artifacts::ArtifactBuilder;
use sleuth::core::SleuthError;
use sleuth::llm::ScriptedLlm;
use sleuth::memory::HistoryStore;
use sleuth::orchestrate::{
    DatasetAccumulator, EventKind, EventSink, PlanExecutor, PlanGenerator, SessionOrchestrator,
    SessionState, StreamEvent, TurnOutcome, Verifier,
};
use sleuth::proto::Endpoint;

struct StubInvoker {
    calls: Mutex<Vec<String>>,
    reply: String,
}

impl StubInvoker {
    fn new(reply: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl AgentInvoker for StubInvoker {
    async fn invoke(
        &self,
        agent_name: &str,
        _prompt: &str,
        _events: &EventSink,
    ) -> Result<String, SleuthError> {
        self.calls.lock().unwrap().push(agent_name.to_string());
        Ok(self.reply.clone())
    }
}

struct StubBuilder {
    reports: Mutex<usize>,
    dashboards: Mutex<usize>,
}

impl StubBuilder {
    fn new() -> Self {
        Self {
            reports: Mutex::new(0),
            dashboards: Mutex::new(0),
        }
    }
}

#[async_trait]
impl ArtifactBuilder for StubBuilder {
    async fn build_dashboard(
        &self,
        _query: &str,
        _datasets: &DatasetAccumulator,
        _single_widget: bool,
        events: &EventSink,
    ) -> Result<(), SleuthError> {
        *self.dashboards.lock().unwrap() += 1;
        events.emit(StreamEvent::dashboard_file("stub.html", json!({})));
        Ok(())
    }

    async fn build_report(
        &self,
        _query: &str,
        _combined: &str,
        events: &EventSink,
    ) -> Result<(), SleuthError> {
        *self.reports.lock().unwrap() += 1;
        events.emit(StreamEvent::html_content("<html></html>", "Report", json!({})));
        Ok(())
    }
}

fn registry_with(names: &[&str]) -> Arc<AgentRegistry> {
    let mut registry = AgentRegistry::new();
    for name in names {
        registry.register(AgentDescriptor {
            name: name.to_string(),
            category: "Database".to_string(),
            description: format!("{} source", name),
            usage: "Use for data queries.".to_string(),
            rules: String::new(),
            endpoint: Endpoint::Http {
                url: "http://localhost:1/rpc".to_string(),
            },
            tools: Vec::new(),
        });
    }
    Arc::new(registry)
}

struct Harness {
    orchestrator: SessionOrchestrator,
    llm: Arc<ScriptedLlm>,
    invoker: Arc<StubInvoker>,
    builder: Arc<StubBuilder>,
    _dir: tempfile::TempDir,
}

fn harness(replies: Vec<&str>, agent_reply: &str, max_iterations: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlm::new(replies));
    let registry = registry_with(&["Mysql", "Opensearch"]);
    let invoker = Arc::new(StubInvoker::new(agent_reply));
    let builder = Arc::new(StubBuilder::new());
    let history = Arc::new(HistoryStore::new(dir.path()).unwrap());

    let llm_dyn: Arc<dyn sleuth::llm::LlmClient> = llm.clone();
    let invoker_dyn: Arc<dyn AgentInvoker> = invoker.clone();
    let builder_dyn: Arc<dyn ArtifactBuilder> = builder.clone();
    let orchestrator = SessionOrchestrator::new(
        PlanGenerator::new(Arc::clone(&llm_dyn), Arc::clone(&registry)),
        PlanExecutor::new(invoker_dyn, Arc::clone(&registry), Arc::clone(&builder_dyn)),
        Verifier::new(Arc::clone(&llm_dyn), Arc::clone(&registry)),
        builder_dyn,
        history,
        max_iterations,
    );

    Harness {
        orchestrator,
        llm,
        invoker,
        builder,
        _dir: dir,
    }
}

fn state() -> SessionState {
    SessionState::new("session_test".to_string(), "tester".to_string(), 20)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

const PLAN_ONE_AGENT: &str = r#"[{"agent_name": "Mysql", "step_number": 1}]"#;
const VERDICT_YES: &str = r#"[{"agent_name": "User", "can_answer": "yes", "step_number": 1}]"#;
const VERDICT_NO: &str = r#"[{"agent_name": "User", "can_answer": "no", "step_number": 1}]"#;

#[tokio::test]
async fn test_query_emits_plan_and_waits_for_confirmation() {
    let h = harness(vec![PLAN_ONE_AGENT], "no data", 5);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = EventSink::new(tx);
    let mut state = state();

    let outcome = h
        .orchestrator
        .handle_query(&mut state, "how many devices are online?", &sink)
        .await;
    assert_eq!(outcome, TurnOutcome::AwaitingConfirmation);

    let events = drain(&mut rx);
    let confirmation = events
        .iter()
        .find(|e| matches!(e.kind, EventKind::ConfirmationNeeded))
        .expect("confirmation_needed event");
    let extra = serde_json::to_value(confirmation).unwrap();
    assert_eq!(extra["plan"][0]["agent_name"], "Mysql");
    assert_eq!(extra["original_query"], "how many devices are online?");
    assert!(h.invoker.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_confirmed_plan_resolves_into_report() {
    let h = harness(
        vec![PLAN_ONE_AGENT, VERDICT_YES],
        r#"{"data": [{"label": "online", "value": 12}]}"#,
        5,
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = EventSink::new(tx);
    let mut state = state();

    let _ = h
        .orchestrator
        .handle_query(&mut state, "how many devices are online?", &sink)
        .await;
    let outcome = h
        .orchestrator
        .handle_confirmation(
            &mut state,
            serde_json::from_str(PLAN_ONE_AGENT).unwrap(),
            "how many devices are online?",
            false,
            &sink,
        )
        .await;

    assert_eq!(outcome, TurnOutcome::Finished);
    assert_eq!(*h.builder.reports.lock().unwrap(), 1);
    assert_eq!(*h.invoker.calls.lock().unwrap(), vec!["Mysql"]);
    assert_eq!(state.datasets.len(), 1);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e.kind, EventKind::HtmlContent)));
    assert!(events.iter().any(|e| matches!(e.kind, EventKind::End)));
}

#[tokio::test]
async fn test_unresolved_cycles_stop_at_iteration_limit() {
    let h = harness(
        vec![PLAN_ONE_AGENT, VERDICT_NO, PLAN_ONE_AGENT, VERDICT_NO],
        "nothing found",
        2,
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = EventSink::new(tx);
    let mut state = state();

    let outcome = h
        .orchestrator
        .handle_query(&mut state, "find the needle", &sink)
        .await;
    assert_eq!(outcome, TurnOutcome::AwaitingConfirmation);

    // 第一轮确认：裁决不充分，进入第二轮生成
    let outcome = h
        .orchestrator
        .handle_confirmation(
            &mut state,
            serde_json::from_str(PLAN_ONE_AGENT).unwrap(),
            "find the needle",
            false,
            &sink,
        )
        .await;
    assert_eq!(outcome, TurnOutcome::AwaitingConfirmation);

    // 重试上下文带上「上一计划失败」说明
    let retry_prompt = h.llm.prompt_at(2).unwrap();
    assert!(retry_prompt.contains("Previous plan didnt work"));
    assert!(retry_prompt.contains("find the needle"));

    // 第二轮确认：仍不充分，迭代耗尽，不再调用计划生成
    let outcome = h
        .orchestrator
        .handle_confirmation(
            &mut state,
            serde_json::from_str(PLAN_ONE_AGENT).unwrap(),
            "find the needle",
            false,
            &sink,
        )
        .await;
    assert_eq!(outcome, TurnOutcome::Finished);
    assert_eq!(h.llm.call_count(), 4);

    let events = drain(&mut rx);
    let unresolved = events.iter().any(|e| {
        matches!(e.kind, EventKind::Thinking)
            && e.content
                .as_deref()
                .is_some_and(|c| c.contains("Maximum iterations reached"))
    });
    assert!(unresolved, "expected explicit unresolved signal");
}

#[tokio::test]
async fn test_tool_error_verdict_stops_immediately() {
    let verdict = r#"[{"agent_name": "User", "can_answer": "no", "tool_error": "yes", "tool_name": "query_tables", "step_number": 1}]"#;
    let h = harness(vec![PLAN_ONE_AGENT, verdict], "error output", 5);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = EventSink::new(tx);
    let mut state = state();

    let _ = h
        .orchestrator
        .handle_query(&mut state, "broken query", &sink)
        .await;
    let outcome = h
        .orchestrator
        .handle_confirmation(
            &mut state,
            serde_json::from_str(PLAN_ONE_AGENT).unwrap(),
            "broken query",
            false,
            &sink,
        )
        .await;

    assert_eq!(outcome, TurnOutcome::Finished);
    // 硬停：没有第二次计划生成
    assert_eq!(h.llm.call_count(), 2);
    assert_eq!(*h.builder.reports.lock().unwrap(), 0);

    let events = drain(&mut rx);
    let admin_notice = events.iter().any(|e| {
        e.content.as_deref().is_some_and(|c| {
            c.contains("Repeated errors when calling tool query_tables")
                && c.contains("System Administrator")
        })
    });
    assert!(admin_notice);
}

#[tokio::test]
async fn test_clarification_plan_invokes_no_agents() {
    let plan = r#"[{"agent_name": "User", "step_number": 1, "clarification_message": "Which cluster do you mean?"}]"#;
    let h = harness(vec![plan], "unused", 5);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = EventSink::new(tx);
    let mut state = state();

    let _ = h
        .orchestrator
        .handle_query(&mut state, "show cluster status", &sink)
        .await;
    let outcome = h
        .orchestrator
        .handle_confirmation(
            &mut state,
            serde_json::from_str(plan).unwrap(),
            "show cluster status",
            false,
            &sink,
        )
        .await;

    assert_eq!(outcome, TurnOutcome::Finished);
    assert!(h.invoker.calls.lock().unwrap().is_empty());
    // 澄清不触发校验
    assert_eq!(h.llm.call_count(), 1);

    let events = drain(&mut rx);
    let clarification = events.iter().any(|e| {
        matches!(e.kind, EventKind::Content)
            && e.content
                .as_deref()
                .is_some_and(|c| c.contains("Which cluster do you mean?"))
    });
    assert!(clarification);
}

#[tokio::test]
async fn test_unknown_agent_yields_single_error_event() {
    let plan = r#"[{"agent_name": "Ghost", "step_number": 1}, {"agent_name": "Mysql", "step_number": 2}]"#;
    let h = harness(vec![PLAN_ONE_AGENT], "unused", 5);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = EventSink::new(tx);
    let mut state = state();

    let _ = h
        .orchestrator
        .handle_query(&mut state, "query", &sink)
        .await;
    let outcome = h
        .orchestrator
        .handle_confirmation(
            &mut state,
            serde_json::from_str(plan).unwrap(),
            "query",
            false,
            &sink,
        )
        .await;

    assert_eq!(outcome, TurnOutcome::Finished);
    assert!(h.invoker.calls.lock().unwrap().is_empty());

    let events = drain(&mut rx);
    let errors = events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Error))
        .count();
    assert_eq!(errors, 1);
}

#[tokio::test]
async fn test_plan_without_brackets_is_surfaced_directly() {
    let h = harness(
        vec!["The answer is 42, no agents are needed for this."],
        "unused",
        5,
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = EventSink::new(tx);
    let mut state = state();

    let outcome = h
        .orchestrator
        .handle_query(&mut state, "what is the answer?", &sink)
        .await;
    assert_eq!(outcome, TurnOutcome::Finished);

    let events = drain(&mut rx);
    let direct = events.iter().any(|e| {
        matches!(e.kind, EventKind::Content)
            && e.content.as_deref().is_some_and(|c| c.contains("42"))
    });
    assert!(direct);
}

#[tokio::test]
async fn test_builder_step_generates_dashboard() {
    let plan = r#"[{"agent_name": "Mysql", "step_number": 1}, {"agent_name": "DashboardBuilder", "step_number": 2}]"#;
    let h = harness(
        vec![plan],
        r#"{"data": [{"label": "online", "value": 12}]}"#,
        5,
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = EventSink::new(tx);
    let mut state = state();

    let _ = h
        .orchestrator
        .handle_query(&mut state, "build a device dashboard", &sink)
        .await;
    let outcome = h
        .orchestrator
        .handle_confirmation(
            &mut state,
            serde_json::from_str(plan).unwrap(),
            "build a device dashboard",
            false,
            &sink,
        )
        .await;

    assert_eq!(outcome, TurnOutcome::Finished);
    assert_eq!(*h.builder.dashboards.lock().unwrap(), 1);
    // 构件完成即终态，不再校验
    assert_eq!(h.llm.call_count(), 1);

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e.kind, EventKind::DashboardFile)));
}
