//! 会话编排循环：生成 → 确认 → 执行 → 校验，有界重试
//!
//! 每轮迭代重新生成计划（带「上一计划失败」的重试上下文）并要求新的人工确认；
//! 执行或校验一旦给出终态（澄清、构件生成、工具错误、已解决）立即提前退出。
//! 达到迭代上限时以显式的「未解决」提示收尾，不再调用计划生成。

use std::sync::Arc;

use serde_json::Value;

use crate::artifacts::ArtifactBuilder;
use crate::memory::{ConversationLog, HistoryStore, Message};

use super::datasets::DatasetAccumulator;
use super::events::{EventSink, StreamEvent};
use super::executor::{combined_responses, ExecutionOutcome, PlanExecutor};
use super::planner::{PlanGenerator, PlanOutcome, PlanStep};
use super::verifier::{Verdict, Verifier};

/// 一个会话的编排状态：由处理该会话的任务独占，不跨会话共享
pub struct SessionState {
    pub session_id: String,
    pub user_id: String,
    pub conversation: ConversationLog,
    pub datasets: DatasetAccumulator,
    /// 当前查询已消耗的迭代数；新查询清零
    pub iteration_count: usize,
    /// 已发给客户端、等待确认的计划
    pub pending_plan: Option<Vec<PlanStep>>,
}

impl SessionState {
    pub fn new(session_id: String, user_id: String, max_context_turns: usize) -> Self {
        Self {
            session_id,
            user_id,
            conversation: ConversationLog::new(max_context_turns),
            datasets: DatasetAccumulator::new(),
            iteration_count: 0,
            pending_plan: None,
        }
    }
}

/// 一轮交互的收尾方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// 计划已发出，等待客户端确认
    AwaitingConfirmation,
    /// 本轮结束（回答、澄清、构件、错误或迭代耗尽）
    Finished,
}

/// 会话编排器：无会话内可变状态，可被全部会话共享
pub struct SessionOrchestrator {
    planner: PlanGenerator,
    executor: PlanExecutor,
    verifier: Verifier,
    builder: Arc<dyn ArtifactBuilder>,
    history: Arc<HistoryStore>,
    max_iterations: usize,
}

impl SessionOrchestrator {
    pub fn new(
        planner: PlanGenerator,
        executor: PlanExecutor,
        verifier: Verifier,
        builder: Arc<dyn ArtifactBuilder>,
        history: Arc<HistoryStore>,
        max_iterations: usize,
    ) -> Self {
        Self {
            planner,
            executor,
            verifier,
            builder,
            history,
            max_iterations,
        }
    }

    /// 处理一条新的用户查询：重置迭代计数并开始第一轮计划生成
    pub async fn handle_query(
        &self,
        state: &mut SessionState,
        query: &str,
        events: &EventSink,
    ) -> TurnOutcome {
        state.iteration_count = 0;
        state.pending_plan = None;
        state.conversation.push(Message::user(query));
        if let Err(e) = self.history.append(&state.user_id, &Message::user(query)) {
            tracing::warn!(session = %state.session_id, error = %e, "history append failed");
        }
        self.advance(state, query, events).await
    }

    /// 处理客户端的计划确认：执行、校验，不充分则进入下一轮迭代
    pub async fn handle_confirmation(
        &self,
        state: &mut SessionState,
        plan: Value,
        original_query: &str,
        is_single_widget: bool,
        events: &EventSink,
    ) -> TurnOutcome {
        let steps: Vec<PlanStep> = match serde_json::from_value(plan.clone()) {
            Ok(steps) => steps,
            Err(e) => {
                events.emit(StreamEvent::error(format!(
                    "Failed to execute confirmed plan: {}",
                    e
                )));
                events.emit(StreamEvent::end());
                return TurnOutcome::Finished;
            }
        };
        state.pending_plan = None;

        events.emit(StreamEvent::thinking(format!(
            "\n Executing confirmed plan... {} \n",
            plan
        )));
        tracing::info!(
            session = %state.session_id,
            user = %state.user_id,
            steps = steps.len(),
            "executing confirmed plan"
        );

        let outcome = self
            .executor
            .execute(
                &steps,
                original_query,
                &mut state.datasets,
                is_single_widget,
                events,
            )
            .await;

        match outcome {
            ExecutionOutcome::Clarification { message } => {
                let combined = format!("**User Response:**\n{}", message);
                self.record_assistant(state, &combined);
                events.emit(StreamEvent::content_final(combined));
                events.emit(StreamEvent::end());
                TurnOutcome::Finished
            }
            ExecutionOutcome::ArtifactBuilt => {
                self.record_assistant(state, "Generated a dashboard for the query.");
                events.emit(StreamEvent::end());
                TurnOutcome::Finished
            }
            ExecutionOutcome::Aborted => {
                events.emit(StreamEvent::end());
                TurnOutcome::Finished
            }
            ExecutionOutcome::Completed { responses } => {
                if responses.is_empty() {
                    events.emit(StreamEvent::error(
                        "No agents were able to process your query. Please try rephrasing.",
                    ));
                    events.emit(StreamEvent::end());
                    return TurnOutcome::Finished;
                }
                let combined = combined_responses(&responses);
                self.verify_and_conclude(state, original_query, &plan, &combined, events)
                    .await
            }
        }
    }

    /// 校验合并回复并收尾；不充分时进入下一轮计划迭代
    async fn verify_and_conclude(
        &self,
        state: &mut SessionState,
        original_query: &str,
        plan: &Value,
        combined: &str,
        events: &EventSink,
    ) -> TurnOutcome {
        let verdict = match self
            .verifier
            .verify(original_query, &plan.to_string(), combined)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                events.emit(StreamEvent::error(format!(
                    "Error verifying response: {}",
                    e
                )));
                events.emit(StreamEvent::end());
                return TurnOutcome::Finished;
            }
        };

        match verdict {
            Verdict::ToolError { tool_name } => {
                events.emit(StreamEvent::content_final(format!(
                    "Repeated errors when calling tool {}. Please reach out to System Administrator",
                    tool_name
                )));
                events.emit(StreamEvent::end());
                TurnOutcome::Finished
            }
            Verdict::ParseFallback => {
                self.record_assistant(state, combined);
                events.emit(StreamEvent::content_final(combined.to_string()));
                events.emit(StreamEvent::end());
                TurnOutcome::Finished
            }
            Verdict::Resolved => {
                match self
                    .builder
                    .build_report(original_query, combined, events)
                    .await
                {
                    Ok(()) => {
                        events.emit(StreamEvent::content_final(
                            "I've analyzed the data and created a detailed HTML report with visualizations. You can view it above.",
                        ));
                    }
                    Err(e) => {
                        events.emit(StreamEvent::content_final(format!(
                            "I've analyzed the data but encountered an error generating the HTML report: {}. Here's a text summary instead:\n\n{}",
                            e, combined
                        )));
                    }
                }
                self.record_assistant(state, combined);
                events.emit(StreamEvent::end());
                TurnOutcome::Finished
            }
            Verdict::Unresolved => {
                events.emit(StreamEvent::content_final(format!(
                    "The approved plan didn't fully resolve your query. Here's what we found:\n\n{}\n\nYou may want to try a different approach or provide more details.",
                    combined
                )));
                self.advance(state, original_query, events).await
            }
        }
    }

    /// 推进一轮计划生成；迭代耗尽时发出显式的「未解决」提示
    async fn advance(
        &self,
        state: &mut SessionState,
        query: &str,
        events: &EventSink,
    ) -> TurnOutcome {
        if state.iteration_count >= self.max_iterations {
            events.emit(StreamEvent::thinking(
                "Maximum iterations reached. The query may not be fully resolved.",
            ));
            events.emit(StreamEvent::end());
            tracing::info!(session = %state.session_id, "iteration limit reached, query unresolved");
            return TurnOutcome::Finished;
        }
        state.iteration_count += 1;
        events.emit(StreamEvent::thinking(format!(
            "\n Calling Multi-Agent Router, times={} ... ",
            state.iteration_count
        )));

        let query_text = if state.iteration_count > 1 {
            format!(
                "Previous plan didnt work. Try a new plan to solve the query. Original User query: {}",
                query
            )
        } else if state.conversation.is_empty() {
            query.to_string()
        } else {
            format!(
                "Previous Conversations: \n {} \n current_query: {}",
                state.conversation.context_section(),
                query
            )
        };

        match self.planner.generate(&query_text).await {
            Ok(PlanOutcome::Plan(steps)) => {
                let plan_value = serde_json::to_value(&steps).unwrap_or(Value::Null);
                events.emit(StreamEvent::thinking(format!(
                    "Orchestrator has prepared a plan. Waiting for human confirmation... \n {}",
                    plan_value
                )));
                events.emit(StreamEvent::confirmation_needed(plan_value, query));
                state.pending_plan = Some(steps);
                TurnOutcome::AwaitingConfirmation
            }
            Ok(PlanOutcome::Direct(text)) => {
                self.record_assistant(state, &text);
                events.emit(StreamEvent::content_final(text));
                events.emit(StreamEvent::end());
                TurnOutcome::Finished
            }
            Err(e) => {
                events.emit(StreamEvent::error(format!("Plan generation failed: {}", e)));
                events.emit(StreamEvent::end());
                TurnOutcome::Finished
            }
        }
    }

    fn record_assistant(&self, state: &mut SessionState, content: &str) {
        state.conversation.push(Message::assistant(content));
        if let Err(e) = self
            .history
            .append(&state.user_id, &Message::assistant(content))
        {
            tracing::warn!(session = %state.session_id, error = %e, "history append failed");
        }
    }
}
