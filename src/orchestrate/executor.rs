//! 计划执行：按步骤编号推进的状态机
//!
//! 状态流：Running → {Clarifying, BuildingArtifact, CallingAgent} → Completed | Aborted。
//! 步骤按编号而非数组下标匹配：编号小于当前期望值的步骤（重复或乱序）跳过不执行，
//! 编号有空洞时越过空洞继续执行。"User" 步骤只在编号为 1 时触发澄清并短路剩余步骤。
//! 未注册的智能体名是致命错误：恰好一条 error 事件，零个后续步骤。

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::agents::{AgentInvoker, AgentRegistry};
use crate::artifacts::ArtifactBuilder;

use super::datasets::DatasetAccumulator;
use super::events::{EventSink, StreamEvent};
use super::planner::{PlanStep, BUILDER_AGENT};
use super::repair::extract_and_merge_json;

/// 单步执行结果：智能体名 + 原始文本回复
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub agent_name: String,
    pub response: String,
}

/// 整个计划的执行结果
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// 全部步骤执行完毕，回复已累积，待 Verifier 判定
    Completed { responses: Vec<AgentResponse> },
    /// 计划要求向用户澄清，剩余步骤被短路
    Clarification { message: String },
    /// 终结构件步骤已完成（事件已由构件管线发出）
    ArtifactBuilt,
    /// 致命错误，error 事件已发出，无部分结果
    Aborted,
}

/// 把累积回复拼成带标签的文本，供 Verifier 与最终摘要使用
pub fn combined_responses(responses: &[AgentResponse]) -> String {
    responses
        .iter()
        .map(|r| format!("**{} Response:**\n{}", r.agent_name, r.response))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 计划执行器：注册表校验 + 增强 prompt 构造 + 数据集合并
pub struct PlanExecutor {
    invoker: Arc<dyn AgentInvoker>,
    registry: Arc<AgentRegistry>,
    builder: Arc<dyn ArtifactBuilder>,
}

impl PlanExecutor {
    pub fn new(
        invoker: Arc<dyn AgentInvoker>,
        registry: Arc<AgentRegistry>,
        builder: Arc<dyn ArtifactBuilder>,
    ) -> Self {
        Self {
            invoker,
            registry,
            builder,
        }
    }

    /// 执行确认后的计划；回复按步骤顺序累积，数据集边执行边合并
    pub async fn execute(
        &self,
        plan: &[PlanStep],
        user_query: &str,
        datasets: &mut DatasetAccumulator,
        is_single_widget: bool,
        events: &EventSink,
    ) -> ExecutionOutcome {
        let mut responses: Vec<AgentResponse> = Vec::new();
        let mut expected_step: u32 = 1;

        for step in plan {
            // 编号落后于期望值：重复或乱序，跳过且不推进
            if step.step_number < expected_step {
                tracing::debug!(
                    agent = %step.agent_name,
                    step_number = step.step_number,
                    expected_step,
                    "out-of-order plan step skipped"
                );
                continue;
            }
            expected_step = step.step_number.saturating_add(1);

            // 澄清步骤：只认编号 1，短路其余步骤
            if step.agent_name.eq_ignore_ascii_case("user") && step.step_number == 1 {
                let message = step
                    .clarification_message
                    .clone()
                    .unwrap_or_else(|| "Question for User".to_string());
                events.emit(StreamEvent::thinking(message.clone()));
                return ExecutionOutcome::Clarification { message };
            }

            if step.agent_name == BUILDER_AGENT {
                events.emit(StreamEvent::thinking("Generating Dashboard..."));
                match self
                    .builder
                    .build_dashboard(user_query, datasets, is_single_widget, events)
                    .await
                {
                    Ok(()) => return ExecutionOutcome::ArtifactBuilt,
                    Err(e) => {
                        events.emit(StreamEvent::error(format!(
                            "Dashboard generation failed: {}",
                            e
                        )));
                        return ExecutionOutcome::Aborted;
                    }
                }
            }

            if !self.registry.contains(&step.agent_name) {
                events.emit(StreamEvent::error(format!(
                    "Agent {} not found in available agents.",
                    step.agent_name
                )));
                return ExecutionOutcome::Aborted;
            }

            let prompt = augmented_prompt(user_query, &responses);
            events.emit(StreamEvent::thinking(format!(
                "Calling agent {}...",
                step.agent_name
            )));
            match self.invoker.invoke(&step.agent_name, &prompt, events).await {
                Ok(response) => {
                    let merged = extract_and_merge_json(&response);
                    datasets.push(merged);
                    responses.push(AgentResponse {
                        agent_name: step.agent_name.clone(),
                        response,
                    });
                }
                Err(e) => {
                    events.emit(StreamEvent::error(format!(
                        "Agent {} failed: {}",
                        step.agent_name, e
                    )));
                    return ExecutionOutcome::Aborted;
                }
            }
        }

        ExecutionOutcome::Completed { responses }
    }
}

/// 每步的增强 prompt：先前回复上下文 + 工具探索指令 + 原始查询
fn augmented_prompt(user_query: &str, prior: &[AgentResponse]) -> String {
    let context = if prior.is_empty() {
        String::new()
    } else {
        let rendered = serde_json::to_value(prior)
            .unwrap_or(Value::Null)
            .to_string();
        format!(
            "1. **PREVIOUS CONTEXT**: Consider these responses from previous agents: {}.\n",
            rendered
        )
    };
    format!(
        r#"You are an agent in a multi-agent system with specific tools and capabilities.
{context}2. **PRIMARY RESPONSIBILITY**: Try to answer any part of the question not answered by the previous agents using YOUR available tools.
3. **TOOL EXPLORATION MANDATE**:
   - **ALWAYS attempt to use your available tools first** before determining you cannot help
   - Your tools may contain relevant data even if not immediately obvious from the question
   - **Think creatively** about how your tools might provide relevant information
   - **Explore database schemas** using list tools to understand what data is available
   - **Query systematically** to find relevant information that might answer the user's question
4. **DECISION PROCESS** - Follow this order:
   a) **EXPLORE**: Use listing/discovery tools to understand what data you have access to
   b) **INVESTIGATE**: Query relevant data sources that might contain the requested information
   c) **ANALYZE**: Examine the data to see if it answers any part of the user's question
   d) **RESPOND**: Only after genuine exploration, determine if you can provide partial or complete answers
**Original User Query**: {user_query}"#,
        context = context,
        user_query = user_query,
    )
}
