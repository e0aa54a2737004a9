//! 专职智能体执行：一次调用 = 新建连接 + 有界工具循环
//!
//! LLM 以 JSON Tool Call 方言（{"tool": "...", "args": {...}}）驱动该数据源的工具，
//! 观察结果写回上下文；最终回答约束为 {"data": [...]} 结构，供数据集合并。
//! 每次工具调用输出一条结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::agents::AgentRegistry;
use crate::core::SleuthError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::orchestrate::{EventSink, StreamEvent};

/// LLM 返回的 Tool Call（{"tool": "query_tables", "args": {...}}）
#[derive(Debug, Clone, Deserialize)]
struct ToolCall {
    tool: String,
    #[serde(default)]
    args: Value,
}

/// 解析 LLM 输出中的 Tool Call：提取 ```json 块或首个 {..} 并尝试反序列化；
/// 不是 Tool Call 形状（如最终的 {"data": [...]}）则返回 None
fn parse_tool_call(output: &str) -> Option<ToolCall> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        &trimmed[start..=end]
    } else {
        return None;
    };

    let call: ToolCall = serde_json::from_str(json_str).ok()?;
    if call.tool.is_empty() {
        None
    } else {
        Some(call)
    }
}

/// 智能体调用接口：执行器通过此 trait 派发步骤（测试可替换）
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// 用增强后的 prompt 调用指定智能体，返回其文本回复
    async fn invoke(
        &self,
        agent_name: &str,
        prompt: &str,
        events: &EventSink,
    ) -> Result<String, SleuthError>;
}

/// 生产实现：注册表 + LLM + 有界工具循环
pub struct AgentRunner {
    llm: Arc<dyn LlmClient>,
    registry: Arc<AgentRegistry>,
    max_steps: usize,
}

impl AgentRunner {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<AgentRegistry>, max_steps: usize) -> Self {
        Self {
            llm,
            registry,
            max_steps,
        }
    }

    fn system_prompt(&self, agent_name: &str) -> Result<String, SleuthError> {
        let descriptor = self
            .registry
            .get(agent_name)
            .ok_or_else(|| SleuthError::AgentNotFound(agent_name.to_string()))?;
        Ok(format!(
            r#"1. You are a specialized agent, designed to answer questions using the following tools:
{tools}
2. Rules: {rules}
3. To call a tool, reply with exactly one JSON object and nothing else:
{{"tool": "tool_name", "args": {{ ... }}}}
Tool results will be fed back to you as observations.
4. When you have the data (or conclude no tool can help), reply with your final answer as a structured JSON object in the below format only:
{{
    "data": [
        {{ "label": "value", "value": "value" }},
        ...
    ]
}}
- MANDATORY: the final answer is a single valid JSON object and nothing else."#,
            tools = descriptor.tool_catalog(),
            rules = descriptor.rules,
        ))
    }
}

#[async_trait]
impl AgentInvoker for AgentRunner {
    async fn invoke(
        &self,
        agent_name: &str,
        prompt: &str,
        events: &EventSink,
    ) -> Result<String, SleuthError> {
        let system = self.system_prompt(agent_name)?;
        // 每次调用全新连接：有状态/崩溃过的工具服务端不会污染后续步骤
        let mut conn = self.registry.open(agent_name).await?;

        let mut messages = vec![Message::system(system), Message::user(prompt.to_string())];
        let mut last_output = String::new();

        for _ in 0..self.max_steps {
            let output = self
                .llm
                .complete(&messages)
                .await
                .map_err(|e| SleuthError::AgentInvocation {
                    agent: agent_name.to_string(),
                    reason: e,
                })?;
            last_output = output.clone();

            let Some(call) = parse_tool_call(&output) else {
                return Ok(output);
            };

            events.emit(StreamEvent::tool_use(&call.tool, call.args.clone()));

            let start = Instant::now();
            let result = conn.invoke(&call.tool, call.args.clone()).await;
            let audit = serde_json::json!({
                "event": "tool_audit",
                "agent": agent_name,
                "tool": call.tool,
                "ok": result.is_ok(),
                "duration_ms": start.elapsed().as_millis() as u64,
            });
            tracing::info!(audit = %audit.to_string(), "tool");

            let observation = match result {
                Ok(text) => text,
                // 工具失败作为观察喂回，让 LLM 换工具或收尾；连接保持到调用结束
                Err(e) => format!("Error: {}", e),
            };
            messages.push(Message::assistant(format!(
                "Tool call: {} | Result: {}",
                call.tool, observation
            )));
            messages.push(Message::user(format!(
                "Observation from {}: {}",
                call.tool, observation
            )));
        }

        // 步数耗尽：返回最后一次输出，交由上层 Verifier 判定充分性
        Ok(last_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_call_plain_json() {
        let call = parse_tool_call(r#"{"tool": "list_tables", "args": {"db": "main"}}"#).unwrap();
        assert_eq!(call.tool, "list_tables");
        assert_eq!(call.args["db"], "main");
    }

    #[test]
    fn test_parse_tool_call_fenced_block() {
        let text = "I will inspect the schema first.\n```json\n{\"tool\": \"describe\", \"args\": {}}\n```";
        let call = parse_tool_call(text).unwrap();
        assert_eq!(call.tool, "describe");
    }

    #[test]
    fn test_final_data_answer_is_not_a_tool_call() {
        assert!(parse_tool_call(r#"{"data": [{"label": "a", "value": 1}]}"#).is_none());
    }

    #[test]
    fn test_plain_text_is_not_a_tool_call() {
        assert!(parse_tool_call("I cannot help with that.").is_none());
    }
}
