//! 计划生成：把自然语言查询变成有序的智能体调用计划
//!
//! 一次推理调用产出 JSON 数组计划（[{agent_name, step_number}]，可带
//! clarification_message）。解析规则：取首个 `[` 到末个 `]` 之间的子串按 JSON 解析；
//! 完全没有方括号视为自由文本回答（直接回给用户，本轮结束）；括号内 JSON 畸形
//! 是致命解析错误，不做部分修复（与单对象修复 repair.rs 形成对照）。

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::agents::AgentRegistry;
use crate::core::SleuthError;
use crate::llm::LlmClient;
use crate::memory::Message;

/// 终结构件步骤的固定智能体名
pub const BUILDER_AGENT: &str = "DashboardBuilder";

/// 计划中的一步
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub agent_name: String,
    /// 执行顺序由编号决定而非数组下标；推理服务偶尔给出字符串形式的编号
    #[serde(default = "default_step_number", deserialize_with = "step_number")]
    pub step_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_message: Option<String>,
}

fn default_step_number() -> u32 {
    1
}

fn step_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                serde::de::Error::custom("step_number is not a positive integer in range")
            }),
        Value::String(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| serde::de::Error::custom("step_number string is not numeric")),
        _ => Err(serde::de::Error::custom("step_number has unexpected type")),
    }
}

/// 生成结果：结构化计划，或推理服务的自由文本回答
#[derive(Debug, Clone)]
pub enum PlanOutcome {
    Plan(Vec<PlanStep>),
    Direct(String),
}

/// 从推理服务输出中解析计划：首个 `[` 到末个 `]`
pub fn parse_plan(text: &str) -> Result<PlanOutcome, SleuthError> {
    let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) else {
        return Ok(PlanOutcome::Direct(text.trim().to_string()));
    };
    if end < start {
        return Ok(PlanOutcome::Direct(text.trim().to_string()));
    }
    let steps: Vec<PlanStep> = serde_json::from_str(&text[start..=end])
        .map_err(|e| SleuthError::PlanParse(format!("invalid plan JSON: {}", e)))?;
    Ok(PlanOutcome::Plan(steps))
}

/// 计划生成器：编排者角色的 system prompt + 注册表目录
pub struct PlanGenerator {
    llm: Arc<dyn LlmClient>,
    registry: Arc<AgentRegistry>,
}

impl PlanGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<AgentRegistry>) -> Self {
        Self { llm, registry }
    }

    /// 生成计划；query 已由调用方拼好上下文（历史、重试说明）
    pub async fn generate(&self, query: &str) -> Result<PlanOutcome, SleuthError> {
        let messages = vec![
            Message::system(orchestrator_system_prompt(&self.registry)),
            Message::user(query.to_string()),
        ];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(SleuthError::Llm)?;
        tracing::debug!(output = %output, "planner raw output");
        parse_plan(&output)
    }
}

/// 编排者 system prompt：智能体目录、输出语法、先探索后澄清策略。
/// Verifier 复用同一 prompt（校验角色通过用户消息切换）。
pub(crate) fn orchestrator_system_prompt(registry: &AgentRegistry) -> String {
    format!(
            r#"You are a Multi-Agent Orchestrator, designed to coordinate support across multiple agents. Your role is to:
1. Analyze incoming user queries and determine the most appropriate specialized agents to handle them:
{catalog}
- Category: Visualization, Agent_name: {builder}, Agent_Description: A specialized agent designed to build dashboards based on the collected data.
2. Key Responsibilities:
- Accurately classify user queries by domain area.
- A user query could be served by multiple agents.
- If your previous plan failed try a new plan using DIFFERENT agents or approaches.
- You should only call the specialized agents once you have all necessary data from the user.
- You will output an execution plan of a list of agents to call based on the user query.
- You will also act as a Verifier when told to do so. When in the verifier role you will verify if you can answer the users question. If there are repeated issues in calling tools add a tool_error field in the output json.
3. CRITICAL DECISION MAKING RULES:
- EXHAUST ALL AGENT OPTIONS FIRST: before asking the user for clarification, you MUST consider and potentially try ALL available agents that could help with the query.
- PROGRESSIVE EXPLORATION: on subsequent calls, identify which agents you haven't yet utilized and prioritize them.
- USER CLARIFICATION AS LAST RESORT: only seek user clarification when you have exhausted all relevant agents, multiple agents have failed, the query is genuinely ambiguous, or you need preferences no agent can determine.
- SYSTEMATIC RETRY STRATEGY: if an agent fails, try alternative agents before returning to the user.
4. Output the execution plan response in the following format:
- MANDATORY: An ordered Json List of agent_names and step_number and/or clarification_message
[
    {{
        "agent_name": "Name of the Agent",
        "step_number": 1
    }}
]
- MANDATORY: If you need data from User then agent_name should be "User" and corresponding user question to ask:
[
    {{
        "agent_name": "User",
        "clarification_message": "What kind of dashboard are you looking for",
        "step_number": 1
    }}
]
- MANDATORY: Verifier. When in the Verifier role verify if you can answer the user query and reply as below:
[
    {{
        "agent_name": "User",
        "can_answer": "yes" or "no",
        "step_number": 1
    }}
]
- MANDATORY: Verifier. When in the Verifier role if you see repeated tool call errors and you cant answer the user query reply as below:
[
    {{
        "agent_name": "User",
        "can_answer": "no",
        "tool_error": "yes",
        "tool_name": "Name of tool causing the error",
        "step_number": 1
    }}
]
- MANDATORY: You will only return a json list and nothing else.
IMPORTANT:
- For dashboard requests, always ensure we have enough data points to call the dashboard builder. Explore ALL available data sources before asking the user.
- Each retry should demonstrate learning from previous attempts by trying different agent combinations.
- User clarification should be specific and targeted, indicating you've exhausted technical solutions.
REMEMBER: Your goal is to be resourceful and thorough in exploring all available agents before involving the user. The user should be your last resort, not your second option."#,
        catalog = registry.catalog_section(),
        builder = BUILDER_AGENT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_with_surrounding_prose() {
        let text = "Here is my plan:\n[{\"agent_name\": \"Mysql\", \"step_number\": 1}]\nDone.";
        let PlanOutcome::Plan(steps) = parse_plan(text).unwrap() else {
            panic!("expected plan");
        };
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].agent_name, "Mysql");
        assert_eq!(steps[0].step_number, 1);
    }

    #[test]
    fn test_parse_plan_accepts_string_step_numbers() {
        let text = r#"[{"agent_name": "Redis", "step_number": "2"}]"#;
        let PlanOutcome::Plan(steps) = parse_plan(text).unwrap() else {
            panic!("expected plan");
        };
        assert_eq!(steps[0].step_number, 2);
    }

    #[test]
    fn test_parse_plan_rejects_out_of_range_step_numbers() {
        let text = r#"[{"agent_name": "Mysql", "step_number": 4294967297}]"#;
        let err = parse_plan(text).unwrap_err();
        assert!(matches!(err, SleuthError::PlanParse(_)));
    }

    #[test]
    fn test_parse_plan_without_brackets_is_direct_answer() {
        let PlanOutcome::Direct(text) = parse_plan("I can answer that directly: 42.").unwrap()
        else {
            panic!("expected direct answer");
        };
        assert_eq!(text, "I can answer that directly: 42.");
    }

    #[test]
    fn test_parse_plan_malformed_json_is_fatal() {
        let err = parse_plan("[{\"agent_name\": }]").unwrap_err();
        assert!(matches!(err, SleuthError::PlanParse(_)));
    }

    #[test]
    fn test_parse_plan_uses_last_closing_bracket() {
        let text = r#"[{"agent_name": "Mysql", "step_number": 1, "tags": ["db"]}]"#;
        let PlanOutcome::Plan(steps) = parse_plan(text).unwrap() else {
            panic!("expected plan");
        };
        assert_eq!(steps[0].agent_name, "Mysql");
    }
}
