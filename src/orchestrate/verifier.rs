//! 结果校验：一次推理调用判定累积回复是否足以回答原始查询
//!
//! 校验裁决走修复管线（repair.rs）解析。tool_error 出现即硬停（不看 can_answer）；
//! can_answer == "yes" 进入报告路径；裁决完全不可解析时按「视为已解决」兜底，
//! 直接把原始合并回复交给用户。其余情况触发下一轮计划迭代。

use std::sync::Arc;

use crate::agents::AgentRegistry;
use crate::core::SleuthError;
use crate::llm::LlmClient;
use crate::memory::Message;

use super::planner::orchestrator_system_prompt;
use super::repair::{extract_and_fix_json, get_json_key, Repaired};

/// 校验裁决
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// 数据充分，进入报告路径
    Resolved,
    /// 工具反复失败，硬停并提示联系管理员
    ToolError { tool_name: String },
    /// 数据不足，编排器开始下一轮迭代
    Unresolved,
    /// 裁决不可解析，按已解决兜底（原始合并回复直接回给用户）
    ParseFallback,
}

/// 校验器：与计划生成共用编排者 system prompt，通过用户消息切换角色
pub struct Verifier {
    llm: Arc<dyn LlmClient>,
    registry: Arc<AgentRegistry>,
}

impl Verifier {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<AgentRegistry>) -> Self {
        Self { llm, registry }
    }

    /// 判定合并后的智能体回复能否回答查询
    pub async fn verify(
        &self,
        user_query: &str,
        plan_rendered: &str,
        combined_response: &str,
    ) -> Result<Verdict, SleuthError> {
        let verifier_input = format!(
            "User Query: {}. We called the following agents: {}. Agent Responses: {}",
            user_query, plan_rendered, combined_response
        );
        let messages = vec![
            Message::system(orchestrator_system_prompt(&self.registry)),
            Message::user(format!(
                "Assume the verifier role and let us know if this data is sufficient to answer the user query: {}",
                verifier_input
            )),
        ];
        let raw = self
            .llm
            .complete(&messages)
            .await
            .map_err(SleuthError::Llm)?;
        tracing::debug!(output = %raw, "verifier raw output");
        Ok(parse_verdict(&raw))
    }
}

/// 从原始校验回复解析裁决
pub fn parse_verdict(raw: &str) -> Verdict {
    let Some(repaired) = extract_and_fix_json(raw) else {
        tracing::warn!("verifier reply had no JSON object, treating query as resolved");
        return Verdict::ParseFallback;
    };

    // tool_error 的判定是键（或子串）是否出现，与取值无关
    let tool_error_present = match &repaired {
        Repaired::Json(value) => value.get("tool_error").is_some(),
        Repaired::Text(text) => text.contains("tool_error"),
    };
    if tool_error_present {
        let tool_name =
            get_json_key(&repaired, "tool_name").unwrap_or_else(|| "unknown".to_string());
        return Verdict::ToolError { tool_name };
    }

    match get_json_key(&repaired, "can_answer") {
        Some(v) if v.eq_ignore_ascii_case("yes") => Verdict::Resolved,
        _ => Verdict::Unresolved,
    }
}
