//! 编排错误类型
//!
//! 所有失败在最近的组件边界转为 SleuthError，再由会话层转为 error 流事件并终止本轮——不做静默吞错。

use thiserror::Error;

/// 编排过程中可能出现的错误（配置、计划解析、LLM、智能体调用、构件生成等）
#[derive(Error, Debug)]
pub enum SleuthError {
    #[error("Config error: {0}")]
    Config(String),

    /// 计划文本括号内的 JSON 无法解析——本轮致命，不做局部修复
    #[error("Plan parse error: {0}")]
    PlanParse(String),

    #[error("LLM error: {0}")]
    Llm(String),

    /// 计划引用了未注册的智能体——终止剩余步骤
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent {agent} invocation failed: {reason}")]
    AgentInvocation { agent: String, reason: String },

    /// 工具协议传输层错误（连接、JSON-RPC 往返）
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Verifier 显式上报的工具反复失败，直接终止会话循环
    #[error("Tool {0} is repeatedly failing")]
    ToolFailing(String),

    #[error("Artifact generation failed: {0}")]
    Artifact(String),

    #[error("History persistence error: {0}")]
    History(String),
}
