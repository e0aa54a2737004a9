//! 智能体描述：能力元数据
//!
//! 每个配置的外部数据源对应一个 AgentDescriptor，启动注册后不可变。

use serde::Serialize;

use crate::proto::{Endpoint, ToolSpec};

/// 单个智能体的能力元数据：名称、类别、描述、连接参数、工具清单、领域规则
#[derive(Debug, Clone, Serialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub category: String,
    pub description: String,
    pub usage: String,
    pub rules: String,
    #[serde(skip)]
    pub endpoint: Endpoint,
    pub tools: Vec<ToolSpec>,
}

impl AgentDescriptor {
    /// Planner 目录中的一行
    pub fn catalog_line(&self) -> String {
        format!(
            "- Category: {}, Agent_name: {}, Agent_Description: {} {}",
            self.category, self.name, self.description, self.usage
        )
    }

    /// 工具清单 JSON，嵌入该智能体的 system prompt
    pub fn tool_catalog(&self) -> String {
        serde_json::to_string_pretty(&self.tools).unwrap_or_else(|_| "[]".to_string())
    }
}
