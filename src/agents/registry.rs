//! 智能体注册表
//!
//! 启动时从配置注册全部智能体（建连一次以枚举工具），此后只读共享；
//! open(name) 每次返回全新协议连接——执行器每个步骤付一次建连成本。

use std::collections::HashMap;

use crate::config::AgentConfig;
use crate::core::SleuthError;
use crate::proto::ToolConnection;

use super::descriptor::AgentDescriptor;

/// 按名称索引的智能体注册表；注册仅发生在启动阶段
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentDescriptor>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从配置逐个建连、枚举工具并注册；单个智能体失败只记日志跳过，不拖垮启动
    pub async fn bootstrap(configs: &[AgentConfig]) -> Self {
        let mut registry = Self::new();
        for cfg in configs {
            match ToolConnection::open(&cfg.endpoint).await {
                Ok(mut conn) => match conn.list_tools().await {
                    Ok(tools) => {
                        tracing::info!(
                            agent = %cfg.name,
                            tool_count = tools.len(),
                            "registered agent"
                        );
                        registry.register(AgentDescriptor {
                            name: cfg.name.clone(),
                            category: cfg.category.clone(),
                            description: cfg.description.clone(),
                            usage: cfg.usage.clone(),
                            rules: cfg.rules.clone(),
                            endpoint: cfg.endpoint.clone(),
                            tools,
                        });
                    }
                    Err(e) => {
                        tracing::error!(agent = %cfg.name, error = %e, "tool listing failed, agent skipped");
                    }
                },
                Err(e) => {
                    tracing::error!(agent = %cfg.name, error = %e, "connection failed, agent skipped");
                }
            }
        }
        registry
    }

    pub fn register(&mut self, descriptor: AgentDescriptor) {
        self.agents.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&AgentDescriptor> {
        self.agents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.values()
    }

    /// 为一次调用打开全新连接；未注册返回 AgentNotFound
    pub async fn open(&self, name: &str) -> Result<ToolConnection, SleuthError> {
        let descriptor = self
            .agents
            .get(name)
            .ok_or_else(|| SleuthError::AgentNotFound(name.to_string()))?;
        ToolConnection::open(&descriptor.endpoint).await
    }

    /// Planner 用的智能体目录段落
    pub fn catalog_section(&self) -> String {
        let mut lines: Vec<String> = self.iter().map(|a| a.catalog_line()).collect();
        lines.sort();
        lines.join("\n")
    }
}
