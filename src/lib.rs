//! Sleuth - 多智能体数据编排系统
//!
//! 把自然语言数据查询变成有序可修订的执行计划，经人工确认后逐步调用外部
//! 工具智能体，校验结果充分性并有界重试，全程向客户端流式推送进度。
//!
//! 模块划分：
//! - **agents**: 智能体描述、注册表与专职执行循环
//! - **artifacts**: 仪表盘 / 报告 / 组件的生成管线与文件存储
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 统一错误类型
//! - **gateway**: WebSocket 网关、HTTP API、会话管理
//! - **llm**: 推理服务客户端抽象与实现（OpenAI 兼容 / 脚本化测试桩）
//! - **memory**: 对话日志与历史落盘
//! - **orchestrate**: 计划生成、确认、执行、校验与有界重试循环
//! - **proto**: 工具协议客户端（JSON-RPC over HTTP / stdio）

pub mod agents;
pub mod artifacts;
pub mod config;
pub mod core;
pub mod gateway;
pub mod llm;
pub mod memory;
pub mod orchestrate;
pub mod proto;

pub use config::{load_config, AppConfig};
pub use core::SleuthError;
