//! 智能体层：描述、注册表、专职执行循环

pub mod descriptor;
pub mod registry;
pub mod runner;

pub use descriptor::AgentDescriptor;
pub use registry::AgentRegistry;
pub use runner::{AgentInvoker, AgentRunner};
