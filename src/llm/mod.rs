//! LLM 客户端抽象与实现
//!
//! 推理服务对编排层是不透明函数：complete(messages) -> text。
//! OpenAI 兼容端点走 async_openai；测试用 ScriptedLlm 按序回放预置回复。

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::ScriptedLlm;
pub use openai::OpenAiClient;
pub use traits::LlmClient;
