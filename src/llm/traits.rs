//! LLM 客户端 trait

use async_trait::async_trait;

use crate::memory::Message;

/// LLM 客户端：非流式完成；调用方须容忍 JSON 周围的散文噪音
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
