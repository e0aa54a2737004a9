//! 测试用 LLM：按序回放预置回复
//!
//! 编排循环每次 complete 取下一条脚本；脚本耗尽后重复最后一条，便于写多迭代测试。

use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::Message;

/// 脚本化 LLM 客户端：记录收到的 prompt，按序返回预置回复
pub struct ScriptedLlm {
    replies: Vec<String>,
    cursor: Mutex<usize>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: replies.into_iter().map(String::from).collect(),
            cursor: Mutex::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的完成调用次数
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// 第 n 次调用收到的最后一条消息内容
    pub fn prompt_at(&self, n: usize) -> Option<String> {
        self.prompts.lock().unwrap().get(n).cloned()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(last);

        let mut cursor = self.cursor.lock().unwrap();
        let reply = self
            .replies
            .get(*cursor)
            .or_else(|| self.replies.last())
            .cloned()
            .ok_or_else(|| "ScriptedLlm has no replies".to_string())?;
        *cursor += 1;
        Ok(reply)
    }
}
