//! 对话消息与短期对话日志
//!
//! ConversationLog 按轮数上限截断，供 Planner / Verifier 拼接上下文。

use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 会话内对话日志：保留最近 max_turns 轮（user+assistant 各算一条）
#[derive(Debug, Clone)]
pub struct ConversationLog {
    messages: Vec<Message>,
    max_messages: usize,
}

impl ConversationLog {
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages: max_turns * 2,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 拼接为「Previous Conversations」文本段，嵌入 Planner / Verifier 的查询上下文
    pub fn context_section(&self) -> String {
        if self.messages.is_empty() {
            return String::new();
        }
        let lines: Vec<String> = self
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                };
                format!("[{}] {}", role, m.content)
            })
            .collect();
        lines.join("\n")
    }
}
