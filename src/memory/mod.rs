//! 记忆层：短期对话日志 + 按 session 落盘的历史

pub mod conversation;
pub mod history;

pub use conversation::{ConversationLog, Message, Role};
pub use history::HistoryStore;
