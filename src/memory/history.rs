//! 对话历史落盘
//!
//! 每个 user id 一个 JSONL 文件（data_dir/history/<user_id>.jsonl），追加写入；
//! 会话过期或进程重启后，同一用户的新会话从这里恢复对话上下文。
//! 计划与数据集不持久化，只有对话历史是持久的。

use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::SleuthError;
use crate::memory::{Message, Role};

/// 单条落盘记录：消息 + 时间戳
#[derive(Debug, Serialize, Deserialize)]
struct HistoryRecord {
    role: Role,
    content: String,
    timestamp: String,
}

/// 按 user id 持久化对话历史的文件存储
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, SleuthError> {
        let dir = data_dir.into().join("history");
        std::fs::create_dir_all(&dir).map_err(|e| SleuthError::History(e.to_string()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        // user id 来自客户端，过滤防目录逃逸
        let safe: String = user_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        self.dir.join(format!("{}.jsonl", safe))
    }

    /// 追加一条消息
    pub fn append(&self, user_id: &str, message: &Message) -> Result<(), SleuthError> {
        let record = HistoryRecord {
            role: message.role,
            content: message.content.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let line =
            serde_json::to_string(&record).map_err(|e| SleuthError::History(e.to_string()))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(user_id))
            .map_err(|e| SleuthError::History(e.to_string()))?;
        writeln!(file, "{}", line).map_err(|e| SleuthError::History(e.to_string()))?;
        Ok(())
    }

    /// 读取某用户的全部历史；文件不存在时返回空
    pub fn load(&self, user_id: &str) -> Result<Vec<Message>, SleuthError> {
        let path = self.path_for(user_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text =
            std::fs::read_to_string(&path).map_err(|e| SleuthError::History(e.to_string()))?;
        let mut messages = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            // 坏行跳过，不让单条损坏记录挡住整个会话恢复
            if let Ok(record) = serde_json::from_str::<HistoryRecord>(line) {
                messages.push(Message {
                    role: record.role,
                    content: record.content,
                });
            }
        }
        Ok(messages)
    }
}
