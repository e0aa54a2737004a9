//! 会话管理
//!
//! 每个会话的编排状态由处理它的连接任务独占。Arc<Mutex<..>> 是按轮次移交
//! 所有权的载体，不是细粒度临界区：驱动一轮的任务从头到尾持锁（包括轮内的
//! 推理与工具调用 await），同一会话的各轮因此天然串行，过期清理用 try_lock
//! 把持锁中的会话视为活跃。注册表等跨会话数据启动后只读。
//! 新会话创建时从 HistoryStore 恢复该用户的既往对话。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use crate::memory::HistoryStore;
use crate::orchestrate::SessionState;

/// 单个会话：编排状态 + 活跃时间
pub struct Session {
    pub state: SessionState,
    pub last_active: Instant,
    pub created_at: Instant,
}

impl Session {
    pub fn new(user_id: String, max_context_turns: usize) -> Self {
        let id = format!("session_{}", uuid::Uuid::new_v4());
        Self {
            state: SessionState::new(id, user_id, max_context_turns),
            last_active: Instant::now(),
            created_at: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_active.elapsed() > timeout
    }
}

/// 会话管理器：user_id 到会话的映射，历史恢复与过期清理
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    user_sessions: RwLock<HashMap<String, String>>,
    history: Arc<HistoryStore>,
    max_context_turns: usize,
    session_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        history: Arc<HistoryStore>,
        max_context_turns: usize,
        session_timeout_secs: u64,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            user_sessions: RwLock::new(HashMap::new()),
            history,
            max_context_turns,
            session_timeout: Duration::from_secs(session_timeout_secs),
        }
    }

    /// 取用户的现有会话，没有则新建并从落盘历史恢复对话；返回 (session_id, 会话句柄)
    pub async fn get_or_create(&self, user_id: &str) -> (String, Arc<Mutex<Session>>) {
        if let Some(session_id) = self.user_sessions.read().await.get(user_id).cloned() {
            if let Some(session) = self.sessions.read().await.get(&session_id).cloned() {
                return (session_id, session);
            }
        }

        let mut session = Session::new(user_id.to_string(), self.max_context_turns);
        match self.history.load(user_id) {
            Ok(messages) => {
                for message in messages {
                    session.state.conversation.push(message);
                }
            }
            Err(e) => {
                tracing::warn!(user = %user_id, error = %e, "history restore failed");
            }
        }
        let session_id = session.state.session_id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), Arc::clone(&handle));
        self.user_sessions
            .write()
            .await
            .insert(user_id.to_string(), session_id.clone());
        tracing::info!(user = %user_id, session = %session_id, "session created");
        (session_id, handle)
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// 清理过期会话；正在被任务驱动的会话（锁被占）视为活跃，跳过
    pub async fn cleanup_expired(&self) -> usize {
        let mut expired = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, handle) in sessions.iter() {
                if let Ok(session) = handle.try_lock() {
                    if session.is_expired(self.session_timeout) {
                        expired.push((id.clone(), session.state.user_id.clone()));
                    }
                }
            }
        }
        let count = expired.len();
        if count > 0 {
            let mut sessions = self.sessions.write().await;
            let mut users = self.user_sessions.write().await;
            for (id, user_id) in expired {
                sessions.remove(&id);
                if users.get(&user_id) == Some(&id) {
                    users.remove(&user_id);
                }
            }
        }
        count
    }
}
