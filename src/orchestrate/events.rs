//! 过程流事件：推送给传输层的增量进度
//!
//! 事件是瞬态的，只推不存；向已关闭的传输发送是 no-op 而非错误（断连容忍）。

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// 连接握手（允许重复出现）
    Connected,
    Thinking,
    Content,
    Error,
    ToolUse,
    ConfirmationNeeded,
    DashboardFile,
    HtmlContent,
    End,
}

/// 单条流事件
#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub is_partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// 附加字段（如 confirmation_needed 的 plan/original_query、tool_use 的 tool/input）
    #[serde(flatten)]
    pub extra: Option<Value>,
}

impl StreamEvent {
    fn base(kind: EventKind) -> Self {
        Self {
            kind,
            content: None,
            is_partial: true,
            timestamp: None,
            metadata: None,
            title: None,
            extra: None,
        }
    }

    pub fn connected(session_id: &str) -> Self {
        let mut ev = Self::base(EventKind::Connected);
        ev.is_partial = false;
        ev.extra = Some(serde_json::json!({ "session_id": session_id }));
        ev
    }

    pub fn thinking(content: impl Into<String>) -> Self {
        let mut ev = Self::base(EventKind::Thinking);
        ev.content = Some(content.into());
        ev
    }

    pub fn content_final(content: impl Into<String>) -> Self {
        let mut ev = Self::base(EventKind::Content);
        ev.content = Some(content.into());
        ev.is_partial = false;
        ev
    }

    pub fn error(content: impl Into<String>) -> Self {
        let mut ev = Self::base(EventKind::Error);
        ev.content = Some(content.into());
        ev.is_partial = false;
        ev
    }

    pub fn tool_use(tool: &str, input: Value) -> Self {
        let mut ev = Self::base(EventKind::ToolUse);
        ev.extra = Some(serde_json::json!({ "tool": tool, "input": input }));
        ev
    }

    pub fn confirmation_needed(plan: Value, original_query: &str) -> Self {
        let mut ev = Self::base(EventKind::ConfirmationNeeded);
        ev.is_partial = false;
        ev.extra = Some(serde_json::json!({
            "plan": plan,
            "original_query": original_query,
        }));
        ev
    }

    pub fn dashboard_file(file_name: &str, metadata: Value) -> Self {
        let mut ev = Self::base(EventKind::DashboardFile);
        ev.content = Some(file_name.to_string());
        ev.is_partial = false;
        ev.timestamp = Some(chrono::Utc::now().to_rfc3339());
        ev.metadata = Some(metadata);
        ev
    }

    pub fn html_content(html: impl Into<String>, title: &str, metadata: Value) -> Self {
        let mut ev = Self::base(EventKind::HtmlContent);
        ev.content = Some(html.into());
        ev.is_partial = false;
        ev.title = Some(title.to_string());
        ev.metadata = Some(metadata);
        ev
    }

    pub fn end() -> Self {
        let mut ev = Self::base(EventKind::End);
        ev.is_partial = false;
        ev.timestamp = Some(chrono::Utc::now().to_rfc3339());
        ev
    }
}

/// 事件发送端：对关闭的接收端静默丢弃
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self { tx }
    }

    /// 无消费者的发送端（测试、后台任务）
    pub fn null() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    pub fn emit(&self, event: StreamEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let ev = StreamEvent::thinking("working...");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "thinking");
        assert_eq!(json["content"], "working...");
        assert_eq!(json["is_partial"], true);
    }

    #[test]
    fn test_confirmation_event_carries_plan() {
        let plan = serde_json::json!([{ "agent_name": "Mysql", "step_number": 1 }]);
        let ev = StreamEvent::confirmation_needed(plan.clone(), "show devices");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["plan"], plan);
        assert_eq!(json["original_query"], "show devices");
    }

    #[test]
    fn test_emit_to_closed_receiver_is_noop() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = EventSink::new(tx);
        sink.emit(StreamEvent::end());
    }
}
