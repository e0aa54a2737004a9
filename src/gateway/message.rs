//! 客户端消息协议
//!
//! WebSocket 入站消息的统一格式；出站消息就是序列化后的 StreamEvent。

use serde::Deserialize;
use serde_json::Value;

/// 客户端发来的消息（tag 在 type 字段）
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// 新的用户查询
    ChatMessage {
        message: String,
        #[serde(default)]
        user_id: Option<String>,
    },

    /// 对 confirmation_needed 事件的确认回执：原样带回计划与原始查询
    ConfirmPlan {
        plan: Value,
        original_query: String,
        #[serde(default)]
        is_single_widget: bool,
    },

    /// 用当前会话累积的数据集直接生成单个组件
    BuildWidget { message: String },

    /// 心跳
    Ping {
        #[serde(default)]
        timestamp: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_parses() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type": "chat_message", "message": "show devices", "user_id": "u1"}"#,
        )
        .unwrap();
        let ClientMessage::ChatMessage { message, user_id } = msg else {
            panic!("expected chat_message");
        };
        assert_eq!(message, "show devices");
        assert_eq!(user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_confirm_plan_defaults_widget_flag() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type": "confirm_plan", "plan": [{"agent_name": "Mysql", "step_number": 1}], "original_query": "q"}"#,
        )
        .unwrap();
        let ClientMessage::ConfirmPlan {
            is_single_widget, ..
        } = msg
        else {
            panic!("expected confirm_plan");
        };
        assert!(!is_single_widget);
    }
}
