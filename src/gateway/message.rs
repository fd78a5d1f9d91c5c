//! 网关消息协议定义
//!
//! 入站帧与出站事件都是带 `type` 标签的 JSON 对象。

use serde::{Deserialize, Serialize};

/// 客户端发来的帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// 用户文本
    Text {
        #[serde(default)]
        content: String,
        #[serde(default, alias = "userId")]
        user_id: Option<String>,
    },

    /// 握手
    System {
        #[serde(default, alias = "userId")]
        user_id: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },

    /// 心跳 ping
    Ping {
        #[serde(default)]
        timestamp: u64,
    },

    /// 其他类型（如 audio），回复错误但保持连接
    #[serde(other)]
    Unsupported,
}

impl InboundMessage {
    /// 帧里携带的用户 ID（握手用）
    pub fn user_id(&self) -> Option<&str> {
        match self {
            InboundMessage::Text { user_id, .. } | InboundMessage::System { user_id, .. } => {
                user_id.as_deref().filter(|u| !u.trim().is_empty())
            }
            _ => None,
        }
    }

    /// 帧里携带的非空文本
    pub fn text(&self) -> Option<&str> {
        let text = match self {
            InboundMessage::Text { content, .. } => Some(content.as_str()),
            InboundMessage::System { content, .. } => content.as_deref(),
            _ => None,
        };
        text.filter(|t| !t.trim().is_empty())
    }
}

/// 推送给客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    SessionCreated {
        session_id: String,
        /// RFC 3339
        timestamp: String,
    },

    /// 状态旁白（欢迎语、"executing <tool>…"、排队提示等）
    System { content: String },

    /// 已收到用户消息
    MessageReceived { content: String },

    /// 模型调用开始
    AgentThinking { content: String },

    /// 流式片段
    ResponseChunk { content: String },

    /// 完整回复
    ResponseComplete { content: String },

    /// 工具未完成时本地合成的回复
    InterimReply {
        content: String,
        pending_count: usize,
    },

    Error { content: String },

    Pong { timestamp: u64 },
}

impl OutboundEvent {
    pub fn system(content: impl Into<String>) -> Self {
        OutboundEvent::System {
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        OutboundEvent::Error {
            content: content.into(),
        }
    }

    /// 序列化为文本帧
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","content":"serialization failed: {e}"}}"#)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inbound_frames_parse_by_type() {
        let text: InboundMessage =
            serde_json::from_value(json!({"type": "text", "content": "hi", "userId": "u1"})).unwrap();
        assert_eq!(text.user_id(), Some("u1"));
        assert_eq!(text.text(), Some("hi"));

        let hello: InboundMessage = serde_json::from_value(json!({"type": "system"})).unwrap();
        assert_eq!(hello.user_id(), None);
        assert_eq!(hello.text(), None);

        let audio: InboundMessage =
            serde_json::from_value(json!({"type": "audio", "data": "..."})).unwrap();
        assert_eq!(audio, InboundMessage::Unsupported);
    }

    #[test]
    fn blank_text_is_not_text() {
        let msg = InboundMessage::Text {
            content: "   ".into(),
            user_id: None,
        };
        assert_eq!(msg.text(), None);
    }

    #[test]
    fn outbound_events_are_tagged() {
        let v: serde_json::Value = serde_json::from_str(
            &OutboundEvent::InterimReply {
                content: "still working".into(),
                pending_count: 2,
            }
            .to_json(),
        )
        .unwrap();
        assert_eq!(v["type"], "interim_reply");
        assert_eq!(v["pending_count"], 2);

        let v: serde_json::Value =
            serde_json::from_str(&OutboundEvent::system("executing echo…").to_json()).unwrap();
        assert_eq!(v, json!({"type": "system", "content": "executing echo…"}));
    }
}
