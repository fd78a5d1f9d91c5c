//! 对话日志
//!
//! 只追加、不重排。核心约束：最近一条带 tool_calls 的 assistant 轮次中，
//! 只要还有调用 ID 没有对应的 tool-result 轮次，就不允许再写入 user 轮次。
//! 违反约束的写入返回 `ProtocolViolation`，日志保持不变。

use serde::{Deserialize, Serialize};

use crate::core::RelayError;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 模型发起的一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// 调用 ID，用于与 tool-result 轮次配对
    pub id: String,
    pub name: String,
    /// 原始 JSON 参数字符串（模型输出，可能不合法）
    pub arguments: String,
}

/// 单条消息（一个轮次）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// assistant 轮次请求的工具调用
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// tool-result 轮次所应答的调用 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// 会话的有序对话日志
#[derive(Clone, Debug, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 最近一条带 tool_calls 的 assistant 轮次中尚未应答的调用 ID
    pub fn outstanding_calls(&self) -> Vec<&str> {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant && !m.tool_calls.is_empty())
        else {
            return Vec::new();
        };
        let answered: Vec<&str> = self.messages[pos + 1..]
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        self.messages[pos]
            .tool_calls
            .iter()
            .map(|c| c.id.as_str())
            .filter(|id| !answered.contains(id))
            .collect()
    }

    /// 日志当前能否接收新的 user 轮次（或发起模型调用）
    pub fn accepts_user_turn(&self) -> bool {
        self.outstanding_calls().is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> Result<(), RelayError> {
        self.ensure_settled("user turn")?;
        self.messages.push(Message::user(content));
        Ok(())
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) -> Result<(), RelayError> {
        self.ensure_settled("assistant turn")?;
        self.messages.push(Message::assistant(content));
        Ok(())
    }

    pub fn push_tool_calls(
        &mut self,
        content: impl Into<String>,
        calls: Vec<ToolCallRequest>,
    ) -> Result<(), RelayError> {
        self.ensure_settled("assistant tool-call turn")?;
        if calls.is_empty() {
            return Err(RelayError::ProtocolViolation(
                "assistant tool-call turn without calls".into(),
            ));
        }
        for (i, call) in calls.iter().enumerate() {
            if call.id.trim().is_empty() {
                return Err(RelayError::ProtocolViolation(format!(
                    "tool call {} has no id",
                    call.name
                )));
            }
            if calls[..i].iter().any(|c| c.id == call.id) {
                return Err(RelayError::ProtocolViolation(format!(
                    "duplicate tool call id {}",
                    call.id
                )));
            }
        }
        self.messages.push(Message::assistant_with_calls(content, calls));
        Ok(())
    }

    /// 写入 tool-result 轮次；调用 ID 必须属于最近一次尚未应答的调用
    pub fn push_tool_result(
        &mut self,
        call_id: &str,
        content: impl Into<String>,
    ) -> Result<(), RelayError> {
        if !self.outstanding_calls().contains(&call_id) {
            return Err(RelayError::ProtocolViolation(format!(
                "no outstanding tool call with id {call_id}"
            )));
        }
        self.messages.push(Message::tool_result(call_id, content));
        Ok(())
    }

    fn ensure_settled(&self, what: &str) -> Result<(), RelayError> {
        let outstanding = self.outstanding_calls();
        if outstanding.is_empty() {
            Ok(())
        } else {
            Err(RelayError::ProtocolViolation(format!(
                "{what} while tool calls are unanswered: {}",
                outstanding.join(", ")
            )))
        }
    }

    /// 顺序校验；工具执行期间日志末尾的未应答调用是合法的
    pub fn validate(&self) -> Result<(), RelayError> {
        check_order(&self.messages).map(|_| ())
    }

    /// 能否原样作为一次模型请求：顺序合法且没有未应答调用
    pub fn ready_for_request(&self) -> Result<(), RelayError> {
        validate_messages(&self.messages)
    }
}

/// 校验一次模型请求：每个 tool_calls 轮次之后紧跟其全部结果，
/// 结果齐全之前不出现其他角色的轮次，末尾也不能留有未应答调用。
pub fn validate_messages(messages: &[Message]) -> Result<(), RelayError> {
    let open = check_order(messages)?;
    if open.is_empty() {
        Ok(())
    } else {
        Err(RelayError::ProtocolViolation(format!(
            "request ends with unanswered tool calls: {}",
            open.join(", ")
        )))
    }
}

/// 返回末尾仍未应答的调用 ID
fn check_order(messages: &[Message]) -> Result<Vec<&str>, RelayError> {
    let mut open: Vec<&str> = Vec::new();
    for (idx, m) in messages.iter().enumerate() {
        match m.role {
            Role::Tool => {
                let id = m.tool_call_id.as_deref().unwrap_or_default();
                match open.iter().position(|c| *c == id) {
                    Some(i) => {
                        open.remove(i);
                    }
                    None => {
                        return Err(RelayError::ProtocolViolation(format!(
                            "turn {idx}: tool result {id} answers no open call"
                        )))
                    }
                }
            }
            _ if !open.is_empty() => {
                return Err(RelayError::ProtocolViolation(format!(
                    "turn {idx}: {:?} turn before calls {} were answered",
                    m.role,
                    open.join(", ")
                )))
            }
            Role::Assistant => {
                open = m.tool_calls.iter().map(|c| c.id.as_str()).collect();
            }
            _ => {}
        }
    }
    Ok(open)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: "echo".to_string(),
            arguments: "{}".to_string(),
        }
    }

    #[test]
    fn user_turn_rejected_while_calls_outstanding() {
        let mut log = ConversationLog::new();
        log.push_user("hi").unwrap();
        log.push_tool_calls("", vec![call("a"), call("b")]).unwrap();
        log.push_tool_result("a", "ok").unwrap();

        let err = log.push_user("are you there?").unwrap_err();
        assert!(matches!(err, RelayError::ProtocolViolation(_)));
        assert_eq!(log.len(), 3);
        assert_eq!(log.outstanding_calls(), vec!["b"]);

        log.push_tool_result("b", "ok").unwrap();
        assert!(log.accepts_user_turn());
        log.push_user("thanks").unwrap();
        log.validate().unwrap();
    }

    #[test]
    fn tool_result_must_answer_open_call() {
        let mut log = ConversationLog::new();
        log.push_user("hi").unwrap();
        assert!(log.push_tool_result("ghost", "x").is_err());

        log.push_tool_calls("", vec![call("a")]).unwrap();
        log.push_tool_result("a", "ok").unwrap();
        assert!(log.push_tool_result("a", "again").is_err());
    }

    #[test]
    fn validate_detects_interleaved_user_turn() {
        let log = ConversationLog {
            messages: vec![
                Message::user("hi"),
                Message::assistant_with_calls("", vec![call("a")]),
                Message::user("hello?"),
                Message::tool_result("a", "ok"),
            ],
        };
        assert!(log.validate().is_err());
    }

    #[test]
    fn request_check_rejects_trailing_unanswered_calls() {
        let mut log = ConversationLog::new();
        log.push_user("hi").unwrap();
        log.push_tool_calls("", vec![call("a"), call("b")]).unwrap();
        log.push_tool_result("a", "ok").unwrap();

        log.validate().unwrap();
        assert!(log.ready_for_request().is_err());
        assert!(validate_messages(log.messages()).is_err());

        log.push_tool_result("b", "ok").unwrap();
        log.ready_for_request().unwrap();
    }

    #[test]
    fn tool_turn_needs_distinct_non_empty_ids() {
        let mut log = ConversationLog::new();
        log.push_user("hi").unwrap();
        assert!(log.push_tool_calls("", vec![call("a"), call("a")]).is_err());
        assert!(log.push_tool_calls("", vec![call(" ")]).is_err());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn empty_call_list_is_not_a_tool_turn() {
        let mut log = ConversationLog::new();
        assert!(log.push_tool_calls("", vec![]).is_err());
        assert!(log.is_empty());
    }
}
