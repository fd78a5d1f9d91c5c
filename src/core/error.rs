//! 网关错误类型
//!
//! 传播策略：
//! - 工具失败被「收容」：转成 tool-result 轮次写入日志，不向上抛
//! - 模型调用失败被「暴露」：以 error 事件告知用户，会话回到 Idle
//! - 会话查找失败只影响当前请求

use thiserror::Error;

/// 网关运行过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// 未握手的通道发来消息，或会话已被移除
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Tool execution failed: {tool}: {reason}")]
    ToolExecutionFailed { tool: String, reason: String },

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// 会话关闭导致执行被取消，结果不再投递
    #[error("Tool cancelled: {0}")]
    ToolCancelled(String),

    #[error("Model call failed: {0}")]
    ModelCall(String),

    /// 试图写入会破坏 tool-call/tool-result 配对约束的轮次
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
}

impl RelayError {
    /// 写入 tool-result 轮次的结构化失败载荷
    pub fn to_tool_payload(&self) -> serde_json::Value {
        let kind = match self {
            RelayError::ToolTimeout(_) => "timeout",
            RelayError::UnknownTool(_) => "unknown_tool",
            RelayError::ToolCancelled(_) => "cancelled",
            _ => "execution_failed",
        };
        serde_json::json!({
            "error": kind,
            "message": self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_payload_carries_kind_and_message() {
        let err = RelayError::ToolTimeout("slow_process".into());
        let payload = err.to_tool_payload();
        assert_eq!(payload["error"], "timeout");
        assert!(payload["message"].as_str().unwrap().contains("slow_process"));
    }
}
