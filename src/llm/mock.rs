//! Mock LLM 客户端（无需 API）
//!
//! - `MockLlmClient`：按关键词决定调用哪个内置工具，拿到工具结果后给出总结，便于本地跑通网关
//! - `ScriptedLlmClient`：按预设脚本逐次返回回复，并记录每次调用的消息快照（测试用）

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::llm::{LlmClient, LlmError, ModelReply, ToolSpec};
use crate::memory::{Message, Role, ToolCallRequest};

fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// 关键词驱动的 Mock：最后一条是 user 时尝试发起工具调用，最后一条是 tool 时总结结果
#[derive(Debug, Default)]
pub struct MockLlmClient;

impl MockLlmClient {
    fn pick_tool(text: &str, tools: &[ToolSpec]) -> Option<ToolCallRequest> {
        let lower = text.to_lowercase();
        let (name, arguments) = if lower.contains("time") || text.contains("时间") {
            ("get_current_time", serde_json::json!({}))
        } else if lower.contains("slow") || text.contains("慢") {
            ("slow_process", serde_json::json!({ "task_name": text }))
        } else if lower.contains("analy") || text.contains("分析") {
            ("text_analysis", serde_json::json!({ "text": text }))
        } else if lower.contains("weather") || text.contains("天气") {
            ("get_weather_info", serde_json::json!({ "location": text }))
        } else if let Some(expr) = lower.strip_prefix("calculate ") {
            ("calculate", serde_json::json!({ "expression": expr.trim() }))
        } else if lower.starts_with("echo ") {
            ("echo", serde_json::json!({ "text": text.get(5..).unwrap_or("").trim() }))
        } else {
            return None;
        };
        tools.iter().any(|t| t.name == name).then(|| ToolCallRequest {
            id: new_call_id(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        })
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<ModelReply, LlmError> {
        let last = messages.last().ok_or(LlmError::Empty)?;
        match last.role {
            Role::Tool => {
                let start = messages
                    .iter()
                    .rposition(|m| m.role == Role::Assistant && !m.tool_calls.is_empty())
                    .map(|i| i + 1)
                    .unwrap_or(0);
                let results: Vec<&str> = messages[start..]
                    .iter()
                    .filter(|m| m.role == Role::Tool)
                    .map(|m| m.content.as_str())
                    .collect();
                Ok(ModelReply::text(format!(
                    "Here is what I found: {}",
                    results.join("; ")
                )))
            }
            _ => match Self::pick_tool(&last.content, tools) {
                Some(call) => Ok(ModelReply::with_calls("Let me check that for you.", vec![call])),
                None => Ok(ModelReply::text(format!("You said: {}", last.content))),
            },
        }
    }
}

/// 一次被记录的模型调用
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    /// 本次是否提供了工具目录
    pub offered_tools: bool,
}

/// 脚本化 Mock：按顺序弹出预设回复；脚本耗尽后返回 fallback 文本
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    fallback: String,
    /// 设置后，每次调用先等待一次 notify 才返回（模拟长耗时模型调用）
    gate: Option<Arc<Notify>>,
}

impl ScriptedLlmClient {
    pub fn new(script: Vec<Result<ModelReply, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            fallback: "ok".to_string(),
            gate: None,
        }
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = text.into();
        self
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<ModelReply, LlmError> {
        self.calls.lock().await.push(RecordedCall {
            messages: messages.to_vec(),
            offered_tools: !tools.is_empty(),
        });
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(ModelReply::text(self.fallback.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: String::new(),
            parameters: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn mock_requests_known_tool_and_summarizes_result() {
        let llm = MockLlmClient;
        let tools = vec![spec("get_current_time")];
        let reply = llm.complete(&[Message::user("what time is it?")], &tools).await.unwrap();
        assert_eq!(reply.tool_calls[0].name, "get_current_time");

        let call_id = reply.tool_calls[0].id.clone();
        let messages = vec![
            Message::user("what time is it?"),
            Message::assistant_with_calls("", reply.tool_calls),
            Message::tool_result(call_id, "12:00"),
        ];
        let done = llm.complete(&messages, &[]).await.unwrap();
        assert!(!done.requests_tools());
        assert!(done.content.contains("12:00"));
    }

    #[tokio::test]
    async fn mock_passes_expression_to_calculator() {
        let reply = MockLlmClient
            .complete(&[Message::user("calculate 6 * 7")], &[spec("calculate")])
            .await
            .unwrap();
        assert_eq!(reply.tool_calls[0].name, "calculate");
        assert_eq!(reply.tool_calls[0].arguments, r#"{"expression":"6 * 7"}"#);
    }

    #[tokio::test]
    async fn mock_skips_tools_not_offered() {
        let reply = MockLlmClient
            .complete(&[Message::user("what time is it?")], &[])
            .await
            .unwrap();
        assert!(!reply.requests_tools());
    }

    #[tokio::test]
    async fn scripted_records_calls_and_falls_back() {
        let llm = ScriptedLlmClient::new(vec![Err(LlmError::Empty)]).with_fallback("done");
        assert!(llm.complete(&[Message::user("a")], &[]).await.is_err());
        let reply = llm.complete(&[Message::user("b")], &[spec("echo")]).await.unwrap();
        assert_eq!(reply.content, "done");

        let calls = llm.calls().await;
        assert_eq!(calls.len(), 2);
        assert!(!calls[0].offered_tools);
        assert!(calls[1].offered_tools);
    }
}
