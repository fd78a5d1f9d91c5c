//! LLM 客户端抽象
//!
//! 模型协作方被视为黑盒：给定有序消息序列（及可用工具目录），返回纯文本回复，
//! 或者点名零到多个工具调用的回复。complete_stream 默认把完整回复当作一个片段，
//! 支持流式的后端（OpenAiClient）覆盖它。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{stream, Stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::{Message, ToolCallRequest};

/// 暴露给模型的工具定义（function calling）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// 参数 JSON Schema
    pub parameters: serde_json::Value,
}

/// 一次模型调用的完整结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// 流式回复片段
#[derive(Clone, Debug, PartialEq)]
pub enum ReplyFragment {
    Text(String),
    ToolCall(ToolCallRequest),
}

pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<ReplyFragment, LlmError>> + Send>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Empty response from model")]
    Empty,
}

/// LLM 客户端 trait：非流式完成与流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；`tools` 为空表示本次不提供工具目录
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<ModelReply, LlmError>;

    /// 流式完成
    async fn complete_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ReplyStream, LlmError> {
        let reply = self.complete(messages, tools).await?;
        let mut fragments = Vec::with_capacity(reply.tool_calls.len() + 1);
        if !reply.content.is_empty() {
            fragments.push(Ok(ReplyFragment::Text(reply.content)));
        }
        fragments.extend(reply.tool_calls.into_iter().map(|c| Ok(ReplyFragment::ToolCall(c))));
        Ok(Box::pin(stream::iter(fragments)))
    }

    /// 累计 token 使用：(prompt, completion, total)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
