//! OpenAI 兼容 Chat Completions 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 function calling
//! （tools / assistant tool_calls / tool 角色消息）。流式调用逐段推送文本，
//! tool_calls 增量按 index 拼装，流结束时整体产出。

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionResponseStream, ChatCompletionTool,
    ChatCompletionTools, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    FunctionCall, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use crate::llm::{LlmClient, LlmError, ModelReply, ReplyFragment, ReplyStream, ToolSpec};
use crate::memory::{Message, Role, ToolCallRequest};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// 采样参数
#[derive(Debug, Clone)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: 1500,
            temperature: 0.7,
        }
    }
}

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    sampling: SamplingParams,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        sampling: SamplingParams,
        request_timeout_secs: u64,
    ) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url.trim_end_matches('/'))
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs.max(1)))
            .build()
            .unwrap_or_default();

        Self {
            client: Client::with_config(config).with_http_client(http),
            model: model.to_string(),
            sampling,
            usage: TokenUsage::default(),
        }
    }

    #[allow(deprecated)]
    fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(to_openai_messages(messages)?)
            .max_tokens(self.sampling.max_tokens)
            .temperature(self.sampling.temperature);
        if !tools.is_empty() {
            args.tools(to_openai_tools(tools)?);
        }
        args.build()
    }
}

fn to_openai_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    messages
        .iter()
        .map(|m| {
            Ok(match m.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(m.content.clone())
                    .build()?
                    .into(),
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(m.content.clone())
                    .build()?
                    .into(),
                Role::Assistant => {
                    let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                    if !m.content.is_empty() || m.tool_calls.is_empty() {
                        args.content(m.content.clone());
                    }
                    if !m.tool_calls.is_empty() {
                        args.tool_calls(
                            m.tool_calls
                                .iter()
                                .map(|c| {
                                    ChatCompletionMessageToolCalls::Function(
                                        ChatCompletionMessageToolCall {
                                            id: c.id.clone(),
                                            function: FunctionCall {
                                                name: c.name.clone(),
                                                arguments: c.arguments.clone(),
                                            },
                                        },
                                    )
                                })
                                .collect::<Vec<_>>(),
                        );
                    }
                    args.build()?.into()
                }
                Role::Tool => ChatCompletionRequestToolMessageArgs::default()
                    .tool_call_id(m.tool_call_id.clone().unwrap_or_default())
                    .content(m.content.clone())
                    .build()?
                    .into(),
            })
        })
        .collect()
}

fn to_openai_tools(tools: &[ToolSpec]) -> Result<Vec<ChatCompletionTools>, OpenAIError> {
    tools
        .iter()
        .map(|t| {
            let function = FunctionObjectArgs::default()
                .name(t.name.clone())
                .description(t.description.clone())
                .parameters(t.parameters.clone())
                .build()?;
            Ok(ChatCompletionTools::Function(ChatCompletionTool { function }))
        })
        .collect()
}

fn map_error(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::ApiError(api) => LlmError::Api(api.message),
        other => LlmError::Http(other.to_string()),
    }
}

/// 按 index 拼装流式 tool_calls 增量
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: BTreeMap<u32, ToolCallRequest>,
}

impl ToolCallAssembler {
    /// id / name 首次非空时记下，arguments 逐段追加
    pub fn feed(&mut self, index: u32, id: Option<&str>, name: Option<&str>, arguments: Option<&str>) {
        let call = self.calls.entry(index).or_insert_with(|| ToolCallRequest {
            id: String::new(),
            name: String::new(),
            arguments: String::new(),
        });
        if let Some(id) = id.filter(|s| !s.is_empty()) {
            if call.id.is_empty() {
                call.id = id.to_string();
            }
        }
        if let Some(name) = name.filter(|s| !s.is_empty()) {
            if call.name.is_empty() {
                call.name = name.to_string();
            }
        }
        if let Some(arguments) = arguments {
            call.arguments.push_str(arguments);
        }
    }

    /// 按 index 顺序产出；没有名字的残片丢弃
    pub fn finish(self) -> Vec<ToolCallRequest> {
        self.calls
            .into_values()
            .filter(|c| !c.name.is_empty())
            .collect()
    }
}

struct StreamState {
    inner: ChatCompletionResponseStream,
    calls: ToolCallAssembler,
    queue: VecDeque<Result<ReplyFragment, LlmError>>,
    usage: TokenUsage,
    finished: bool,
}

impl StreamState {
    async fn next_fragment(mut self) -> Option<(Result<ReplyFragment, LlmError>, Self)> {
        loop {
            if let Some(item) = self.queue.pop_front() {
                return Some((item, self));
            }
            if self.finished {
                return None;
            }
            match self.inner.next().await {
                Some(Ok(chunk)) => {
                    if let Some(usage) = &chunk.usage {
                        self.usage
                            .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
                    }
                    for choice in chunk.choices {
                        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                            self.queue.push_back(Ok(ReplyFragment::Text(text)));
                        }
                        for delta in choice.delta.tool_calls.unwrap_or_default() {
                            let function = delta.function.as_ref();
                            self.calls.feed(
                                delta.index,
                                delta.id.as_deref(),
                                function.and_then(|f| f.name.as_deref()),
                                function.and_then(|f| f.arguments.as_deref()),
                            );
                        }
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    self.queue.push_back(Err(map_error(e)));
                }
                None => {
                    self.finished = true;
                    let calls = std::mem::take(&mut self.calls).finish();
                    self.queue
                        .extend(calls.into_iter().map(|c| Ok(ReplyFragment::ToolCall(c))));
                }
            }
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<ModelReply, LlmError> {
        let request = self.build_request(messages, tools).map_err(map_error)?;
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_error)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let message = response
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::Empty)?
            .message;
        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|call| match call {
                ChatCompletionMessageToolCalls::Function(call) => Some(ToolCallRequest {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                }),
                _ => None,
            })
            .collect();
        Ok(ModelReply {
            content: message.content.unwrap_or_default(),
            tool_calls,
        })
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ReplyStream, LlmError> {
        let mut request = self.build_request(messages, tools).map_err(map_error)?;
        request.stream = Some(true);
        let inner = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(map_error)?;
        let state = StreamState {
            inner,
            calls: ToolCallAssembler::default(),
            queue: VecDeque::new(),
            usage: self.usage.clone(),
            finished: false,
        };
        Ok(Box::pin(stream::unfold(state, StreamState::next_fragment)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn client() -> OpenAiClient {
        OpenAiClient::new(Some("http://localhost:1/v1/"), "gpt-4", Some("k"), SamplingParams::default(), 5)
    }

    fn as_json(request: &CreateChatCompletionRequest) -> Value {
        serde_json::to_value(request).unwrap()
    }

    #[test]
    fn request_carries_tool_turns() {
        let calls = vec![ToolCallRequest {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: r#"{"text":"hi"}"#.into(),
        }];
        let messages = vec![
            Message::system("be brief"),
            Message::user("echo hi"),
            Message::assistant_with_calls("", calls),
            Message::tool_result("call_1", "hi"),
        ];
        let tools = vec![ToolSpec {
            name: "echo".into(),
            description: "Echo".into(),
            parameters: json!({"type": "object"}),
        }];
        let body = as_json(&client().build_request(&messages, &tools).unwrap());

        assert_eq!(body["model"], "gpt-4");
        assert!(body["messages"][2]["content"].is_null());
        assert_eq!(body["messages"][2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(body["messages"][2]["tool_calls"][0]["function"]["name"], "echo");
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "echo");
    }

    #[test]
    fn request_without_tools_omits_catalogue() {
        let body = as_json(&client().build_request(&[Message::user("hi")], &[]).unwrap());
        assert!(body.get("tools").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn tool_call_deltas_are_joined_by_index() {
        let mut calls = ToolCallAssembler::default();
        calls.feed(1, Some("call_b"), Some("echo"), Some(""));
        calls.feed(0, Some("call_a"), Some("get_current_time"), Some("{\"time"));
        calls.feed(1, None, None, Some("{\"text\":"));
        calls.feed(0, None, None, Some("zone\":\"UTC\"}"));
        calls.feed(1, Some(""), None, Some("\"hi\"}"));
        calls.feed(2, None, None, Some("stray"));

        let out = calls.finish();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "call_a");
        assert_eq!(out[0].name, "get_current_time");
        assert_eq!(out[0].arguments, r#"{"timezone":"UTC"}"#);
        assert_eq!(out[1].id, "call_b");
        assert_eq!(out[1].arguments, r#"{"text":"hi"}"#);
    }

    #[test]
    fn client_side_errors_map_to_transport() {
        let err = map_error(OpenAIError::InvalidArgument("bad".into()));
        assert!(matches!(err, LlmError::Http(msg) if msg.contains("bad")));
    }
}
