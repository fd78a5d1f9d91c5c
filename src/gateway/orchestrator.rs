//! 对话编排器
//!
//! 每个会话的事件（用户消息、工具完成）在会话锁内串行处理；模型调用与工具执行都在锁外进行。
//!
//! 流程：
//! - 用户消息：没有未完成工具且没有在途模型调用时，写入 user 轮次并启动一轮模型调用；
//!   有未完成工具时只回临时回复，文本按类别决定是否排队；模型调用在途时直接排队。
//! - 模型回复要求调用工具：写入 assistant 轮次，每个调用起一个后台任务，立即返回。
//! - 工具完成：写入 tool-result 轮次（失败写结构化错误载荷），未完成集合清空后
//!   发起一次不带工具目录的收尾调用，然后依次重放排队的文本。
//!
//! 工具任务的结果经 completion 通道交回编排器，由 `new` 里启动的泵任务转给
//! [`Orchestrator::on_tool_completion`]。

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use chrono::Utc;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::intent::classify;
use super::interim::InterimReplySelector;
use super::message::OutboundEvent;
use super::session::{PendingExecution, Session, SessionHandle, SessionRegistry, SessionState};
use crate::core::RelayError;
use crate::llm::{LlmClient, LlmError, ModelReply, ReplyFragment, ToolSpec};
use crate::memory::{Message, ToolCallRequest};
use crate::tools::ToolExecutor;

/// `on_user_message` 对一条消息的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// 已写入日志并启动模型调用
    Dispatched,
    /// 有工具未完成，已回复临时消息；`queued` 表示文本会在收尾后重放
    Interim {
        reply: String,
        pending_count: usize,
        queued: bool,
    },
    /// 模型调用在途，文本已排队
    Queued,
}

struct Completion {
    session_id: String,
    call_id: String,
    result: Result<String, RelayError>,
}

struct Inner {
    registry: Arc<SessionRegistry>,
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    selector: InterimReplySelector,
    system_prompt: String,
    welcome_message: String,
    completions: mpsc::UnboundedSender<Completion>,
}

/// 对话编排器（可廉价克隆）
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// 需要在 tokio 运行时内调用：会启动 completion 泵任务
    pub fn new(
        registry: Arc<SessionRegistry>,
        llm: Arc<dyn LlmClient>,
        executor: Arc<ToolExecutor>,
        system_prompt: impl Into<String>,
        welcome_message: impl Into<String>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            registry,
            llm,
            executor,
            selector: InterimReplySelector::new(),
            system_prompt: system_prompt.into(),
            welcome_message: welcome_message.into(),
            completions: tx,
        });
        tokio::spawn(completion_pump(Arc::downgrade(&inner), rx));
        Self { inner }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.inner.registry
    }

    /// 握手：创建会话（已存在则原样返回），新建时推送 session_created 与欢迎语
    pub async fn create_session(
        &self,
        session_id: &str,
        user_id: &str,
        outbound: mpsc::UnboundedSender<OutboundEvent>,
    ) -> SessionHandle {
        let (handle, created) = self
            .inner
            .registry
            .get_or_create(session_id, user_id, outbound)
            .await;
        if created {
            let mut session = handle.lock().await;
            session.emit(OutboundEvent::SessionCreated {
                session_id: session_id.to_string(),
                timestamp: Utc::now().to_rfc3339(),
            });
            session.emit(OutboundEvent::system(self.inner.welcome_message.clone()));
        }
        handle
    }

    /// 通道关闭：移除会话，取消可取消的工具
    pub async fn close_session(&self, session_id: &str) -> bool {
        self.inner.registry.remove(session_id).await.is_some()
    }

    pub async fn on_user_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<Disposition, RelayError> {
        let handle = self
            .inner
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))?;
        let mut session = handle.lock().await;
        if session.is_closed() {
            return Err(RelayError::SessionNotFound(session_id.to_string()));
        }
        session.touch();
        session.emit(OutboundEvent::MessageReceived {
            content: text.to_string(),
        });

        if !session.pending.is_empty() {
            let category = classify(text);
            let pending_count = session.pending.len();
            let reply = self.inner.selector.select(category, text, pending_count);
            let queued = category.replay_after_drain();
            if queued {
                session.sidelined.push_back(text.to_string());
            }
            tracing::debug!(
                session_id = %session_id,
                ?category,
                pending_count,
                queued,
                "Interim reply while tools are pending"
            );
            session.emit(OutboundEvent::InterimReply {
                content: reply.clone(),
                pending_count,
            });
            return Ok(Disposition::Interim {
                reply,
                pending_count,
                queued,
            });
        }

        if session.turn_in_flight {
            session.sidelined.push_back(text.to_string());
            let position = session.sidelined.len();
            tracing::debug!(session_id = %session_id, position, "Model call in flight, message queued");
            session.emit(OutboundEvent::system(format!(
                "Message queued (position {position}), I'll get to it right after the current reply."
            )));
            return Ok(Disposition::Queued);
        }

        session.log.push_user(text)?;
        session.turn_in_flight = true;
        drop(session);

        let this = self.clone();
        tokio::spawn(async move { this.drive(handle, true).await });
        Ok(Disposition::Dispatched)
    }

    /// 工具执行结束（成功或失败）。会话已关闭或已移除时结果被丢弃
    pub async fn on_tool_completion(
        &self,
        session_id: &str,
        call_id: &str,
        result: Result<String, RelayError>,
    ) -> Result<(), RelayError> {
        let Some(handle) = self.inner.registry.get(session_id).await else {
            tracing::info!(session_id = %session_id, call_id = %call_id, "Session gone, tool result discarded");
            return Ok(());
        };
        let mut session = handle.lock().await;
        if session.is_closed() {
            tracing::info!(session_id = %session_id, call_id = %call_id, "Session closed, tool result discarded");
            return Ok(());
        }
        let exec = session.pending.remove(call_id).ok_or_else(|| {
            RelayError::ProtocolViolation(format!("no pending execution with id {call_id}"))
        })?;

        let (payload, notice) = match result {
            Ok(output) => (output, format!("{} completed", exec.tool_name)),
            Err(e) => {
                let reason = match &e {
                    RelayError::ToolExecutionFailed { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                (
                    e.to_tool_payload().to_string(),
                    format!("{} failed: {reason}", exec.tool_name),
                )
            }
        };
        tracing::info!(
            session_id = %session_id,
            call_id = %call_id,
            tool = %exec.tool_name,
            elapsed_ms = exec.started_at.elapsed().as_millis() as u64,
            remaining = session.pending.len(),
            "Tool resolved"
        );
        session.log.push_tool_result(call_id, payload)?;
        session.emit(OutboundEvent::system(notice));

        if session.pending.is_empty() && !session.turn_in_flight {
            session.turn_in_flight = true;
            drop(session);
            let this = self.clone();
            tokio::spawn(async move { this.drive(handle, false).await });
        }
        Ok(())
    }

    /// 一轮或多轮模型调用：本轮结束后若有排队文本，继续下一轮
    async fn drive(self, handle: SessionHandle, mut offer_tools: bool) {
        loop {
            let Some(messages) = self.begin_turn(&handle).await else {
                return;
            };
            let tools: Vec<ToolSpec> = if offer_tools {
                self.inner.executor.specs()
            } else {
                Vec::new()
            };
            let outcome = self.call_model(&handle, &messages, &tools).await;

            let mut session = handle.lock().await;
            if session.is_closed() {
                tracing::info!(session_id = %session.id, "Session closed during model call, reply discarded");
                return;
            }
            let outcome = outcome.and_then(|reply| settle_reply(reply, offer_tools));
            match outcome {
                Ok(reply) if reply.requests_tools() => {
                    if self.launch_tools(&mut session, reply) {
                        session.turn_in_flight = false;
                        return;
                    }
                }
                Ok(reply) => {
                    session.state = SessionState::Speaking;
                    match session.log.push_assistant(reply.content.clone()) {
                        Ok(()) => {
                            session.emit(OutboundEvent::ResponseComplete {
                                content: reply.content,
                            });
                        }
                        Err(e) => report_failure(&mut session, &e.to_string()),
                    }
                    session.state = SessionState::Idle;
                }
                Err(e) => {
                    tracing::warn!(session_id = %session.id, error = %e, "Model call failed");
                    report_failure(&mut session, &RelayError::ModelCall(e.to_string()).to_string());
                }
            }

            session.turn_in_flight = false;
            let Some(next) = session.sidelined.pop_front() else {
                return;
            };
            if let Err(e) = session.log.push_user(next) {
                report_failure(&mut session, &e.to_string());
                return;
            }
            tracing::debug!(session_id = %session.id, remaining = session.sidelined.len(), "Replaying queued message");
            session.turn_in_flight = true;
            offer_tools = true;
        }
    }

    /// 进入 Thinking 并取出本轮要发给模型的消息（系统提示 + 日志）
    async fn begin_turn(&self, handle: &SessionHandle) -> Option<Vec<Message>> {
        let mut session = handle.lock().await;
        if session.is_closed() {
            return None;
        }
        session.turn_in_flight = true;
        if let Err(e) = session.log.ready_for_request() {
            tracing::error!(session_id = %session.id, error = %e, "Conversation log rejected before model call");
            report_failure(&mut session, &e.to_string());
            session.turn_in_flight = false;
            return None;
        }
        session.state = SessionState::Thinking;
        session.emit(OutboundEvent::AgentThinking {
            content: "Thinking...".to_string(),
        });
        let mut messages = Vec::with_capacity(session.log.len() + 1);
        messages.push(Message::system(self.inner.system_prompt.clone()));
        messages.extend_from_slice(session.log.messages());
        Some(messages)
    }

    /// 流式调用模型；文本片段逐个推送，工具调用片段收集起来
    async fn call_model(
        &self,
        handle: &SessionHandle,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, LlmError> {
        let mut stream = self.inner.llm.complete_stream(messages, tools).await?;
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        while let Some(fragment) = stream.next().await {
            match fragment? {
                ReplyFragment::Text(chunk) => {
                    content.push_str(&chunk);
                    let mut session = handle.lock().await;
                    if session.is_closed() {
                        continue;
                    }
                    session.state = SessionState::Speaking;
                    session.emit(OutboundEvent::ResponseChunk { content: chunk });
                }
                ReplyFragment::ToolCall(call) => tool_calls.push(call),
            }
        }
        let (prompt, completion, total) = self.inner.llm.token_usage();
        tracing::debug!(prompt, completion, total, "Cumulative token usage");
        if content.trim().is_empty() && tool_calls.is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(ModelReply {
            content,
            tool_calls,
        })
    }

    /// 写入 tool-call 轮次并启动全部执行；失败时返回 false（已报错）
    fn launch_tools(&self, session: &mut Session, mut reply: ModelReply) -> bool {
        assign_call_ids(&mut reply.tool_calls);
        if let Err(e) = session
            .log
            .push_tool_calls(reply.content, reply.tool_calls.clone())
        {
            report_failure(session, &e.to_string());
            return false;
        }
        session.state = SessionState::ProcessingTool;
        for call in reply.tool_calls {
            self.launch(session, call);
        }
        true
    }

    fn launch(&self, session: &mut Session, call: ToolCallRequest) {
        let cancel = CancellationToken::new();
        let cancellable = self.inner.executor.is_cancellable(&call.name);
        session.pending.insert(
            call.id.clone(),
            PendingExecution {
                tool_name: call.name.clone(),
                started_at: Instant::now(),
                cancel: cancel.clone(),
                cancellable,
            },
        );
        session.emit(OutboundEvent::system(format!("executing {}…", call.name)));
        tracing::info!(
            session_id = %session.id,
            call_id = %call.id,
            tool = %call.name,
            cancellable,
            "Launching tool"
        );

        let executor = Arc::clone(&self.inner.executor);
        let completions = self.inner.completions.clone();
        let session_id = session.id.clone();
        tokio::spawn(async move {
            let result = match parse_arguments(&call) {
                Err(e) => Err(e),
                Ok(args) if cancellable => {
                    tokio::select! {
                        r = executor.execute(&call.name, args) => r,
                        _ = cancel.cancelled() => Err(RelayError::ToolCancelled(call.name.clone())),
                    }
                }
                Ok(args) => executor.execute(&call.name, args).await,
            };
            let completion = Completion {
                session_id,
                call_id: call.id,
                result,
            };
            if completions.send(completion).is_err() {
                tracing::debug!("Orchestrator dropped, tool result discarded");
            }
        });
    }
}

/// 每个完成事件各起一个任务，等某个会话锁时不拖住其他会话
async fn completion_pump(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<Completion>) {
    while let Some(c) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let orchestrator = Orchestrator { inner };
        tokio::spawn(async move {
            if let Err(e) = orchestrator
                .on_tool_completion(&c.session_id, &c.call_id, c.result)
                .await
            {
                tracing::warn!(session_id = %c.session_id, call_id = %c.call_id, error = %e, "Tool completion rejected");
            }
        });
    }
}

/// 缺失或重复的调用 ID 换成新的唯一 ID，保证每个调用各有一条 tool-result 轮次
fn assign_call_ids(calls: &mut [ToolCallRequest]) {
    let mut seen = HashSet::new();
    for call in calls.iter_mut() {
        if call.id.trim().is_empty() || seen.contains(&call.id) {
            let fresh = format!("call_{}", uuid::Uuid::new_v4().simple());
            tracing::warn!(tool = %call.name, original = %call.id, fresh = %fresh, "Replacing missing or duplicate tool call id");
            call.id = fresh;
        }
        seen.insert(call.id.clone());
    }
}

/// 收尾调用不提供工具，回复里若仍带工具调用则忽略，只保留文本
fn settle_reply(reply: ModelReply, offer_tools: bool) -> Result<ModelReply, LlmError> {
    if offer_tools || !reply.requests_tools() {
        return Ok(reply);
    }
    tracing::warn!(calls = reply.tool_calls.len(), "Ignoring tool calls in finalizing reply");
    if reply.content.trim().is_empty() {
        Err(LlmError::Empty)
    } else {
        Ok(ModelReply::text(reply.content))
    }
}

fn parse_arguments(call: &ToolCallRequest) -> Result<Value, RelayError> {
    if call.arguments.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(&call.arguments).map_err(|e| RelayError::ToolExecutionFailed {
        tool: call.name.clone(),
        reason: format!("invalid arguments: {e}"),
    })
}

fn report_failure(session: &mut Session, message: &str) {
    session.emit(OutboundEvent::error(message));
    session.state = SessionState::Idle;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: "c1".into(),
            name: "echo".into(),
            arguments: args.into(),
        }
    }

    #[test]
    fn arguments_parse_or_fail_as_tool_error() {
        assert_eq!(parse_arguments(&call("")).unwrap(), serde_json::json!({}));
        assert_eq!(
            parse_arguments(&call(r#"{"text":"hi"}"#)).unwrap()["text"],
            "hi"
        );
        let err = parse_arguments(&call("{not json")).unwrap_err();
        assert!(matches!(err, RelayError::ToolExecutionFailed { .. }));
    }

    #[test]
    fn missing_and_repeated_call_ids_are_replaced() {
        let mut calls = vec![call("{}"), call("{}"), call("{}")];
        calls[2].id = String::new();
        assign_call_ids(&mut calls);

        assert_eq!(calls[0].id, "c1");
        assert!(calls[1].id.starts_with("call_"));
        assert!(calls[2].id.starts_with("call_"));
        assert_ne!(calls[1].id, calls[2].id);
    }

    #[test]
    fn finalizing_reply_drops_tool_calls() {
        let reply = ModelReply::with_calls("done", vec![call("{}")]);
        let settled = settle_reply(reply.clone(), false).unwrap();
        assert!(!settled.requests_tools());
        assert_eq!(settled.content, "done");
        assert!(settle_reply(reply, true).unwrap().requests_tools());

        let bare = ModelReply::with_calls("", vec![call("{}")]);
        assert_eq!(settle_reply(bare, false).unwrap_err(), LlmError::Empty);
    }
}
