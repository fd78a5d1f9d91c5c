//! 会话与会话注册表
//!
//! 每个会话独占一把 `tokio::sync::Mutex`，同一会话的事件在锁内串行处理；
//! 注册表自身只是一张 `RwLock<HashMap>`，是唯一跨会话共享的资源。
//! 加锁顺序固定为「先注册表后会话」，且持有会话锁时从不回头访问注册表。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::message::OutboundEvent;
use crate::memory::ConversationLog;

/// 会话 ID
pub type SessionId = String;

/// 当前可见活动；ProcessingTool 表示后台有工具在跑，不阻塞新消息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Thinking,
    Speaking,
    ProcessingTool,
}

/// 一次已启动、尚未结束的工具执行
#[derive(Debug)]
pub struct PendingExecution {
    pub tool_name: String,
    pub started_at: Instant,
    pub cancel: CancellationToken,
    /// 工具是否响应取消
    pub cancellable: bool,
}

/// 单个会话
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub state: SessionState,
    pub log: ConversationLog,
    /// call id -> 执行句柄；只在工具结束时移除
    pub pending: HashMap<String, PendingExecution>,
    /// 等待重放的用户文本（FIFO）
    pub sidelined: VecDeque<String>,
    /// 是否有模型调用在途
    pub turn_in_flight: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    closed: bool,
    outbound: Option<mpsc::UnboundedSender<OutboundEvent>>,
}

impl Session {
    pub fn new(
        id: SessionId,
        user_id: String,
        outbound: mpsc::UnboundedSender<OutboundEvent>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            state: SessionState::Idle,
            log: ConversationLog::new(),
            pending: HashMap::new(),
            sidelined: VecDeque::new(),
            turn_in_flight: false,
            created_at: now,
            last_activity_at: now,
            closed: false,
            outbound: Some(outbound),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 推送事件；会话已关闭或对端已断开时返回 false，不报错
    pub fn emit(&mut self, event: OutboundEvent) -> bool {
        let Some(tx) = self.outbound.as_ref() else {
            tracing::debug!(session_id = %self.id, "Session closed, event dropped");
            return false;
        };
        if tx.send(event).is_err() {
            tracing::debug!(session_id = %self.id, "Outbound receiver gone, event dropped");
            return false;
        }
        self.touch();
        true
    }

    /// 关闭会话：丢弃出站通道，取消可取消的工具执行，返回被取消的数量
    pub fn close(&mut self) -> usize {
        self.closed = true;
        self.outbound = None;
        self.sidelined.clear();
        let mut cancelled = 0;
        for (call_id, exec) in &self.pending {
            if exec.cancellable {
                exec.cancel.cancel();
                cancelled += 1;
            } else {
                tracing::info!(
                    session_id = %self.id,
                    call_id = %call_id,
                    tool = %exec.tool_name,
                    "Tool is not cancellable, result will be discarded"
                );
            }
        }
        cancelled
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            state: self.state,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
            message_count: self.log.len(),
            pending_count: self.pending.len(),
            queued_count: self.sidelined.len(),
        }
    }

    fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_activity_at < cutoff && self.pending.is_empty() && !self.turn_in_flight
    }
}

/// 诊断用的会话快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub user_id: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub message_count: usize,
    pub pending_count: usize,
    pub queued_count: usize,
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// 会话注册表
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取已有会话或新建；第二个返回值表示是否新建。已有会话原样返回，不替换通道
    pub async fn get_or_create(
        &self,
        id: &str,
        user_id: &str,
        outbound: mpsc::UnboundedSender<OutboundEvent>,
    ) -> (SessionHandle, bool) {
        if let Some(handle) = self.sessions.read().await.get(id) {
            return (handle.clone(), false);
        }
        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(id) {
            return (handle.clone(), false);
        }
        let handle = Arc::new(Mutex::new(Session::new(
            id.to_string(),
            user_id.to_string(),
            outbound,
        )));
        sessions.insert(id.to_string(), handle.clone());
        tracing::info!(session_id = %id, user_id = %user_id, "Session created");
        (handle, true)
    }

    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// 移出注册表并关闭会话
    pub async fn remove(&self, id: &str) -> Option<SessionHandle> {
        let handle = self.sessions.write().await.remove(id)?;
        let cancelled = handle.lock().await.close();
        tracing::info!(session_id = %id, cancelled, "Session removed");
        Some(handle)
    }

    pub async fn list(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn summary(&self, id: &str) -> Option<SessionSummary> {
        let handle = self.get(id).await?;
        let summary = handle.lock().await.summary();
        Some(summary)
    }

    /// 全部会话快照，按创建时间排序
    pub async fn summaries(&self) -> Vec<SessionSummary> {
        let mut out = Vec::new();
        for handle in self.list().await {
            out.push(handle.lock().await.summary());
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// 清理空闲超过 timeout 的会话（有工具未完成或模型调用在途的不动）
    pub async fn evict_idle(&self, timeout: Duration) -> Vec<SessionId> {
        let Ok(timeout) = chrono::Duration::from_std(timeout) else {
            return Vec::new();
        };
        let cutoff = Utc::now() - timeout;
        let mut idle = Vec::new();
        for handle in self.list().await {
            let session = handle.lock().await;
            if session.is_idle_since(cutoff) {
                idle.push(session.id.clone());
            }
        }
        for id in &idle {
            self.remove(id).await;
        }
        if !idle.is_empty() {
            tracing::info!(evicted = idle.len(), "Evicted idle sessions");
        }
        idle
    }
}
