//! 实时对话网关
//!
//! ## 组成
//!
//! - **intent**：消息分类（状态询问 / 问候 / 提问 / 其他）
//! - **interim**：工具未完成时的临时回复模板
//! - **session**：会话状态与会话注册表
//! - **orchestrator**：对话编排器，维持 tool-call / tool-result 顺序约束
//! - **message**：入站帧与出站事件
//! - **hub**：WebSocket 接入与空闲会话清理
//! - **diagnostics**：只读 HTTP 诊断接口
//!
//! ## 数据流
//!
//! 入站帧 → Hub → 注册表找到会话 → 编排器检查未完成工具集合：
//! 为空则调用模型（可能启动后台工具后立即返回），非空则只回临时回复。
//! 工具完成事件回到编排器，写入结果；集合清空后发起收尾调用。

pub mod diagnostics;
pub mod hub;
pub mod intent;
pub mod interim;
pub mod message;
pub mod orchestrator;
pub mod session;

pub use hub::{Hub, HubConfig};
pub use intent::{classify, Category, Locale};
pub use interim::InterimReplySelector;
pub use message::{InboundMessage, OutboundEvent};
pub use orchestrator::{Disposition, Orchestrator};
pub use session::{
    PendingExecution, Session, SessionHandle, SessionId, SessionRegistry, SessionState,
    SessionSummary,
};
