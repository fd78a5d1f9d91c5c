//! 记忆层：会话内的有序对话日志

pub mod conversation;

pub use conversation::{validate_messages, ConversationLog, Message, Role, ToolCallRequest};
