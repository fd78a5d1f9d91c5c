//! Relay - 实时对话网关
//!
//! 后台工具执行期间用户可以继续对话，同时保证交给模型的消息序列始终满足
//! 「带工具调用的 assistant 轮次之后必须先跟齐全部 tool-result」这一约束。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、工具并发池
//! - **gateway**: 会话、编排器、分类与临时回复、WebSocket 接入、诊断接口
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 会话内的对话日志
//! - **observability**: tracing 初始化
//! - **tools**: 工具箱与执行器

pub mod config;
pub mod core;
pub mod gateway;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;
