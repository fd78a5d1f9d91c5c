//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::{MockLlmClient, RecordedCall, ScriptedLlmClient};
pub use openai::{OpenAiClient, SamplingParams, TokenUsage};
pub use traits::{LlmClient, LlmError, ModelReply, ReplyFragment, ReplyStream, ToolSpec};

use crate::config::LlmSection;

/// 按 [llm] 配置创建客户端：provider = "mock" 时使用 MockLlmClient，其余走 OpenAI 兼容接口
pub fn create_llm_client(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    match cfg.provider.as_str() {
        "mock" => {
            tracing::info!("Using mock LLM client");
            Arc::new(MockLlmClient)
        }
        provider => {
            tracing::info!(provider, model = %cfg.model, "Using OpenAI-compatible LLM client");
            Arc::new(OpenAiClient::new(
                cfg.base_url.as_deref(),
                &cfg.model,
                cfg.api_key.as_deref(),
                SamplingParams {
                    max_tokens: cfg.max_tokens,
                    temperature: cfg.temperature,
                },
                cfg.timeouts.request,
            ))
        }
    }
}
