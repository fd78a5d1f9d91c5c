//! 工具执行器
//!
//! 持有 ToolRegistry、可选超时与进程级并发池。execute 的失败统一映射为 RelayError
//! （UnknownTool / ToolTimeout / ToolExecutionFailed），每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::{RelayError, ToolPool};
use crate::llm::ToolSpec;
use crate::tools::{Tool, ToolRegistry};

pub struct ToolExecutor {
    registry: ToolRegistry,
    /// None 表示不限时：后台执行允许任意长
    timeout: Option<Duration>,
    pool: ToolPool,
}

impl ToolExecutor {
    /// timeout_secs 为 0 时不设超时
    pub fn new(registry: ToolRegistry, timeout_secs: u64, pool: ToolPool) -> Self {
        Self {
            registry,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            pool,
        }
    }

    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<String, RelayError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| RelayError::UnknownTool(tool_name.to_string()))?;

        let _permit = self.pool.acquire().await;
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let result = match self.timeout {
            Some(limit) => match timeout(limit, tool.execute(args)).await {
                Ok(r) => r.map_err(|reason| RelayError::ToolExecutionFailed {
                    tool: tool_name.to_string(),
                    reason,
                }),
                Err(_) => Err(RelayError::ToolTimeout(tool_name.to_string())),
            },
            None => tool.execute(args).await.map_err(|reason| RelayError::ToolExecutionFailed {
                tool: tool_name.to_string(),
                reason,
            }),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(RelayError::ToolTimeout(_)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        result
    }

    /// 未注册的工具视为可取消（反正会立刻失败）
    pub fn is_cancellable(&self, tool_name: &str) -> bool {
        self.registry
            .get(tool_name)
            .map(|t| t.cancellable())
            .unwrap_or(true)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Sleepy;

    #[async_trait]
    impl Tool for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("woke".into())
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            Err("disk on fire".into())
        }
    }

    fn executor(timeout_secs: u64) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Sleepy);
        registry.register(Broken);
        registry.register(crate::tools::EchoTool);
        ToolExecutor::new(registry, timeout_secs, ToolPool::new(2))
    }

    #[tokio::test]
    async fn maps_failures_to_relay_errors() {
        let exec = executor(0);
        assert_eq!(
            exec.execute("nope", Value::Null).await.unwrap_err(),
            RelayError::UnknownTool("nope".into())
        );
        assert!(matches!(
            exec.execute("broken", Value::Null).await.unwrap_err(),
            RelayError::ToolExecutionFailed { reason, .. } if reason == "disk on fire"
        ));
        let ok = exec.execute("echo", serde_json::json!({"text": "hi"})).await.unwrap();
        assert_eq!(ok, "hi");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_applies_only_when_configured() {
        let exec = executor(1);
        assert_eq!(
            exec.execute("sleepy", Value::Null).await.unwrap_err(),
            RelayError::ToolTimeout("sleepy".into())
        );
        let unbounded = executor(0);
        assert_eq!(unbounded.execute("sleepy", Value::Null).await.unwrap(), "woke");
    }
}
