//! 工具箱：注册表、执行器与内置工具

pub mod basic;
pub mod calculator;
pub mod echo;
pub mod executor;
pub mod http;
pub mod registry;
pub mod schema;

pub use basic::{
    CurrentTimeTool, PlaceholderApiTool, SlowProcessTool, TextAnalysisTool, WeatherInfoTool,
};
pub use calculator::CalculatorTool;
pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use http::{HttpRequestTool, PublicIpTool};
pub use registry::{Tool, ToolRegistry};
pub use schema::{parameters_for, parse_args};

use crate::config::ToolsSection;
use crate::core::ToolPool;

/// 按 [tools] 配置注册全部内置工具并创建执行器
pub fn create_tool_executor(cfg: &ToolsSection) -> ToolExecutor {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    registry.register(CurrentTimeTool::new(cfg.clock_delay_secs));
    registry.register(CalculatorTool);
    registry.register(TextAnalysisTool);
    registry.register(WeatherInfoTool);
    registry.register(SlowProcessTool::new(cfg.slow_process_secs));
    registry.register(HttpRequestTool::new(cfg.http_timeout_secs, cfg.http_max_chars));
    registry.register(PublicIpTool::new(cfg.http_timeout_secs));
    registry.register(PlaceholderApiTool);

    tracing::info!(tools = ?registry.tool_names(), "Registered tools");
    ToolExecutor::new(registry, cfg.tool_timeout_secs, ToolPool::new(cfg.max_concurrent))
}
