//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `RELAY__*` 覆盖（双下划线表示嵌套，如 `RELAY__LLM__PROVIDER=mock`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
}

/// [app] 段：监听地址、会话空闲回收、提示词
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// WebSocket 监听地址
    pub bind_addr: String,
    /// 诊断 HTTP 接口监听地址
    pub diagnostics_addr: String,
    /// 会话空闲多久后被回收（秒），0 表示不回收
    pub session_idle_timeout_secs: u64,
    pub system_prompt: Option<String>,
    pub welcome_message: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "relay".to_string(),
            bind_addr: "127.0.0.1:9000".to_string(),
            diagnostics_addr: "127.0.0.1:9001".to_string(),
            session_idle_timeout_secs: 3600,
            system_prompt: None,
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
        }
    }
}

pub const DEFAULT_WELCOME_MESSAGE: &str =
    "Hi! I'm your assistant. Ask me anything, and keep talking while I work on longer tasks.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a conversational voice assistant. Keep answers concise and natural. \
If you need a tool, say briefly what you are about to do. Keep track of earlier context, \
and reassure the user when a tool takes a while.";

impl AppSection {
    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}

/// [llm] 段：后端选择、采样参数与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai（任意 OpenAI 兼容端点）/ mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时回退到 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            base_url: None,
            api_key: None,
            max_tokens: 1500,
            temperature: 0.7,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [tools] 段：单次调用超时、并发上限、内置工具参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒），0 表示不限
    pub tool_timeout_secs: u64,
    /// 进程内同时运行的工具执行数上限
    pub max_concurrent: usize,
    /// slow_process 工具的模拟耗时（秒）
    pub slow_process_secs: u64,
    /// get_current_time 工具的模拟延迟（秒）
    pub clock_delay_secs: u64,
    /// http_request / get_public_ip 的请求超时（秒）
    pub http_timeout_secs: u64,
    /// http_request 返回正文的最大字符数
    pub http_max_chars: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 0,
            max_concurrent: 8,
            slow_process_secs: 10,
            clock_delay_secs: 0,
            http_timeout_secs: 30,
            http_max_chars: 4000,
        }
    }
}

/// 从 config 目录加载配置，环境变量 RELAY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 RELAY__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RELAY")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[app]\nbind_addr = \"0.0.0.0:7000\"\n\n[llm]\nprovider = \"mock\"\n\n[tools]\nmax_concurrent = 2"
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.app.bind_addr, "0.0.0.0:7000");
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.tools.max_concurrent, 2);
        // 未出现的键保持默认值
        assert_eq!(cfg.app.session_idle_timeout_secs, 3600);
        assert_eq!(cfg.tools.tool_timeout_secs, 0);
    }

    #[test]
    fn system_prompt_falls_back_to_default() {
        let app = AppSection::default();
        assert_eq!(app.system_prompt(), DEFAULT_SYSTEM_PROMPT);
    }
}
