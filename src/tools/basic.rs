//! 基础工具：当前时间、文本统计、模拟慢任务，以及天气与外部服务两个占位工具
//!
//! get_current_time 与 slow_process 可配置人为延迟，用来演示后台执行期间会话仍可交互。

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{parameters_for, parse_args, Tool};

#[derive(Deserialize, JsonSchema)]
struct CurrentTimeArgs {
    /// 时区（目前仅支持 UTC）
    #[serde(default)]
    timezone: Option<String>,
}

/// 当前 UTC 时间
pub struct CurrentTimeTool {
    delay: Duration,
}

impl CurrentTimeTool {
    pub fn new(delay_secs: u64) -> Self {
        Self {
            delay: Duration::from_secs(delay_secs),
        }
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time (UTC)."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<CurrentTimeArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: CurrentTimeArgs = parse_args(args)?;
        let now = chrono::Utc::now();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let stamp = now.format("%Y-%m-%d %H:%M:%S");
        match args.timezone.as_deref().map(str::trim) {
            Some(tz) if !tz.is_empty() && !tz.eq_ignore_ascii_case("utc") => Ok(format!(
                "Current time (UTC): {stamp} (timezone {tz} is not supported yet)"
            )),
            _ => Ok(format!("Current time (UTC): {stamp}")),
        }
    }
}

#[derive(Deserialize, JsonSchema)]
struct TextAnalysisArgs {
    /// 要分析的文本
    text: String,
}

/// 文本统计：词数、字符数、句子数
pub struct TextAnalysisTool;

fn analyze(text: &str) -> String {
    let words = text.split_whitespace().count();
    let chars = text.chars().count();
    let chars_no_spaces = text.chars().filter(|c| *c != ' ').count();
    let sentences = text.split('.').filter(|s| !s.trim().is_empty()).count();
    let avg = words as f64 / sentences.max(1) as f64;
    format!(
        "Text Analysis Results:\n- Word count: {words}\n- Character count: {chars}\n- Character count (no spaces): {chars_no_spaces}\n- Estimated sentence count: {sentences}\n- Average words per sentence: {avg:.2}"
    )
}

#[async_trait]
impl Tool for TextAnalysisTool {
    fn name(&self) -> &str {
        "text_analysis"
    }

    fn description(&self) -> &str {
        "Analyze text for basic metrics like word count and character count."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<TextAnalysisArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: TextAnalysisArgs = parse_args(args)?;
        Ok(analyze(&args.text))
    }
}

#[derive(Deserialize, JsonSchema)]
struct SlowProcessArgs {
    /// 任务名
    #[serde(default)]
    task_name: Option<String>,
}

/// 模拟长耗时任务
pub struct SlowProcessTool {
    duration: Duration,
}

impl SlowProcessTool {
    pub fn new(secs: u64) -> Self {
        Self {
            duration: Duration::from_secs(secs),
        }
    }
}

#[async_trait]
impl Tool for SlowProcessTool {
    fn name(&self) -> &str {
        "slow_process"
    }

    fn description(&self) -> &str {
        "Simulate a slow background process that takes a while to complete."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<SlowProcessArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: SlowProcessArgs = parse_args(args)?;
        let name = args.task_name.unwrap_or_else(|| "slow process".to_string());
        tokio::time::sleep(self.duration).await;
        Ok(format!(
            "Process '{name}' completed after {} seconds of work.",
            self.duration.as_secs()
        ))
    }
}

#[derive(Deserialize, JsonSchema)]
struct WeatherArgs {
    /// 城市或地点名称
    location: String,
}

/// 天气查询（占位实现，尚未接入天气 API）
pub struct WeatherInfoTool;

#[async_trait]
impl Tool for WeatherInfoTool {
    fn name(&self) -> &str {
        "get_weather_info"
    }

    fn description(&self) -> &str {
        "Get weather information for a location (placeholder, no live data yet)."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<WeatherArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: WeatherArgs = parse_args(args)?;
        Ok(format!(
            "Weather information for {}: this tool is a placeholder. Live conditions, temperature, \
humidity and forecast will come from a weather API once one is integrated.",
            args.location.trim()
        ))
    }
}

#[derive(Deserialize, JsonSchema)]
struct PlaceholderApiArgs {
    /// 服务名
    service_name: String,
    /// 要执行的动作
    action: String,
    /// 调用参数
    #[serde(default)]
    parameters: Option<serde_json::Map<String, Value>>,
}

/// 外部服务调用占位：原样回显服务、动作与参数
pub struct PlaceholderApiTool;

#[async_trait]
impl Tool for PlaceholderApiTool {
    fn name(&self) -> &str {
        "placeholder_api_call"
    }

    fn description(&self) -> &str {
        "Placeholder for future API integrations; echoes the service, action and parameters."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<PlaceholderApiArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: PlaceholderApiArgs = parse_args(args)?;
        let parameters = Value::Object(args.parameters.unwrap_or_default());
        let pretty = serde_json::to_string_pretty(&parameters).map_err(|e| e.to_string())?;
        Ok(format!(
            "Placeholder API call:\nService: {}\nAction: {}\nParameters: {pretty}\n\n\
No integration is wired to this service yet.",
            args.service_name, args.action
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_counts_words_and_sentences() {
        let report = analyze("One two three. Four five.");
        assert!(report.contains("Word count: 5"));
        assert!(report.contains("Estimated sentence count: 2"));
        assert!(report.contains("Average words per sentence: 2.50"));
    }

    #[tokio::test]
    async fn text_analysis_requires_text() {
        let err = TextAnalysisTool.execute(Value::Null).await.unwrap_err();
        assert!(err.starts_with("Invalid arguments"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_process_reports_task_name() {
        let tool = SlowProcessTool::new(10);
        let out = tool
            .execute(serde_json::json!({ "task_name": "report" }))
            .await
            .unwrap();
        assert_eq!(out, "Process 'report' completed after 10 seconds of work.");
    }

    #[tokio::test]
    async fn clock_accepts_missing_args() {
        let out = CurrentTimeTool::new(0).execute(Value::Null).await.unwrap();
        assert!(out.starts_with("Current time (UTC): "));
    }

    #[tokio::test]
    async fn clock_flags_unsupported_timezone() {
        let tool = CurrentTimeTool::new(0);
        let out = tool
            .execute(serde_json::json!({ "timezone": "Europe/Madrid" }))
            .await
            .unwrap();
        assert!(out.ends_with("(timezone Europe/Madrid is not supported yet)"));
        let out = tool.execute(serde_json::json!({ "timezone": "utc" })).await.unwrap();
        assert!(!out.contains("not supported"));
    }

    #[tokio::test]
    async fn weather_names_the_location() {
        let out = WeatherInfoTool
            .execute(serde_json::json!({ "location": " Lima " }))
            .await
            .unwrap();
        assert!(out.starts_with("Weather information for Lima:"));
        assert!(WeatherInfoTool.execute(Value::Null).await.is_err());
    }

    #[tokio::test]
    async fn placeholder_api_echoes_request() {
        let out = PlaceholderApiTool
            .execute(serde_json::json!({
                "service_name": "crm",
                "action": "lookup",
                "parameters": { "customer": 42 }
            }))
            .await
            .unwrap();
        assert!(out.contains("Service: crm"));
        assert!(out.contains("Action: lookup"));
        assert!(out.contains("\"customer\": 42"));

        let out = PlaceholderApiTool
            .execute(serde_json::json!({ "service_name": "crm", "action": "ping" }))
            .await
            .unwrap();
        assert!(out.contains("Parameters: {}"));
    }
}
