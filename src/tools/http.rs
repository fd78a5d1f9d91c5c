//! HTTP 工具：通用请求（http_request）与公网 IP 查询（get_public_ip）
//!
//! 仅允许 http/https。响应正文若是 JSON 则美化输出；超过 max_chars 时截断并追加 ...[truncated]。
//! 非 2xx 状态不算失败，状态码随结果一起交给模型。

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{parameters_for, parse_args, Tool};

pub const PUBLIC_IP_ENDPOINT: &str = "https://httpbin.org/ip";

fn build_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .user_agent(concat!("relay-agent/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

fn truncate(body: String, max_chars: usize) -> String {
    if body.chars().count() > max_chars {
        body.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        body
    }
}

#[derive(Deserialize, JsonSchema)]
struct HttpRequestArgs {
    /// 完整 URL（http:// 或 https://）
    url: String,
    /// GET / POST / PUT / DELETE，默认 GET
    #[serde(default)]
    method: Option<String>,
    /// 请求头
    #[serde(default)]
    headers: BTreeMap<String, String>,
    /// 查询参数
    #[serde(default)]
    params: BTreeMap<String, Value>,
}

pub struct HttpRequestTool {
    client: Client,
    max_chars: usize,
}

impl HttpRequestTool {
    pub fn new(timeout_secs: u64, max_chars: usize) -> Self {
        Self {
            client: build_client(timeout_secs),
            max_chars,
        }
    }

    fn build(&self, args: HttpRequestArgs) -> Result<reqwest::Request, String> {
        let url = args.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!("URL must start with http:// or https://, got {url:?}"));
        }
        let method = match args
            .method
            .as_deref()
            .map(|m| m.trim().to_ascii_uppercase())
            .as_deref()
        {
            None | Some("") | Some("GET") => Method::GET,
            Some("POST") => Method::POST,
            Some("PUT") => Method::PUT,
            Some("DELETE") => Method::DELETE,
            Some(other) => return Err(format!("Unsupported HTTP method: {other}")),
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &args.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| format!("Invalid header name {name:?}: {e}"))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| format!("Invalid header value for {name}: {e}"))?;
            headers.insert(name, value);
        }
        let query: Vec<(String, String)> = args
            .params
            .into_iter()
            .map(|(k, v)| match v {
                Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect();

        self.client
            .request(method, url)
            .headers(headers)
            .query(&query)
            .build()
            .map_err(|e| format!("Invalid request: {e}"))
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http_request"
    }

    fn description(&self) -> &str {
        "Make an HTTP request (GET, POST, PUT or DELETE) to an http(s) URL, with optional headers and query parameters."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<HttpRequestArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let request = self.build(parse_args(args)?)?;
        tracing::info!(method = %request.method(), url = %request.url(), "http_request");
        let resp = self
            .client
            .execute(request)
            .await
            .map_err(|e| format!("Request failed: {e}"))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| format!("Read body: {e}"))?;
        let body = match serde_json::from_str::<Value>(&body) {
            Ok(json) => serde_json::to_string_pretty(&json).unwrap_or(body),
            Err(_) => body,
        };
        Ok(format!(
            "Status: {}\nResponse: {}",
            status.as_u16(),
            truncate(body, self.max_chars)
        ))
    }
}

/// 公网 IP 查询（请求 httpbin 的 /ip）
pub struct PublicIpTool {
    client: Client,
    endpoint: String,
}

impl PublicIpTool {
    pub fn new(timeout_secs: u64) -> Self {
        Self::with_endpoint(timeout_secs, PUBLIC_IP_ENDPOINT)
    }

    pub fn with_endpoint(timeout_secs: u64, endpoint: impl Into<String>) -> Self {
        Self {
            client: build_client(timeout_secs),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Tool for PublicIpTool {
    fn name(&self) -> &str {
        "get_public_ip"
    }

    fn description(&self) -> &str {
        "Get the current public IP address of the server."
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        let data: Value = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| format!("Request failed: {e}"))?
            .json()
            .await
            .map_err(|e| format!("Unexpected response: {e}"))?;
        let origin = data
            .get("origin")
            .and_then(Value::as_str)
            .unwrap_or("Unknown");
        Ok(format!("Public IP: {origin}"))
    }
}
