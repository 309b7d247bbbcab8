//! Single-attempt HTTP transport and the reqwest-backed implementation.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use super::error::ClientError;

/// A request relative to the service base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            body,
        }
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Decode the body; a missing body decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        let body = self.body.clone().unwrap_or(Value::Null);
        serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// Sends one request, no retries.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &ApiRequest, token: &str) -> Result<ApiResponse, ClientError>;
}

/// reqwest client driven from synchronous code on a current-thread runtime.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
    runtime: tokio::runtime::Runtime,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = normalize_base_url(base_url)?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("fabdeploy/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;
        Ok(Self {
            client,
            base_url,
            runtime,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::Other(format!("Invalid request path '{path}': {e}")))
    }

    async fn send_async(
        &self,
        request: &ApiRequest,
        token: &str,
    ) -> Result<ApiResponse, ClientError> {
        let url = self.endpoint(&request.path)?;
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .bearer_auth(token);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();
        let text = response.text().await.map_err(map_reqwest_error)?;

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let body = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))?)
        };
        Ok(ApiResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &ApiRequest, token: &str) -> Result<ApiResponse, ClientError> {
        self.runtime.block_on(self.send_async(request, token))
    }
}

fn normalize_base_url(raw: &str) -> anyhow::Result<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash).with_context(|| format!("Invalid API base URL: {raw}"))
}

fn map_reqwest_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout(err.to_string())
    } else if err.is_connect() {
        ClientError::Connect(err.to_string())
    } else {
        ClientError::Other(err.to_string())
    }
}
