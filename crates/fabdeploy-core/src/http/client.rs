//! Retrying, token-refreshing client for the REST service.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use super::error::ClientError;
use super::transport::{ApiRequest, ApiResponse, HttpTransport};
use crate::auth::TokenSource;
use crate::retry::{BackoffPolicy, Sleeper, ThreadSleeper};

/// Wraps an [`HttpTransport`] with backoff retries and proactive token refresh.
///
/// The token is read from the [`TokenSource`] before every attempt, including
/// the first, so a token that goes stale between retries is replaced. After
/// the retry budget is spent the last error is returned unchanged.
pub struct ResilientClient {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<TokenSource>,
    policy: BackoffPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ResilientClient {
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: Arc<TokenSource>) -> Self {
        Self {
            transport,
            tokens,
            policy: BackoffPolicy::default(),
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        self.transport.clone()
    }

    pub fn tokens(&self) -> &Arc<TokenSource> {
        &self.tokens
    }

    /// Sleeper shared with pollers built on top of this client.
    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        self.sleeper.clone()
    }

    pub fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ClientError> {
        let request = ApiRequest::new(method, path, body.cloned());
        let mut attempt: u32 = 0;

        loop {
            let err = match self.attempt(&request) {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if attempt >= self.policy.max_retries || !self.policy.is_retryable(&err) {
                return Err(err);
            }
            if err.is_status(401) {
                self.tokens.invalidate();
            }

            let delay = self.policy.delay(attempt);
            attempt += 1;
            warn!(
                attempt,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                method = %request.method,
                path = %request.path,
                error = %err,
                "Retrying request"
            );
            self.sleeper.sleep(delay);
        }
    }

    pub fn get(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.request(Method::GET, path, None)
    }

    pub fn post(&self, path: &str, body: &Value) -> Result<ApiResponse, ClientError> {
        self.request(Method::POST, path, Some(body))
    }

    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.get(path)?.json()
    }

    pub fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, ClientError> {
        self.post(path, body)?.json()
    }

    fn attempt(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let token = self
            .tokens
            .current_token()
            .map_err(|e| ClientError::Auth(format!("{e:#}")))?;
        self.transport.send(request, &token)
    }
}
