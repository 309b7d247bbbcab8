//! Polls an operation handle until it reaches a terminal state or the poll
//! budget runs out.
//!
//! A timeout is reported separately from failure: it means the final state is
//! unknown, whereas Failed and Cancelled are authoritative.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{Operation, OperationStatus};
use crate::http::{ClientError, ResilientClient};
use crate::retry::Sleeper;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub max_attempts: u32,
    /// Used when the start call gave no `Retry-After` hint.
    pub default_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            default_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The operation reached Succeeded, Failed, or Cancelled.
    Completed { operation: Operation, polls: u32 },
    /// The poll budget ran out before a terminal state was observed.
    TimedOut {
        operation_id: String,
        polls: u32,
        last_status: OperationStatus,
    },
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            PollOutcome::Completed { operation, .. } if operation.status == OperationStatus::Succeeded
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PollOutcome::TimedOut { .. })
    }

    pub fn polls(&self) -> u32 {
        match self {
            PollOutcome::Completed { polls, .. } | PollOutcome::TimedOut { polls, .. } => *polls,
        }
    }

    /// Final (or last observed) status.
    pub fn status(&self) -> OperationStatus {
        match self {
            PollOutcome::Completed { operation, .. } => operation.status,
            PollOutcome::TimedOut { last_status, .. } => *last_status,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OperationBody {
    #[serde(default)]
    status: Option<String>,
}

pub struct OperationPoller {
    client: Arc<ResilientClient>,
    sleeper: Arc<dyn Sleeper>,
    config: PollConfig,
}

impl std::fmt::Debug for OperationPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationPoller")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OperationPoller {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        let sleeper = client.sleeper();
        Self {
            client,
            sleeper,
            config: PollConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PollConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll `operation_id`, sleeping `interval` (or the default) after each
    /// non-terminal status. No sleep follows the final attempt.
    ///
    /// Transport errors that survive the client's own retries propagate.
    pub fn poll(
        &self,
        operation_id: &str,
        interval: Option<Duration>,
    ) -> Result<PollOutcome, ClientError> {
        let interval = interval.unwrap_or(self.config.default_interval);
        let mut last_status = OperationStatus::Unknown;

        for poll in 1..=self.config.max_attempts {
            let mut operation = self.fetch(operation_id)?;
            operation.retry_after = Some(interval);
            debug!(
                operation_id,
                poll,
                max_attempts = self.config.max_attempts,
                status = %operation.status,
                "Polled operation"
            );

            match operation.status {
                OperationStatus::Succeeded => {
                    info!(operation_id, polls = poll, "Operation succeeded");
                    return Ok(PollOutcome::Completed {
                        operation,
                        polls: poll,
                    });
                }
                OperationStatus::Failed | OperationStatus::Cancelled => {
                    warn!(
                        operation_id,
                        polls = poll,
                        status = %operation.status,
                        error = %operation.error_message().unwrap_or_default(),
                        "Operation finished unsuccessfully"
                    );
                    return Ok(PollOutcome::Completed {
                        operation,
                        polls: poll,
                    });
                }
                OperationStatus::Running | OperationStatus::Unknown => {
                    last_status = operation.status;
                }
            }
            if poll < self.config.max_attempts {
                self.sleeper.sleep(interval);
            }
        }

        warn!(
            operation_id,
            polls = self.config.max_attempts,
            last_status = %last_status,
            "Operation did not finish within the poll budget"
        );
        Ok(PollOutcome::TimedOut {
            operation_id: operation_id.to_string(),
            polls: self.config.max_attempts,
            last_status,
        })
    }

    /// Fetch the current status once.
    pub fn fetch(&self, operation_id: &str) -> Result<Operation, ClientError> {
        let response = self.client.get(&format!("operations/{operation_id}"))?;
        let status = match &response.body {
            Some(body) => serde_json::from_value::<OperationBody>(body.clone())
                .map_err(|e| ClientError::Decode(e.to_string()))?
                .status
                .as_deref()
                .map(OperationStatus::from_api)
                .unwrap_or(OperationStatus::Unknown),
            None => OperationStatus::Unknown,
        };
        Ok(Operation {
            id: operation_id.to_string(),
            status,
            result: response.body,
            retry_after: None,
        })
    }
}
