//! Long-running operation model and status poller.

pub mod poller;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use poller::{DEFAULT_POLL_INTERVAL, OperationPoller, PollConfig, PollOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Unknown,
}

impl OperationStatus {
    /// Map the service's status string; `NotStarted` counts as running.
    pub fn from_api(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "running" | "notstarted" | "not_started" | "inprogress" => OperationStatus::Running,
            "succeeded" | "success" | "completed" => OperationStatus::Succeeded,
            "failed" => OperationStatus::Failed,
            "cancelled" | "canceled" => OperationStatus::Cancelled,
            _ => OperationStatus::Unknown,
        }
    }

    /// Succeeded, Failed, and Cancelled are final.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Succeeded | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationStatus::Running => "Running",
            OperationStatus::Succeeded => "Succeeded",
            OperationStatus::Failed => "Failed",
            OperationStatus::Cancelled => "Cancelled",
            OperationStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Server-side handle for an asynchronous action.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub id: String,
    pub status: OperationStatus,
    /// Raw status payload as last returned by the service.
    pub result: Option<Value>,
    /// Poll interval hint from the call that started the operation.
    pub retry_after: Option<Duration>,
}

impl Operation {
    pub fn new(id: impl Into<String>, status: OperationStatus) -> Self {
        Self {
            id: id.into(),
            status,
            result: None,
            retry_after: None,
        }
    }

    /// Error message reported by the service, if the payload carries one.
    pub fn error_message(&self) -> Option<String> {
        let error = self.result.as_ref()?.get("error")?;
        error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| error.as_str().map(str::to_string))
    }
}
