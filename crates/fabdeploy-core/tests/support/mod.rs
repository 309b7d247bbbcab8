//! Scripted fakes shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fabdeploy_core::auth::{Clock, CredentialSource, SecondaryAuth, TokenInfo, TokenSource};
use fabdeploy_core::executor::ResourceExecutor;
use fabdeploy_core::http::{ApiRequest, ApiResponse, ClientError, HttpTransport, ResilientClient};
use fabdeploy_core::retry::{BackoffPolicy, Sleeper};
use fabdeploy_core::types::{CreateFailure, CreateOutcome, DeleteOutcome, ItemKind, PrincipalRole};
use serde_json::Value;

// =========================================================================
// HTTP
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub method: String,
    pub path: String,
    pub body: Option<Value>,
    pub token: String,
}

/// Replays queued responses in order and remembers every request.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<ApiResponse, ClientError>>>,
    requests: Mutex<Vec<SentRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, response: Result<ApiResponse, ClientError>) -> &Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn ok(&self, body: Value) -> &Self {
        self.push(Ok(ApiResponse::new(200).with_body(body)))
    }

    pub fn status(&self, status: u16) -> &Self {
        self.push(Err(ClientError::Status {
            status,
            body: String::new(),
        }))
    }

    pub fn requests(&self) -> Vec<SentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(&self, request: &ApiRequest, token: &str) -> Result<ApiResponse, ClientError> {
        self.requests.lock().unwrap().push(SentRequest {
            method: request.method.to_string(),
            path: request.path.clone(),
            body: request.body.clone(),
            token: token.to_string(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ClientError::Other(format!(
                    "no scripted response for {} {}",
                    request.method, request.path
                )))
            })
    }
}

/// Records requested sleeps without sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

// =========================================================================
// Auth
// =========================================================================

pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Issues `token-1`, `token-2`, ... each valid for `lifetime`.
pub struct CountingCredential {
    calls: AtomicUsize,
    lifetime: Duration,
}

impl CountingCredential {
    pub fn new(lifetime: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            lifetime,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CredentialSource for CountingCredential {
    fn acquire(&self, now: DateTime<Utc>) -> anyhow::Result<TokenInfo> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenInfo::new(
            format!("token-{n}"),
            now,
            now + chrono::Duration::from_std(self.lifetime).unwrap(),
        ))
    }
}

/// Client over `transport` with a long-lived counting credential and
/// zero-delay retries.
pub fn client(transport: Arc<ScriptedTransport>, sleeper: Arc<RecordingSleeper>) -> Arc<ResilientClient> {
    let credential = CountingCredential::new(Duration::from_secs(3600));
    let tokens = Arc::new(TokenSource::new(credential));
    Arc::new(
        ResilientClient::new(transport, tokens)
            .with_policy(BackoffPolicy::immediate(3))
            .with_sleeper(sleeper),
    )
}

// =========================================================================
// Executor
// =========================================================================

/// In-memory executor with per-call failure injection.
#[derive(Default)]
pub struct FakeExecutor {
    calls: Mutex<Vec<String>>,
    pub refuse_capacity: bool,
    pub existing: HashSet<String>,
    pub fail_create: HashSet<String>,
    pub fail_delete: HashSet<String>,
    pub missing_on_delete: HashSet<String>,
    pub fail_principals: bool,
    pub workspace_ids: HashMap<String, String>,
    pub secondary: Option<Arc<RecordingSecondary>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Delete calls only, in the order they were made.
    pub fn deletions(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("delete ").map(str::to_string))
            .collect()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn create(&self, key: String) -> CreateOutcome {
        self.log(format!("create {key}"));
        if self.fail_create.contains(&key) {
            CreateOutcome::Failed(CreateFailure::Other(format!("{key} rejected")))
        } else if self.existing.contains(&key) {
            CreateOutcome::AlreadyExists {
                id: Some(format!("existing-{key}")),
            }
        } else {
            CreateOutcome::Created {
                id: Some(format!("id-{key}")),
            }
        }
    }

    fn delete(&self, key: String) -> DeleteOutcome {
        self.log(format!("delete {key}"));
        if self.fail_delete.contains(&key) {
            DeleteOutcome::Failed(format!("{key} is locked"))
        } else if self.missing_on_delete.contains(&key) {
            DeleteOutcome::NotFound
        } else {
            DeleteOutcome::Deleted
        }
    }
}

impl ResourceExecutor for FakeExecutor {
    fn create_workspace(
        &self,
        name: &str,
        capacity: Option<&str>,
        _description: &str,
    ) -> CreateOutcome {
        if let Some(capacity) = capacity
            && self.refuse_capacity
        {
            self.log(format!("create {name}.Workspace capacity={capacity}"));
            return CreateOutcome::Failed(CreateFailure::Capacity(format!(
                "capacity {capacity} is not assignable"
            )));
        }
        self.create(format!("{name}.Workspace"))
    }

    fn delete_workspace(&self, name: &str) -> DeleteOutcome {
        self.delete(format!("{name}.Workspace"))
    }

    fn remove_by_path(&self, path: &str) -> DeleteOutcome {
        self.delete(path.to_string())
    }

    fn create_folder(&self, workspace: &str, name: &str) -> CreateOutcome {
        self.create(format!("{workspace}.Workspace/{name}.Folder"))
    }

    fn create_item(
        &self,
        workspace: &str,
        folder: Option<&str>,
        kind: ItemKind,
        name: &str,
    ) -> CreateOutcome {
        self.create(fabdeploy_core::executor::item_path(
            workspace, folder, kind, name,
        ))
    }

    fn add_principal(
        &self,
        workspace: &str,
        principal: &str,
        role: PrincipalRole,
    ) -> CreateOutcome {
        self.log(format!("grant {workspace} {principal} {role}"));
        if self.fail_principals {
            CreateOutcome::Failed(CreateFailure::Other(format!(
                "principal {principal} not found in directory"
            )))
        } else {
            CreateOutcome::Created { id: None }
        }
    }

    fn assign_domain(&self, workspace: &str, domain: &str) -> CreateOutcome {
        self.log(format!("domain {workspace} {domain}"));
        CreateOutcome::Created { id: None }
    }

    fn workspace_id(&self, name: &str) -> anyhow::Result<Option<String>> {
        Ok(self.workspace_ids.get(name).cloned())
    }

    fn secondary_auth(&self) -> Option<&dyn SecondaryAuth> {
        self.secondary
            .as_deref()
            .map(|s| s as &dyn SecondaryAuth)
    }
}

/// Remembers every token handed to it.
#[derive(Default)]
pub struct RecordingSecondary {
    tokens: Mutex<Vec<String>>,
}

impl RecordingSecondary {
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

impl SecondaryAuth for RecordingSecondary {
    fn reauthenticate(&self, token: &str) -> anyhow::Result<()> {
        self.tokens.lock().unwrap().push(token.to_string());
        Ok(())
    }
}
