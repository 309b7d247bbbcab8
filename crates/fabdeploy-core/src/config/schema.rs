//! Configuration schema for fabdeploy.toml
//!
//! The `[workspace]`, `[[folders]]`, `[[items]]`, `[[principals]]`, `[git]` and
//! `[pipeline]` sections describe what to provision. The remaining sections
//! tune the service client and are shared by every command.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::{CommandCredential, CredentialSource, EnvCredential};
use crate::git::GitRepository;
use crate::operation::PollConfig;
use crate::retry::BackoffPolicy;
use crate::types::{ItemKind, PrincipalRole, Stage};

pub const DEFAULT_BASE_URL: &str = "https://api.fabric.microsoft.com/v1/";
pub const DEFAULT_TOKEN_ENV: &str = "FABRIC_TOKEN";

/// Root configuration structure for fabdeploy.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    pub workspace: WorkspaceSection,

    #[serde(default)]
    pub folders: Vec<FolderEntry>,

    #[serde(default)]
    pub items: Vec<ItemEntry>,

    #[serde(default)]
    pub principals: Vec<PrincipalEntry>,

    /// Optional Git connection for the workspace
    #[serde(default)]
    pub git: Option<GitRepository>,

    /// Optional deployment pipeline to attach the workspace to
    #[serde(default)]
    pub pipeline: Option<PipelineSection>,

    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub polling: PollingSection,

    #[serde(default)]
    pub auth: AuthSection,

    #[serde(default)]
    pub checkpoint: CheckpointSection,
}

impl DeployConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workspace.name.trim().is_empty() {
            anyhow::bail!("workspace.name must not be empty");
        }

        let mut folders = HashSet::new();
        for folder in &self.folders {
            if folder.name.trim().is_empty() {
                anyhow::bail!("Folder names must not be empty");
            }
            if !folders.insert(folder.name.as_str()) {
                anyhow::bail!("Duplicate folder '{}'", folder.name);
            }
        }

        let mut items = HashSet::new();
        for item in &self.items {
            if !item.kind.is_item() {
                anyhow::bail!(
                    "Item '{}' has kind '{}'; declare workspaces and folders in their own sections",
                    item.name,
                    item.kind
                );
            }
            if item.name.trim().is_empty() {
                anyhow::bail!("Item names must not be empty");
            }
            if let Some(folder) = &item.folder
                && !folders.contains(folder.as_str())
            {
                anyhow::bail!(
                    "Item '{}' references undeclared folder '{}'",
                    item.name,
                    folder
                );
            }
            if !items.insert((item.kind, item.name.as_str())) {
                anyhow::bail!("Duplicate {} '{}'", item.kind, item.name);
            }
        }

        for principal in &self.principals {
            if principal.id.trim().is_empty() {
                anyhow::bail!("Principal ids must not be empty");
            }
        }

        if let Some(git) = &self.git {
            git.validate()?;
        }
        if let Some(pipeline) = &self.pipeline
            && pipeline.name.trim().is_empty()
        {
            anyhow::bail!("pipeline.name must not be empty");
        }

        self.settings().validate()
    }

    /// Service client settings carried by this config.
    pub fn settings(&self) -> ServiceSettings {
        ServiceSettings {
            api: self.api.clone(),
            retry: self.retry.clone(),
            polling: self.polling.clone(),
            auth: self.auth.clone(),
            checkpoint: self.checkpoint.clone(),
        }
    }
}

/// The client-tuning subset of fabdeploy.toml.
///
/// Commands that do not provision anything (`promote`, `stages`) read only
/// these sections, so a config without `[workspace]` is still usable there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub polling: PollingSection,

    #[serde(default)]
    pub auth: AuthSection,

    #[serde(default)]
    pub checkpoint: CheckpointSection,
}

impl ServiceSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        url::Url::parse(&self.api.base_url)
            .map_err(|e| anyhow::anyhow!("api.base_url '{}' is invalid: {}", self.api.base_url, e))?;
        if self.api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be greater than zero");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            anyhow::bail!("retry.base_delay_ms must not exceed retry.max_delay_ms");
        }
        if self.retry.jitter_percent > 100 {
            anyhow::bail!("retry.jitter_percent must be between 0 and 100");
        }
        if self.polling.max_attempts == 0 {
            anyhow::bail!("polling.max_attempts must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSection {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Capacity to attach; creation falls back to no capacity if refused
    #[serde(default)]
    pub capacity: Option<String>,

    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEntry {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEntry {
    pub kind: ItemKind,
    pub name: String,
    #[serde(default)]
    pub folder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalEntry {
    pub id: String,
    pub role: PrincipalRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSection {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Stage the new workspace is assigned to
    #[serde(default = "default_stage")]
    pub stage: Stage,
}

fn default_stage() -> Stage {
    Stage::Development
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Symmetric jitter applied to each delay, in percent
    #[serde(default = "default_jitter_percent")]
    pub jitter_percent: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_percent: default_jitter_percent(),
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.max_retries,
        )
        .with_jitter(f64::from(self.jitter_percent) / 100.0)
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_percent() -> u32 {
    25
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_interval_secs")]
    pub default_interval_secs: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            default_interval_secs: default_interval_secs(),
        }
    }
}

impl PollingSection {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            max_attempts: self.max_attempts,
            default_interval: Duration::from_secs(self.default_interval_secs),
        }
    }
}

fn default_max_attempts() -> u32 {
    60
}

fn default_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSection {
    /// Environment variable holding a bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Command printing `{"accessToken", "expiresOn"}` JSON; takes precedence
    /// over `token_env` when set
    #[serde(default)]
    pub token_command: Vec<String>,

    /// Assumed lifetime of a token read from `token_env`
    #[serde(default = "default_token_lifetime_secs")]
    pub token_lifetime_secs: u64,

    #[serde(default = "default_refresh_buffer_secs")]
    pub refresh_buffer_secs: u64,

    /// Re-authenticate the executor's own session after this long
    #[serde(default = "default_secondary_max_age_secs")]
    pub secondary_max_age_secs: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            token_command: Vec::new(),
            token_lifetime_secs: default_token_lifetime_secs(),
            refresh_buffer_secs: default_refresh_buffer_secs(),
            secondary_max_age_secs: default_secondary_max_age_secs(),
        }
    }
}

impl AuthSection {
    pub fn credential(&self) -> anyhow::Result<Arc<dyn CredentialSource>> {
        if self.token_command.is_empty() {
            Ok(Arc::new(EnvCredential::new(
                self.token_env.clone(),
                Duration::from_secs(self.token_lifetime_secs),
            )))
        } else {
            Ok(Arc::new(CommandCredential::from_command_line(
                &self.token_command,
            )?))
        }
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }

    pub fn secondary_max_age(&self) -> Duration {
        Duration::from_secs(self.secondary_max_age_secs)
    }
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_token_lifetime_secs() -> u64 {
    3_600
}

fn default_refresh_buffer_secs() -> u64 {
    60
}

fn default_secondary_max_age_secs() -> u64 {
    1_800
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSection {
    /// Overrides the state-directory default
    #[serde(default)]
    pub dir: Option<PathBuf>,
}
