//! Workspace Git connection over the REST boundary.
//!
//! A 409 from the connect call means the workspace is already attached to a
//! repository. Both providers recover the same way: look up the existing
//! connection and report it as already connected.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::http::{ClientError, ResilientClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GitProvider {
    #[serde(alias = "GitHub")]
    Github,
    #[serde(alias = "AzureDevOps", alias = "azure_devops", alias = "ado")]
    AzureDevops,
}

impl GitProvider {
    /// Provider type string the service expects.
    pub fn api_name(self) -> &'static str {
        match self {
            GitProvider::Github => "GitHub",
            GitProvider::AzureDevops => "AzureDevOps",
        }
    }
}

impl fmt::Display for GitProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

/// Repository coordinates for a workspace connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRepository {
    pub provider: GitProvider,
    /// GitHub owner, or Azure DevOps organization.
    pub owner: String,
    /// Azure DevOps project; ignored for GitHub.
    #[serde(default)]
    pub project: Option<String>,
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_directory")]
    pub directory: String,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_directory() -> String {
    "/".to_string()
}

impl GitRepository {
    /// `gitProviderDetails` payload for the connect call.
    pub fn provider_details(&self) -> Value {
        match self.provider {
            GitProvider::Github => json!({
                "gitProviderType": self.provider.api_name(),
                "ownerName": self.owner,
                "repositoryName": self.repository,
                "branchName": self.branch,
                "directoryName": self.directory,
            }),
            GitProvider::AzureDevops => json!({
                "gitProviderType": self.provider.api_name(),
                "organizationName": self.owner,
                "projectName": self.project.as_deref().unwrap_or_default(),
                "repositoryName": self.repository,
                "branchName": self.branch,
                "directoryName": self.directory,
            }),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.owner.trim().is_empty() {
            anyhow::bail!("git.owner must not be empty");
        }
        if self.repository.trim().is_empty() {
            anyhow::bail!("git.repository must not be empty");
        }
        if self.provider == GitProvider::AzureDevops
            && self.project.as_deref().is_none_or(|p| p.trim().is_empty())
        {
            anyhow::bail!("git.project is required for azure-devops");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitConnection {
    #[serde(default)]
    pub git_connection_state: Option<String>,
    #[serde(default)]
    pub git_provider_details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// The workspace already had a connection; carries what the service reports.
    AlreadyConnected(GitConnection),
}

impl ConnectOutcome {
    pub fn reused(&self) -> bool {
        matches!(self, ConnectOutcome::AlreadyConnected(_))
    }
}

#[derive(Debug, Clone)]
pub struct GitConnector {
    client: Arc<ResilientClient>,
}

impl GitConnector {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        Self { client }
    }

    /// Connect `workspace_id` to `repo` and initialize the connection.
    pub fn connect(
        &self,
        workspace_id: &str,
        repo: &GitRepository,
    ) -> Result<ConnectOutcome, ClientError> {
        let body = json!({ "gitProviderDetails": repo.provider_details() });
        match self
            .client
            .post(&format!("workspaces/{workspace_id}/git/connect"), &body)
        {
            Ok(_) => {}
            Err(err) if err.is_status(409) => {
                warn!(
                    workspace_id,
                    provider = %repo.provider,
                    "Workspace already connected to Git; looking up existing connection"
                );
                let existing = self.connection(workspace_id)?;
                return Ok(ConnectOutcome::AlreadyConnected(existing));
            }
            Err(err) => return Err(err),
        }

        self.client.post(
            &format!("workspaces/{workspace_id}/git/initializeConnection"),
            &json!({}),
        )?;
        info!(
            workspace_id,
            provider = %repo.provider,
            repository = %repo.repository,
            branch = %repo.branch,
            "Connected workspace to Git"
        );
        Ok(ConnectOutcome::Connected)
    }

    pub fn connection(&self, workspace_id: &str) -> Result<GitConnection, ClientError> {
        self.client
            .get_json(&format!("workspaces/{workspace_id}/git/connection"))
    }
}
