//! Application context for unified dependency injection.

use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::{CredentialSource, TokenSource};
use crate::config::{ServiceSettings, checkpoint_dir};
use crate::deploy::{DeployOptions, Deployer};
use crate::executor::ResourceExecutor;
use crate::http::{HttpTransport, ReqwestTransport, ResilientClient};
use crate::pipeline::StagePromoter;
use crate::retry::Sleeper;
use crate::state::Checkpoint;

/// Shared services built once from [`ServiceSettings`].
///
/// Frontends create this once and pass it to commands. Each context owns
/// its own [`TokenSource`], so independent runs never share a token cache.
#[derive(Debug, Clone)]
pub struct AppContext {
    settings: ServiceSettings,
    client: Arc<ResilientClient>,
}

impl AppContext {
    /// Wire the real HTTP transport and the configured credential source.
    pub fn from_settings(settings: ServiceSettings) -> anyhow::Result<Self> {
        settings.validate()?;
        let transport = ReqwestTransport::new(&settings.api.base_url, settings.api.timeout())?;
        let credential = settings.auth.credential()?;
        Ok(Self::with_transport(
            settings,
            Arc::new(transport),
            credential,
        ))
    }

    /// Create context with an explicit transport and credential (for testing).
    pub fn with_transport(
        settings: ServiceSettings,
        transport: Arc<dyn HttpTransport>,
        credential: Arc<dyn CredentialSource>,
    ) -> Self {
        let tokens = Arc::new(
            TokenSource::new(credential).with_refresh_buffer(settings.auth.refresh_buffer()),
        );
        let client = Arc::new(
            ResilientClient::new(transport, tokens).with_policy(settings.retry.policy()),
        );
        Self { settings, client }
    }

    /// Replace the sleeper used by retries and polling.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        let client = ResilientClient::new(self.client.transport(), self.client.tokens().clone())
            .with_policy(self.client.policy().clone())
            .with_sleeper(sleeper);
        self.client = Arc::new(client);
        self
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn client(&self) -> Arc<ResilientClient> {
        self.client.clone()
    }

    pub fn tokens(&self) -> &Arc<TokenSource> {
        self.client.tokens()
    }

    pub fn promoter(&self) -> StagePromoter {
        StagePromoter::new(self.client()).with_poll_config(self.settings.polling.poll_config())
    }

    pub fn deployer<'a>(&self, executor: &'a dyn ResourceExecutor) -> Deployer<'a> {
        Deployer::new(executor).with_client(self.client())
    }

    pub fn checkpoint_dir(&self) -> anyhow::Result<PathBuf> {
        checkpoint_dir(&self.settings.checkpoint)
    }

    /// Options for a new run. With `checkpoint` set, the deployment id is
    /// fixed up front so the checkpoint file is named after it.
    pub fn deploy_options(
        &self,
        rollback_on_failure: bool,
        checkpoint: bool,
    ) -> anyhow::Result<DeployOptions> {
        let mut options = DeployOptions {
            rollback_on_failure,
            secondary_max_age: self.settings.auth.secondary_max_age(),
            ..DeployOptions::default()
        };
        if checkpoint {
            let id = uuid::Uuid::new_v4().to_string();
            options.checkpoint_path = Some(Checkpoint::path_for(&self.checkpoint_dir()?, &id));
            options.deployment_id = Some(id);
        }
        Ok(options)
    }
}
