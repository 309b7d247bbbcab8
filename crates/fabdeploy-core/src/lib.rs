//! fabdeploy Core Library
//!
//! Provisions workspaces, folders, items and access grants through a
//! resource executor, and promotes content across the Development, Test and
//! Production stages of a deployment pipeline. Every REST call goes through a
//! retrying client that refreshes its bearer token before each attempt.

pub mod auth;
pub mod config;
pub mod context;
pub mod deploy;
pub mod executor;
pub mod git;
pub mod http;
pub mod operation;
pub mod pipeline;
pub mod retry;
pub mod state;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{DeployConfig, ServiceSettings, parse_config, parse_settings};
    pub use crate::context::AppContext;

    // Auth and transport
    pub use crate::auth::{CredentialSource, SecondaryAuth, TokenSource};
    pub use crate::http::{ClientError, HttpTransport, ResilientClient};
    pub use crate::retry::BackoffPolicy;

    // Operations and pipelines
    pub use crate::operation::{OperationPoller, OperationStatus, PollOutcome};
    pub use crate::pipeline::{PromoteError, PromotionResult, StagePromoter};

    // Deployment
    pub use crate::deploy::{DeployOptions, DeployPhase, DeployPlan, DeployReport, Deployer};
    pub use crate::executor::{RecordingExecutor, ResourceExecutor};
    pub use crate::state::{CreatedItem, DeploymentState, RollbackReport};

    // Types
    pub use crate::types::{CreateOutcome, DeleteOutcome, ItemKind, PrincipalRole, Stage};
}
