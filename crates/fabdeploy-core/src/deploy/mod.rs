//! Deployment orchestration: plan, phase sequencing, and the run report.

pub mod deployer;
pub mod plan;

pub use deployer::{DEFAULT_SECONDARY_MAX_AGE, DeployOptions, DeployReport, Deployer};
pub use plan::{DeployPhase, DeployPlan};
