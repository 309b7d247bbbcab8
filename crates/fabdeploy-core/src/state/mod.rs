//! Deployment ledger and its checkpoint file.

pub mod checkpoint;
pub mod ledger;

pub use checkpoint::Checkpoint;
pub use ledger::{CreatedItem, DeploymentState, RecordRequest, RollbackReport};
