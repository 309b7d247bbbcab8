//! Deployment pipelines: model, REST boundary, and stage promotion.

pub mod api;
pub mod model;
pub mod promoter;

pub use api::{DEFAULT_RETRY_AFTER, DeployOptions, DeployRequest, DeployStarted, PipelineApi};
pub use model::{ListResponse, Pipeline, PipelineStage, PipelineSummary};
pub use promoter::{PromoteError, PromotionResult, StagePromoter, infer_target};
