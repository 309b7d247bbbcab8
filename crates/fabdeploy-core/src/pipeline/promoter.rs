//! Stage promotion: resolve stage names, start the deploy, poll to completion.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use super::api::{DeployOptions, DeployRequest, PipelineApi};
use super::model::{Pipeline, PipelineStage, PipelineSummary};
use crate::http::{ClientError, ResilientClient};
use crate::operation::{OperationPoller, PollConfig, PollOutcome};
use crate::types::Stage;

#[derive(Debug, Error)]
pub enum PromoteError {
    #[error("Stage '{0}' has no next stage")]
    NoNextStage(Stage),

    #[error("Unknown stage '{0}'. Use Development, Test, or Production")]
    UnknownStage(String),

    #[error("Stage '{stage}' not found in pipeline {pipeline_id}")]
    StageNotFound { pipeline_id: String, stage: String },

    #[error("Source and target stage are the same: {0}")]
    SameStage(String),

    #[error("Pipeline '{0}' not found")]
    PipelineNotFound(String),

    #[error("Deploy response did not include an operation id")]
    MissingOperationId,

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Terminal result of one promotion.
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionResult {
    pub pipeline_id: String,
    pub source_stage: String,
    pub target_stage: String,
    pub operation_id: String,
    pub outcome: PollOutcome,
}

impl PromotionResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

#[derive(Debug)]
pub struct StagePromoter {
    api: PipelineApi,
    poller: OperationPoller,
}

impl StagePromoter {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        Self {
            api: PipelineApi::new(client.clone()),
            poller: OperationPoller::new(client),
        }
    }

    pub fn with_poll_config(mut self, config: PollConfig) -> Self {
        self.poller = self.poller.with_config(config);
        self
    }

    pub fn api(&self) -> &PipelineApi {
        &self.api
    }

    pub fn list_pipelines(&self) -> Result<Vec<PipelineSummary>, PromoteError> {
        Ok(self.api.list_pipelines()?)
    }

    /// Stages of a pipeline sorted by their order.
    pub fn pipeline_stages(&self, pipeline_id: &str) -> Result<Vec<PipelineStage>, PromoteError> {
        let mut stages = self.api.list_stages(pipeline_id)?;
        stages.sort_by_key(|s| s.order);
        Ok(stages)
    }

    /// Promote content from `source_stage` to `target_stage`.
    ///
    /// Without a target the next stage in canonical order is used; promoting
    /// out of Production without a target fails before any network call.
    pub fn promote(
        &self,
        pipeline_id: &str,
        source_stage: &str,
        target_stage: Option<&str>,
        note: &str,
    ) -> Result<PromotionResult, PromoteError> {
        let target_name = match target_stage {
            Some(target) => target.trim().to_string(),
            None => infer_target(source_stage)?.display_name().to_string(),
        };

        let stages = self.api.list_stages(pipeline_id)?;
        let source = find_stage(pipeline_id, &stages, source_stage)?;
        let target = find_stage(pipeline_id, &stages, &target_name)?;
        if source.id == target.id {
            return Err(PromoteError::SameStage(source.display_name.clone()));
        }

        let request = DeployRequest {
            source_stage_id: source.id.clone(),
            target_stage_id: target.id.clone(),
            note: note.to_string(),
            options: DeployOptions::default(),
        };
        let started = self.api.deploy(pipeline_id, &request)?;
        let operation_id = started
            .operation_id
            .ok_or(PromoteError::MissingOperationId)?;
        info!(
            pipeline_id,
            source = %source.display_name,
            target = %target.display_name,
            operation_id = %operation_id,
            retry_after_secs = started.retry_after.as_secs(),
            "Started promotion"
        );

        let outcome = self.poller.poll(&operation_id, Some(started.retry_after))?;
        Ok(PromotionResult {
            pipeline_id: pipeline_id.to_string(),
            source_stage: source.display_name.clone(),
            target_stage: target.display_name.clone(),
            operation_id,
            outcome,
        })
    }

    /// Reuse a pipeline with the same display name, or create one.
    ///
    /// Returns the pipeline and whether it already existed.
    pub fn ensure_pipeline(
        &self,
        display_name: &str,
        description: &str,
    ) -> Result<(PipelineSummary, bool), PromoteError> {
        if let Some(existing) = self
            .api
            .list_pipelines()?
            .into_iter()
            .find(|p| p.display_name == display_name)
        {
            info!(pipeline_id = %existing.id, name = display_name, "Reusing deployment pipeline");
            return Ok((existing, true));
        }
        let created = self.api.create_pipeline(display_name, description)?;
        info!(pipeline_id = %created.id, name = display_name, "Created deployment pipeline");
        Ok((created, false))
    }

    /// Find a pipeline by id or display name.
    pub fn resolve_pipeline(&self, name_or_id: &str) -> Result<PipelineSummary, PromoteError> {
        let pipelines = self.api.list_pipelines()?;
        pipelines
            .iter()
            .find(|p| p.id == name_or_id)
            .or_else(|| {
                pipelines
                    .iter()
                    .find(|p| p.display_name.eq_ignore_ascii_case(name_or_id))
            })
            .cloned()
            .ok_or_else(|| PromoteError::PipelineNotFound(name_or_id.to_string()))
    }

    /// Load a pipeline with its stages validated into canonical order.
    pub fn pipeline(&self, summary: PipelineSummary) -> anyhow::Result<Pipeline> {
        let stages = self.pipeline_stages(&summary.id)?;
        Pipeline::from_stages(summary, stages)
    }

    pub fn assign_workspace(
        &self,
        pipeline_id: &str,
        stage: &str,
        workspace_id: &str,
    ) -> Result<(), PromoteError> {
        let stages = self.api.list_stages(pipeline_id)?;
        let target = find_stage(pipeline_id, &stages, stage)?;
        self.api
            .assign_workspace(pipeline_id, &target.id, workspace_id)?;
        info!(
            pipeline_id,
            stage = %target.display_name,
            workspace_id,
            "Assigned workspace to stage"
        );
        Ok(())
    }
}

/// Next stage after `source` in canonical order.
pub fn infer_target(source: &str) -> Result<Stage, PromoteError> {
    let stage = Stage::from_display_name(source)
        .ok_or_else(|| PromoteError::UnknownStage(source.to_string()))?;
    stage.next().ok_or(PromoteError::NoNextStage(stage))
}

fn find_stage<'a>(
    pipeline_id: &str,
    stages: &'a [PipelineStage],
    name: &str,
) -> Result<&'a PipelineStage, PromoteError> {
    stages
        .iter()
        .find(|s| s.display_name == name)
        .or_else(|| stages.iter().find(|s| s.matches(name)))
        .ok_or_else(|| PromoteError::StageNotFound {
            pipeline_id: pipeline_id.to_string(),
            stage: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_target_walks_canonical_order() {
        assert_eq!(infer_target("Development").unwrap(), Stage::Test);
        assert_eq!(infer_target("test").unwrap(), Stage::Production);
    }

    #[test]
    fn infer_target_from_production_fails() {
        let err = infer_target("Production").unwrap_err();
        assert!(matches!(err, PromoteError::NoNextStage(Stage::Production)));
        assert!(err.to_string().contains("no next stage"));
    }

    #[test]
    fn infer_target_rejects_unknown_stage() {
        assert!(matches!(
            infer_target("Staging"),
            Err(PromoteError::UnknownStage(_))
        ));
    }
}
