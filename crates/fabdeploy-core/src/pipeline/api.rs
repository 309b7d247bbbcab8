//! Typed calls against the deployment pipeline endpoints.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use super::model::{ListResponse, PipelineStage, PipelineSummary};
use crate::http::{ApiResponse, ClientError, ResilientClient};

/// Poll interval used when the deploy response carries no `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(10);

pub const OPERATION_ID_HEADER: &str = "x-ms-operation-id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOptions {
    pub allow_create_artifact: bool,
    pub allow_overwrite_artifact: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            allow_create_artifact: true,
            allow_overwrite_artifact: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub source_stage_id: String,
    pub target_stage_id: String,
    pub note: String,
    pub options: DeployOptions,
}

/// Handle returned by a deploy call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployStarted {
    pub operation_id: Option<String>,
    pub retry_after: Duration,
}

#[derive(Debug, Clone)]
pub struct PipelineApi {
    client: Arc<ResilientClient>,
}

impl PipelineApi {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        Self { client }
    }

    pub fn list_pipelines(&self) -> Result<Vec<PipelineSummary>, ClientError> {
        let list: ListResponse<PipelineSummary> = self.client.get_json("deploymentPipelines")?;
        Ok(list.value)
    }

    pub fn create_pipeline(
        &self,
        display_name: &str,
        description: &str,
    ) -> Result<PipelineSummary, ClientError> {
        let body = json!({
            "displayName": display_name,
            "description": description,
        });
        self.client.post_json("deploymentPipelines", &body)
    }

    pub fn list_stages(&self, pipeline_id: &str) -> Result<Vec<PipelineStage>, ClientError> {
        let list: ListResponse<PipelineStage> = self
            .client
            .get_json(&format!("deploymentPipelines/{pipeline_id}/stages"))?;
        Ok(list.value)
    }

    pub fn assign_workspace(
        &self,
        pipeline_id: &str,
        stage_id: &str,
        workspace_id: &str,
    ) -> Result<(), ClientError> {
        let body = json!({ "workspaceId": workspace_id });
        self.client.post(
            &format!("deploymentPipelines/{pipeline_id}/stages/{stage_id}/assignWorkspace"),
            &body,
        )?;
        Ok(())
    }

    pub fn deploy(
        &self,
        pipeline_id: &str,
        request: &DeployRequest,
    ) -> Result<DeployStarted, ClientError> {
        let body =
            serde_json::to_value(request).map_err(|e| ClientError::Decode(e.to_string()))?;
        let response = self
            .client
            .post(&format!("deploymentPipelines/{pipeline_id}/deploy"), &body)?;
        Ok(deploy_started(&response))
    }
}

fn deploy_started(response: &ApiResponse) -> DeployStarted {
    let operation_id = response
        .header(OPERATION_ID_HEADER)
        .map(str::to_string)
        .or_else(|| {
            response
                .header("location")
                .and_then(|loc| loc.trim_end_matches('/').rsplit('/').next())
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        });
    let retry_after = response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER);
    DeployStarted {
        operation_id,
        retry_after,
    }
}
