//! Deployment pipeline types as returned by the REST service.

use serde::{Deserialize, Serialize};

use crate::types::Stage;

/// `{ "value": [...] }` list envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub order: usize,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub workspace_name: Option<String>,
}

impl PipelineStage {
    /// Canonical stage this display name refers to, if any.
    pub fn stage(&self) -> Option<Stage> {
        Stage::from_display_name(&self.display_name)
    }

    /// Whether `name` refers to this stage (exact match, case-insensitive,
    /// or the same canonical stage).
    pub fn matches(&self, name: &str) -> bool {
        if self.display_name.eq_ignore_ascii_case(name.trim()) {
            return true;
        }
        match (self.stage(), Stage::from_display_name(name)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// A pipeline with its three stages in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    pub display_name: String,
    pub stages: Vec<PipelineStage>,
}

impl Pipeline {
    /// Build a pipeline, requiring exactly Development, Test, Production.
    pub fn from_stages(
        summary: PipelineSummary,
        mut stages: Vec<PipelineStage>,
    ) -> anyhow::Result<Self> {
        stages.sort_by_key(|s| s.order);
        let found: Vec<Option<Stage>> = stages.iter().map(PipelineStage::stage).collect();
        let expected: Vec<Option<Stage>> = Stage::ORDERED.iter().copied().map(Some).collect();
        if found != expected {
            let names: Vec<&str> = stages.iter().map(|s| s.display_name.as_str()).collect();
            anyhow::bail!(
                "Pipeline '{}' must have stages Development, Test, Production in order; found [{}]",
                summary.display_name,
                names.join(", ")
            );
        }
        Ok(Self {
            id: summary.id,
            display_name: summary.display_name,
            stages,
        })
    }

    pub fn stage(&self, stage: Stage) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.stage() == Some(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(id: &str, name: &str, order: usize) -> PipelineStage {
        PipelineStage {
            id: id.into(),
            display_name: name.into(),
            order,
            workspace_id: None,
            workspace_name: None,
        }
    }

    fn summary() -> PipelineSummary {
        PipelineSummary {
            id: "p1".into(),
            display_name: "Sales".into(),
            description: None,
        }
    }

    #[test]
    fn stages_are_sorted_into_canonical_order() {
        let pipeline = Pipeline::from_stages(
            summary(),
            vec![
                stage("s3", "Production", 2),
                stage("s1", "Development", 0),
                stage("s2", "Test", 1),
            ],
        )
        .unwrap();
        assert_eq!(pipeline.stages[0].id, "s1");
        assert_eq!(pipeline.stage(Stage::Production).unwrap().id, "s3");
    }

    #[test]
    fn wrong_stage_set_is_rejected() {
        let err = Pipeline::from_stages(
            summary(),
            vec![stage("s1", "Development", 0), stage("s2", "Production", 1)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("Development, Test, Production"));
    }

    #[test]
    fn stage_matches_aliases() {
        let dev = stage("s1", "Development", 0);
        assert!(dev.matches("development"));
        assert!(dev.matches("dev"));
        assert!(!dev.matches("Test"));
    }
}
