//! Shared core types used across the ledger, executor, and pipeline layers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of a provisioned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Workspace,
    Folder,
    Lakehouse,
    Warehouse,
    Notebook,
    /// Data pipeline (not to be confused with a deployment pipeline).
    Pipeline,
    SemanticModel,
    Report,
    EventStream,
    KqlDatabase,
    SparkJobDefinition,
}

impl ItemKind {
    pub const ALL: [ItemKind; 11] = [
        ItemKind::Workspace,
        ItemKind::Folder,
        ItemKind::Lakehouse,
        ItemKind::Warehouse,
        ItemKind::Notebook,
        ItemKind::Pipeline,
        ItemKind::SemanticModel,
        ItemKind::Report,
        ItemKind::EventStream,
        ItemKind::KqlDatabase,
        ItemKind::SparkJobDefinition,
    ];

    /// Suffix used by the executor's path addressing (`{name}.{suffix}`).
    pub fn type_suffix(self) -> &'static str {
        match self {
            ItemKind::Workspace => "Workspace",
            ItemKind::Folder => "Folder",
            ItemKind::Lakehouse => "Lakehouse",
            ItemKind::Warehouse => "Warehouse",
            ItemKind::Notebook => "Notebook",
            ItemKind::Pipeline => "DataPipeline",
            ItemKind::SemanticModel => "SemanticModel",
            ItemKind::Report => "Report",
            ItemKind::EventStream => "Eventstream",
            ItemKind::KqlDatabase => "KQLDatabase",
            ItemKind::SparkJobDefinition => "SparkJobDefinition",
        }
    }

    /// Stable snake_case identifier, as written to checkpoints and config.
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Workspace => "workspace",
            ItemKind::Folder => "folder",
            ItemKind::Lakehouse => "lakehouse",
            ItemKind::Warehouse => "warehouse",
            ItemKind::Notebook => "notebook",
            ItemKind::Pipeline => "pipeline",
            ItemKind::SemanticModel => "semantic_model",
            ItemKind::Report => "report",
            ItemKind::EventStream => "event_stream",
            ItemKind::KqlDatabase => "kql_database",
            ItemKind::SparkJobDefinition => "spark_job_definition",
        }
    }

    /// Kinds that live inside a workspace and may be created by the items phase.
    pub fn is_item(self) -> bool {
        !matches!(self, ItemKind::Workspace | ItemKind::Folder)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        let kind = match normalized.as_str() {
            "workspace" => ItemKind::Workspace,
            "folder" => ItemKind::Folder,
            "lakehouse" => ItemKind::Lakehouse,
            "warehouse" => ItemKind::Warehouse,
            "notebook" => ItemKind::Notebook,
            "pipeline" | "datapipeline" => ItemKind::Pipeline,
            "semanticmodel" => ItemKind::SemanticModel,
            "report" => ItemKind::Report,
            "eventstream" => ItemKind::EventStream,
            "kqldatabase" => ItemKind::KqlDatabase,
            "sparkjobdefinition" => ItemKind::SparkJobDefinition,
            _ => anyhow::bail!("Unknown item kind: {}", s),
        };
        Ok(kind)
    }
}

/// One of the three fixed deployment pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Development,
    Test,
    Production,
}

impl Stage {
    /// Canonical stage order.
    pub const ORDERED: [Stage; 3] = [Stage::Development, Stage::Test, Stage::Production];

    pub fn display_name(self) -> &'static str {
        match self {
            Stage::Development => "Development",
            Stage::Test => "Test",
            Stage::Production => "Production",
        }
    }

    /// The stage content is promoted into next, if any.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Development => Some(Stage::Test),
            Stage::Test => Some(Stage::Production),
            Stage::Production => None,
        }
    }

    /// Match a stage display name case-insensitively (`dev` and `prod` accepted).
    pub fn from_display_name(name: &str) -> Option<Stage> {
        match name.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Stage::Development),
            "test" => Some(Stage::Test),
            "production" | "prod" => Some(Stage::Production),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::from_display_name(s).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown stage '{}'. Use Development, Test, or Production",
                s
            )
        })
    }
}

/// Workspace access role granted to a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrincipalRole {
    #[serde(alias = "admin")]
    Admin,
    #[serde(alias = "member")]
    Member,
    #[serde(alias = "contributor")]
    Contributor,
    #[serde(alias = "viewer")]
    Viewer,
}

impl PrincipalRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PrincipalRole::Admin => "Admin",
            PrincipalRole::Member => "Member",
            PrincipalRole::Contributor => "Contributor",
            PrincipalRole::Viewer => "Viewer",
        }
    }
}

impl fmt::Display for PrincipalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a create call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateFailure {
    /// The capacity could not be assigned (missing, forbidden, or paused).
    Capacity(String),
    Other(String),
}

impl fmt::Display for CreateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateFailure::Capacity(msg) => write!(f, "capacity assignment failed: {msg}"),
            CreateFailure::Other(msg) => f.write_str(msg),
        }
    }
}

/// Result of an executor create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created { id: Option<String> },
    /// The resource already existed; treated as success.
    AlreadyExists { id: Option<String> },
    Failed(CreateFailure),
}

impl CreateOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, CreateOutcome::Failed(_))
    }

    pub fn reused(&self) -> bool {
        matches!(self, CreateOutcome::AlreadyExists { .. })
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            CreateOutcome::Created { id } | CreateOutcome::AlreadyExists { id } => id.as_deref(),
            CreateOutcome::Failed(_) => None,
        }
    }
}

/// Result of an executor delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing to delete; counts as deleted during rollback.
    NotFound,
    Failed(String),
}

impl DeleteOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, DeleteOutcome::Failed(_))
    }
}
