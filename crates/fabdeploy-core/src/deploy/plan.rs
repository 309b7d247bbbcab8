//! What a deployment will do, in phase order.

use std::fmt;

use serde::Serialize;

use crate::config::{DeployConfig, FolderEntry, ItemEntry, PipelineSection, PrincipalEntry, WorkspaceSection};
use crate::git::GitRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeployPhase {
    CreateWorkspace,
    CreateFolders,
    CreateItems,
    AddPrincipals,
    AssignDomain,
    ConnectGit,
    SetupPipeline,
}

impl DeployPhase {
    /// Phases that call the REST service instead of the executor.
    pub fn is_remote(self) -> bool {
        matches!(self, DeployPhase::ConnectGit | DeployPhase::SetupPipeline)
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeployPhase::CreateWorkspace => "CreateWorkspace",
            DeployPhase::CreateFolders => "CreateFolders",
            DeployPhase::CreateItems => "CreateItems",
            DeployPhase::AddPrincipals => "AddPrincipals",
            DeployPhase::AssignDomain => "AssignDomain",
            DeployPhase::ConnectGit => "ConnectGit",
            DeployPhase::SetupPipeline => "SetupPipeline",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeployPlan {
    pub workspace: WorkspaceSection,
    pub folders: Vec<FolderEntry>,
    pub items: Vec<ItemEntry>,
    pub principals: Vec<PrincipalEntry>,
    pub git: Option<GitRepository>,
    pub pipeline: Option<PipelineSection>,
}

impl DeployPlan {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            workspace: config.workspace.clone(),
            folders: config.folders.clone(),
            items: config.items.clone(),
            principals: config.principals.clone(),
            git: config.git.clone(),
            pipeline: config.pipeline.clone(),
        }
    }

    /// Phases in execution order; optional phases appear only when configured.
    pub fn phases(&self) -> Vec<DeployPhase> {
        let mut phases = vec![
            DeployPhase::CreateWorkspace,
            DeployPhase::CreateFolders,
            DeployPhase::CreateItems,
            DeployPhase::AddPrincipals,
        ];
        if self.workspace.domain.is_some() {
            phases.push(DeployPhase::AssignDomain);
        }
        if self.git.is_some() {
            phases.push(DeployPhase::ConnectGit);
        }
        if self.pipeline.is_some() {
            phases.push(DeployPhase::SetupPipeline);
        }
        phases
    }
}
