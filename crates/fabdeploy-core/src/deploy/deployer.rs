//! Phase sequencing for one deployment run.
//!
//! Every resource this run creates is recorded before the next call. When a
//! phase fails the run stops there and, if asked, unwinds the ledger.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tracing::{error, info, warn};

use super::plan::{DeployPhase, DeployPlan};
use crate::executor::ResourceExecutor;
use crate::git::GitConnector;
use crate::http::ResilientClient;
use crate::pipeline::StagePromoter;
use crate::state::{CreatedItem, DeploymentState, RecordRequest, RollbackReport};
use crate::types::{CreateFailure, CreateOutcome, ItemKind};

/// Default interval after which the executor's own session is refreshed.
pub const DEFAULT_SECONDARY_MAX_AGE: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub rollback_on_failure: bool,
    pub checkpoint_path: Option<PathBuf>,
    pub deployment_id: Option<String>,
    pub secondary_max_age: Duration,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            rollback_on_failure: false,
            checkpoint_path: None,
            deployment_id: None,
            secondary_max_age: DEFAULT_SECONDARY_MAX_AGE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeployReport {
    pub deployment_id: String,
    pub workspace: String,
    pub workspace_id: Option<String>,
    /// Resources created by this run, in creation order.
    pub created: Vec<CreatedItem>,
    /// Resources that already existed and were left alone.
    pub reused: Vec<String>,
    /// Remote phases skipped because no service client was available.
    pub skipped: Vec<DeployPhase>,
    pub capacity_fallback: bool,
    pub pipeline_id: Option<String>,
    pub stopped_at: Option<DeployPhase>,
    /// The failing phase's error, unaltered.
    pub error: Option<String>,
    pub rolled_back: bool,
    pub rollback: Option<RollbackReport>,
    pub checkpoint_path: Option<PathBuf>,
}

impl DeployReport {
    pub fn success(&self) -> bool {
        self.stopped_at.is_none()
    }
}

pub struct Deployer<'a> {
    executor: &'a dyn ResourceExecutor,
    client: Option<Arc<ResilientClient>>,
}

impl std::fmt::Debug for Deployer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployer")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl<'a> Deployer<'a> {
    pub fn new(executor: &'a dyn ResourceExecutor) -> Self {
        Self {
            executor,
            client: None,
        }
    }

    /// Service client used for Git and pipeline phases and token refresh.
    pub fn with_client(mut self, client: Arc<ResilientClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Run every phase of `plan`.
    ///
    /// Never returns early with an error: a failure is reported in
    /// [`DeployReport::stopped_at`] and [`DeployReport::error`].
    pub fn deploy(&self, plan: &DeployPlan, options: &DeployOptions) -> DeployReport {
        let mut state = DeploymentState::new(options.checkpoint_path.clone());
        let deployment_id = state.start(options.deployment_id.clone()).to_string();
        let mut report = DeployReport {
            deployment_id,
            workspace: plan.workspace.name.clone(),
            checkpoint_path: options.checkpoint_path.clone(),
            ..DeployReport::default()
        };
        info!(
            deployment_id = %report.deployment_id,
            workspace = %plan.workspace.name,
            "Starting deployment"
        );

        for phase in plan.phases() {
            if let Err(err) = self.run_phase(phase, plan, options, &mut state, &mut report) {
                let message = format!("{err:#}");
                error!(phase = %phase, error = %message, "Deployment failed");
                report.created = state.items().to_vec();
                report.stopped_at = Some(phase);
                report.error = Some(message);

                if options.rollback_on_failure && !state.is_empty() {
                    report.rollback = Some(state.rollback(self.executor, false));
                    report.rolled_back = true;
                }
                return report;
            }
        }

        report.created = state.items().to_vec();
        info!(
            deployment_id = %report.deployment_id,
            created = report.created.len(),
            reused = report.reused.len(),
            "Deployment complete"
        );
        report
    }

    fn run_phase(
        &self,
        phase: DeployPhase,
        plan: &DeployPlan,
        options: &DeployOptions,
        state: &mut DeploymentState,
        report: &mut DeployReport,
    ) -> anyhow::Result<()> {
        info!(phase = %phase, "Running phase");
        if !phase.is_remote() {
            self.refresh_secondary_auth(options)?;
        }

        let workspace = plan.workspace.name.as_str();
        match phase {
            DeployPhase::CreateWorkspace => self.create_workspace(plan, state, report),
            DeployPhase::CreateFolders => {
                for folder in &plan.folders {
                    let outcome = self.executor.create_folder(workspace, &folder.name);
                    record(
                        outcome,
                        RecordRequest::new(ItemKind::Folder, &folder.name, workspace),
                        state,
                        report,
                    )?;
                }
                Ok(())
            }
            DeployPhase::CreateItems => {
                for item in &plan.items {
                    let outcome = self.executor.create_item(
                        workspace,
                        item.folder.as_deref(),
                        item.kind,
                        &item.name,
                    );
                    record(
                        outcome,
                        RecordRequest::new(item.kind, &item.name, workspace)
                            .in_folder(item.folder.clone()),
                        state,
                        report,
                    )?;
                }
                Ok(())
            }
            DeployPhase::AddPrincipals => {
                for principal in &plan.principals {
                    let outcome =
                        self.executor
                            .add_principal(workspace, &principal.id, principal.role);
                    let label = format!("{} ({})", principal.id, principal.role);
                    grant(outcome, &label, report)?;
                }
                Ok(())
            }
            DeployPhase::AssignDomain => match &plan.workspace.domain {
                Some(domain) => {
                    let outcome = self.executor.assign_domain(workspace, domain);
                    grant(outcome, &format!("domain {domain}"), report)
                }
                None => Ok(()),
            },
            DeployPhase::ConnectGit => self.connect_git(plan, report),
            DeployPhase::SetupPipeline => self.setup_pipeline(plan, report),
        }
    }

    fn create_workspace(
        &self,
        plan: &DeployPlan,
        state: &mut DeploymentState,
        report: &mut DeployReport,
    ) -> anyhow::Result<()> {
        let ws = &plan.workspace;
        let capacity = ws.capacity.as_deref();
        let outcome = match self
            .executor
            .create_workspace(&ws.name, capacity, &ws.description)
        {
            CreateOutcome::Failed(CreateFailure::Capacity(reason)) if capacity.is_some() => {
                warn!(
                    workspace = %ws.name,
                    capacity = capacity.unwrap_or_default(),
                    reason = %reason,
                    "Capacity assignment refused; retrying without capacity"
                );
                report.capacity_fallback = true;
                self.executor.create_workspace(&ws.name, None, &ws.description)
            }
            other => other,
        };

        report.workspace_id = outcome.id().map(str::to_string);
        let request = RecordRequest::workspace(&ws.name);
        let request = match capacity {
            Some(capacity) if !report.capacity_fallback => {
                request.with_metadata("capacity", capacity)
            }
            _ => request,
        };
        record(outcome, request, state, report)
    }

    fn connect_git(&self, plan: &DeployPlan, report: &mut DeployReport) -> anyhow::Result<()> {
        let Some(repo) = &plan.git else {
            return Ok(());
        };
        let Some(client) = &self.client else {
            return skip(DeployPhase::ConnectGit, report);
        };
        let workspace_id = self.workspace_id(plan, report)?;
        let outcome = GitConnector::new(client.clone())
            .connect(&workspace_id, repo)
            .with_context(|| format!("Failed to connect workspace to {}", repo.provider))?;
        if outcome.reused() {
            report.reused.push(format!("git connection ({})", repo.provider));
        }
        Ok(())
    }

    fn setup_pipeline(&self, plan: &DeployPlan, report: &mut DeployReport) -> anyhow::Result<()> {
        let Some(section) = &plan.pipeline else {
            return Ok(());
        };
        let Some(client) = &self.client else {
            return skip(DeployPhase::SetupPipeline, report);
        };
        let workspace_id = self.workspace_id(plan, report)?;
        let promoter = StagePromoter::new(client.clone());
        let (pipeline, reused) = promoter.ensure_pipeline(&section.name, &section.description)?;
        if reused {
            report.reused.push(format!("pipeline {}", pipeline.display_name));
        }
        promoter.assign_workspace(&pipeline.id, section.stage.display_name(), &workspace_id)?;
        report.pipeline_id = Some(pipeline.id);
        Ok(())
    }

    fn workspace_id(&self, plan: &DeployPlan, report: &mut DeployReport) -> anyhow::Result<String> {
        if let Some(id) = &report.workspace_id {
            return Ok(id.clone());
        }
        let id = self
            .executor
            .workspace_id(&plan.workspace.name)?
            .ok_or_else(|| {
                anyhow::anyhow!("Cannot resolve id of workspace '{}'", plan.workspace.name)
            })?;
        report.workspace_id = Some(id.clone());
        Ok(id)
    }

    fn refresh_secondary_auth(&self, options: &DeployOptions) -> anyhow::Result<()> {
        if let (Some(secondary), Some(client)) = (self.executor.secondary_auth(), &self.client) {
            client
                .tokens()
                .ensure_fresh_auth(secondary, options.secondary_max_age)
                .context("Failed to refresh executor credentials")?;
        }
        Ok(())
    }
}

/// Record a created resource; reused ones are reported but never recorded.
fn record(
    outcome: CreateOutcome,
    request: RecordRequest,
    state: &mut DeploymentState,
    report: &mut DeployReport,
) -> anyhow::Result<()> {
    let label = format!("{} '{}'", request.kind, request.name);
    match outcome {
        CreateOutcome::Created { id } => {
            let item = state.record(request.with_id(id))?;
            info!(kind = %item.kind, name = %item.name, id = ?item.item_id, "Created");
            Ok(())
        }
        CreateOutcome::AlreadyExists { .. } => {
            info!(resource = %label, "Already exists; reusing");
            report.reused.push(label);
            Ok(())
        }
        CreateOutcome::Failed(failure) => Err(anyhow::anyhow!("Failed to create {label}: {failure}")),
    }
}

/// Apply a grant-style outcome that creates nothing to roll back.
fn grant(outcome: CreateOutcome, label: &str, report: &mut DeployReport) -> anyhow::Result<()> {
    match outcome {
        CreateOutcome::Created { .. } => {
            info!(grant = label, "Granted");
            Ok(())
        }
        CreateOutcome::AlreadyExists { .. } => {
            report.reused.push(label.to_string());
            Ok(())
        }
        CreateOutcome::Failed(failure) => Err(anyhow::anyhow!("Failed to apply {label}: {failure}")),
    }
}

fn skip(phase: DeployPhase, report: &mut DeployReport) -> anyhow::Result<()> {
    warn!(phase = %phase, "No service client configured; skipping phase");
    report.skipped.push(phase);
    Ok(())
}
