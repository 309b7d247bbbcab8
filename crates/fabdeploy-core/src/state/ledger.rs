//! Rollback ledger for one deployment run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::checkpoint::Checkpoint;
use crate::executor::{ResourceExecutor, item_path};
use crate::types::{DeleteOutcome, ItemKind};

/// One resource this run created. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedItem {
    #[serde(rename = "itemType")]
    pub kind: ItemKind,
    pub name: String,
    pub workspace_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl CreatedItem {
    /// Key handed to `remove_by_path` for non-workspace items:
    /// `{ws}.Workspace/{name}.{Suffix}`. The folder is not part of the key.
    pub fn removal_path(&self) -> String {
        item_path(&self.workspace_name, None, self.kind, &self.name)
    }

    fn label(&self) -> String {
        match self.kind {
            ItemKind::Workspace => format!("{}.Workspace", self.name),
            _ => self.removal_path(),
        }
    }
}

/// Arguments for [`DeploymentState::record`].
#[derive(Debug, Clone)]
pub struct RecordRequest {
    pub kind: ItemKind,
    pub name: String,
    pub workspace_name: String,
    pub item_id: Option<String>,
    pub folder_name: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl RecordRequest {
    pub fn new(kind: ItemKind, name: impl Into<String>, workspace_name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            workspace_name: workspace_name.into(),
            item_id: None,
            folder_name: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Record a workspace, which is its own containing workspace.
    pub fn workspace(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ItemKind::Workspace, name.clone(), name)
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.item_id = id;
        self
    }

    pub fn in_folder(mut self, folder: Option<String>) -> Self {
        self.folder_name = folder;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub deleted: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    /// Items left untouched because `stop_on_error` ended the walk early.
    pub skipped: usize,
}

impl RollbackReport {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Ordered record of everything a deployment created.
///
/// Insertion order is creation order; rollback walks it in reverse so
/// children are deleted before the workspace that contains them.
#[derive(Debug, Clone)]
pub struct DeploymentState {
    deployment_id: String,
    started_at: DateTime<Utc>,
    items: Vec<CreatedItem>,
    checkpoint_path: Option<PathBuf>,
}

impl DeploymentState {
    pub fn new(checkpoint_path: Option<PathBuf>) -> Self {
        Self {
            deployment_id: new_deployment_id(),
            started_at: Utc::now(),
            items: Vec::new(),
            checkpoint_path,
        }
    }

    /// Rebuild a ledger from a checkpoint written by an earlier run.
    ///
    /// The resumed ledger keeps writing to the same file.
    pub fn resume(path: &Path) -> anyhow::Result<Self> {
        let checkpoint = Checkpoint::load(path)?;
        info!(
            deployment_id = %checkpoint.deployment_id,
            items = checkpoint.items.len(),
            path = %path.display(),
            "Resumed deployment ledger from checkpoint"
        );
        Ok(Self {
            deployment_id: checkpoint.deployment_id,
            started_at: checkpoint.started_at,
            items: checkpoint.items,
            checkpoint_path: Some(path.to_path_buf()),
        })
    }

    /// Clear the ledger and stamp a new deployment id.
    pub fn start(&mut self, deployment_id: Option<String>) -> &str {
        self.items.clear();
        self.deployment_id = deployment_id.unwrap_or_else(new_deployment_id);
        self.started_at = Utc::now();
        debug!(deployment_id = %self.deployment_id, "Started deployment ledger");
        &self.deployment_id
    }

    /// Append an item and persist the checkpoint, if one is configured.
    pub fn record(&mut self, request: RecordRequest) -> anyhow::Result<CreatedItem> {
        let item = CreatedItem {
            kind: request.kind,
            name: request.name,
            workspace_name: request.workspace_name,
            item_id: request.item_id,
            folder_name: request.folder_name,
            metadata: request.metadata,
            created_at: Utc::now(),
        };
        self.items.push(item.clone());
        debug!(
            kind = %item.kind,
            name = %item.name,
            workspace = %item.workspace_name,
            position = self.items.len(),
            "Recorded created resource"
        );
        self.persist()?;
        Ok(item)
    }

    /// Delete recorded resources in reverse order.
    ///
    /// Every deletion is attempted even if an earlier one failed, unless
    /// `stop_on_error` is set; items left untouched by an early stop are
    /// counted in [`RollbackReport::skipped`]. Either way the ledger is
    /// cleared and the checkpoint removed afterwards.
    pub fn rollback(
        &mut self,
        executor: &dyn ResourceExecutor,
        stop_on_error: bool,
    ) -> RollbackReport {
        let mut report = RollbackReport::default();
        info!(
            deployment_id = %self.deployment_id,
            items = self.items.len(),
            "Rolling back deployment"
        );

        let mut stopped_at = None;
        for (index, item) in self.items.iter().enumerate().rev() {
            let outcome = match item.kind {
                ItemKind::Workspace => executor.delete_workspace(&item.name),
                _ => executor.remove_by_path(&item.removal_path()),
            };
            match outcome {
                DeleteOutcome::Deleted => {
                    info!(resource = %item.label(), "Deleted");
                    report.deleted += 1;
                }
                DeleteOutcome::NotFound => {
                    debug!(resource = %item.label(), "Already gone");
                    report.deleted += 1;
                }
                DeleteOutcome::Failed(message) => {
                    warn!(resource = %item.label(), error = %message, "Rollback deletion failed");
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", item.label(), message));
                    if stop_on_error {
                        stopped_at = Some(index);
                        break;
                    }
                }
            }
        }

        if let Some(index) = stopped_at {
            report.skipped = index;
        }
        self.items.clear();
        if let Some(path) = &self.checkpoint_path
            && let Err(e) = Checkpoint::remove(path)
        {
            warn!(error = %format!("{e:#}"), "Failed to remove checkpoint after rollback");
        }

        info!(
            deleted = report.deleted,
            failed = report.failed,
            skipped = report.skipped,
            "Rollback finished"
        );
        report
    }

    pub fn items(&self) -> &[CreatedItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn checkpoint_path(&self) -> Option<&Path> {
        self.checkpoint_path.as_deref()
    }

    /// Count of recorded items per kind, in [`ItemKind::ALL`] order.
    pub fn summary(&self) -> Vec<(ItemKind, usize)> {
        ItemKind::ALL
            .iter()
            .map(|kind| (*kind, self.items.iter().filter(|i| i.kind == *kind).count()))
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    fn persist(&self) -> anyhow::Result<()> {
        let Some(path) = &self.checkpoint_path else {
            return Ok(());
        };
        let checkpoint = Checkpoint {
            deployment_id: self.deployment_id.clone(),
            started_at: self.started_at,
            saved_at: Utc::now(),
            items: self.items.clone(),
        };
        checkpoint
            .save(path)
            .with_context(|| format!("Failed to checkpoint deployment {}", self.deployment_id))
    }
}

fn new_deployment_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
