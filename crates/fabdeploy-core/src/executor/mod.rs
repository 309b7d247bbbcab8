//! Boundary to the resource-mutation primitives.
//!
//! The core never creates or deletes resources itself; it drives a
//! [`ResourceExecutor`] and interprets the typed outcomes it returns.

use std::sync::Mutex;

use crate::auth::SecondaryAuth;
use crate::types::{CreateOutcome, DeleteOutcome, ItemKind, PrincipalRole};

/// Idempotent create/check/delete primitives for workspace resources.
///
/// Create calls report an existing resource as [`CreateOutcome::AlreadyExists`]
/// instead of failing. Delete calls report a missing resource as
/// [`DeleteOutcome::NotFound`].
pub trait ResourceExecutor {
    fn create_workspace(
        &self,
        name: &str,
        capacity: Option<&str>,
        description: &str,
    ) -> CreateOutcome;

    fn delete_workspace(&self, name: &str) -> DeleteOutcome;

    /// Delete an item addressed as `{ws}.Workspace/{name}.{Suffix}`.
    fn remove_by_path(&self, path: &str) -> DeleteOutcome;

    fn create_folder(&self, workspace: &str, name: &str) -> CreateOutcome;

    fn create_item(
        &self,
        workspace: &str,
        folder: Option<&str>,
        kind: ItemKind,
        name: &str,
    ) -> CreateOutcome;

    fn add_principal(&self, workspace: &str, principal: &str, role: PrincipalRole)
    -> CreateOutcome;

    fn assign_domain(&self, workspace: &str, domain: &str) -> CreateOutcome;

    /// Resolve a workspace name to its id.
    fn workspace_id(&self, name: &str) -> anyhow::Result<Option<String>>;

    /// A separately authenticated process behind this executor, if any.
    fn secondary_auth(&self) -> Option<&dyn SecondaryAuth> {
        None
    }
}

/// Path of a resource inside a workspace, optionally nested in a folder.
///
/// Rollback always addresses items without the folder segment.
pub fn item_path(workspace: &str, folder: Option<&str>, kind: ItemKind, name: &str) -> String {
    match folder {
        Some(folder) => format!(
            "{workspace}.Workspace/{folder}.Folder/{name}.{}",
            kind.type_suffix()
        ),
        None => format!("{workspace}.Workspace/{name}.{}", kind.type_suffix()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorCall {
    CreateWorkspace {
        name: String,
        capacity: Option<String>,
    },
    DeleteWorkspace(String),
    RemoveByPath(String),
    CreateFolder {
        workspace: String,
        name: String,
    },
    CreateItem {
        workspace: String,
        folder: Option<String>,
        kind: ItemKind,
        name: String,
    },
    AddPrincipal {
        workspace: String,
        principal: String,
        role: PrincipalRole,
    },
    AssignDomain {
        workspace: String,
        domain: String,
    },
}

/// Dry-run executor: every call succeeds and is remembered in order.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<ExecutorCall>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn push(&self, call: ExecutorCall) {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(call);
    }

    fn created(&self) -> CreateOutcome {
        CreateOutcome::Created {
            id: Some(uuid::Uuid::new_v4().to_string()),
        }
    }
}

impl ResourceExecutor for RecordingExecutor {
    fn create_workspace(
        &self,
        name: &str,
        capacity: Option<&str>,
        _description: &str,
    ) -> CreateOutcome {
        self.push(ExecutorCall::CreateWorkspace {
            name: name.to_string(),
            capacity: capacity.map(str::to_string),
        });
        self.created()
    }

    fn delete_workspace(&self, name: &str) -> DeleteOutcome {
        self.push(ExecutorCall::DeleteWorkspace(name.to_string()));
        DeleteOutcome::Deleted
    }

    fn remove_by_path(&self, path: &str) -> DeleteOutcome {
        self.push(ExecutorCall::RemoveByPath(path.to_string()));
        DeleteOutcome::Deleted
    }

    fn create_folder(&self, workspace: &str, name: &str) -> CreateOutcome {
        self.push(ExecutorCall::CreateFolder {
            workspace: workspace.to_string(),
            name: name.to_string(),
        });
        self.created()
    }

    fn create_item(
        &self,
        workspace: &str,
        folder: Option<&str>,
        kind: ItemKind,
        name: &str,
    ) -> CreateOutcome {
        self.push(ExecutorCall::CreateItem {
            workspace: workspace.to_string(),
            folder: folder.map(str::to_string),
            kind,
            name: name.to_string(),
        });
        self.created()
    }

    fn add_principal(
        &self,
        workspace: &str,
        principal: &str,
        role: PrincipalRole,
    ) -> CreateOutcome {
        self.push(ExecutorCall::AddPrincipal {
            workspace: workspace.to_string(),
            principal: principal.to_string(),
            role,
        });
        CreateOutcome::Created { id: None }
    }

    fn assign_domain(&self, workspace: &str, domain: &str) -> CreateOutcome {
        self.push(ExecutorCall::AssignDomain {
            workspace: workspace.to_string(),
            domain: domain.to_string(),
        });
        CreateOutcome::Created { id: None }
    }

    fn workspace_id(&self, _name: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}
