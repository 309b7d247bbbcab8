//! Executor adapter that shells out to the `fab` workspace CLI.
//!
//! Every primitive is one `fab` invocation addressed by path
//! (`{ws}.Workspace/[{folder}.Folder/]{name}.{Suffix}`). Outcomes are
//! classified from the exit status and the process output; the adapter adds
//! no resource semantics of its own.
//!
//! Removal keys never carry a folder segment. Items this executor placed in
//! a folder are remembered so their removal goes to the nested path.

use std::collections::HashMap;
use std::process::Command;
use std::sync::Mutex;

use anyhow::Context;
use fabdeploy_core::auth::SecondaryAuth;
use fabdeploy_core::executor::{ResourceExecutor, item_path};
use fabdeploy_core::types::{CreateFailure, CreateOutcome, DeleteOutcome, ItemKind, PrincipalRole};
use tracing::debug;

/// Environment variable the `fab` CLI reads its access token from.
pub const TOKEN_ENV: &str = "FAB_TOKEN";

/// Captured result of one `fab` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FabOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl FabOutput {
    /// Combined output used for classification and error messages.
    fn message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }

    fn mentions(&self, needles: &[&str]) -> bool {
        let text = format!("{}\n{}", self.stdout, self.stderr).to_lowercase();
        needles.iter().any(|n| text.contains(n))
    }
}

/// Runs one `fab` command line.
pub trait FabRunner {
    fn run(&self, args: &[String], token: Option<&str>) -> anyhow::Result<FabOutput>;
}

/// Spawns the real binary.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl FabRunner for ProcessRunner {
    fn run(&self, args: &[String], token: Option<&str>) -> anyhow::Result<FabOutput> {
        let mut command = Command::new(&self.program);
        command.args(args);
        if let Some(token) = token {
            command.env(TOKEN_ENV, token);
        }
        let output = command
            .output()
            .with_context(|| format!("Failed to run {}", self.program))?;
        Ok(FabOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub struct FabExecutor<R = ProcessRunner> {
    runner: R,
    token: Mutex<Option<String>>,
    /// Removal key to nested path, for items created inside a folder.
    placed: Mutex<HashMap<String, String>>,
}

impl<R> std::fmt::Debug for FabExecutor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabExecutor").finish_non_exhaustive()
    }
}

impl FabExecutor<ProcessRunner> {
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_runner(ProcessRunner::new(program))
    }
}

impl<R: FabRunner> FabExecutor<R> {
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            token: Mutex::new(None),
            placed: Mutex::new(HashMap::new()),
        }
    }

    fn run(&self, args: &[&str]) -> anyhow::Result<FabOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        debug!(args = ?args, "Running fab");
        let token = self.token.lock().unwrap_or_else(|p| p.into_inner()).clone();
        self.runner.run(&args, token.as_deref())
    }

    fn create(&self, args: &[&str], capacity_requested: bool) -> CreateOutcome {
        match self.run(args) {
            Ok(output) => classify_create(&output, capacity_requested),
            Err(err) => CreateOutcome::Failed(CreateFailure::Other(format!("{err:#}"))),
        }
    }

    fn delete(&self, path: &str) -> DeleteOutcome {
        match self.run(&["rm", path, "-f"]) {
            Ok(output) => classify_delete(&output),
            Err(err) => DeleteOutcome::Failed(format!("{err:#}")),
        }
    }
}

impl<R: FabRunner> ResourceExecutor for FabExecutor<R> {
    fn create_workspace(
        &self,
        name: &str,
        capacity: Option<&str>,
        description: &str,
    ) -> CreateOutcome {
        let path = format!("{name}.Workspace");
        let mut params = Vec::new();
        if let Some(capacity) = capacity {
            params.push(format!("capacityName={capacity}"));
        }
        if !description.is_empty() {
            params.push(format!("description={description}"));
        }
        let params = params.join(",");
        let mut args = vec!["mkdir", path.as_str()];
        if !params.is_empty() {
            args.extend(["-P", params.as_str()]);
        }
        self.create(&args, capacity.is_some())
    }

    fn delete_workspace(&self, name: &str) -> DeleteOutcome {
        self.delete(&format!("{name}.Workspace"))
    }

    fn remove_by_path(&self, path: &str) -> DeleteOutcome {
        let nested = self
            .placed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(path)
            .cloned();
        self.delete(nested.as_deref().unwrap_or(path))
    }

    fn create_folder(&self, workspace: &str, name: &str) -> CreateOutcome {
        let path = item_path(workspace, None, ItemKind::Folder, name);
        self.create(&["mkdir", &path], false)
    }

    fn create_item(
        &self,
        workspace: &str,
        folder: Option<&str>,
        kind: ItemKind,
        name: &str,
    ) -> CreateOutcome {
        let path = item_path(workspace, folder, kind, name);
        let outcome = self.create(&["mkdir", &path], false);
        if folder.is_some() && outcome.is_success() {
            self.placed
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .insert(item_path(workspace, None, kind, name), path);
        }
        outcome
    }

    fn add_principal(
        &self,
        workspace: &str,
        principal: &str,
        role: PrincipalRole,
    ) -> CreateOutcome {
        let path = format!("{workspace}.Workspace");
        let role = role.as_str().to_lowercase();
        self.create(
            &["acl", "set", &path, "-I", principal, "-R", &role, "-f"],
            false,
        )
    }

    fn assign_domain(&self, workspace: &str, domain: &str) -> CreateOutcome {
        let domain = format!(".domains/{domain}.Domain");
        let workspace = format!("{workspace}.Workspace");
        self.create(&["assign", &domain, "-W", &workspace, "-f"], false)
    }

    fn workspace_id(&self, name: &str) -> anyhow::Result<Option<String>> {
        let output = self.run(&["get", &format!("{name}.Workspace"), "-q", "id"])?;
        if !output.success {
            if output.mentions(&["not found", "notfound"]) {
                return Ok(None);
            }
            anyhow::bail!("Failed to look up workspace {}: {}", name, output.message());
        }
        let id = output.stdout.trim().trim_matches('"').to_string();
        Ok((!id.is_empty()).then_some(id))
    }

    fn secondary_auth(&self) -> Option<&dyn SecondaryAuth> {
        Some(self)
    }
}

impl<R: FabRunner> SecondaryAuth for FabExecutor<R> {
    /// Later invocations run with the new token in their environment.
    fn reauthenticate(&self, token: &str) -> anyhow::Result<()> {
        *self.token.lock().unwrap_or_else(|p| p.into_inner()) = Some(token.to_string());
        Ok(())
    }
}

fn classify_create(output: &FabOutput, capacity_requested: bool) -> CreateOutcome {
    if output.success {
        return CreateOutcome::Created { id: None };
    }
    if output.mentions(&["already exists", "alreadyexists", "already assigned"]) {
        return CreateOutcome::AlreadyExists { id: None };
    }
    if capacity_requested && output.mentions(&["capacity"]) {
        return CreateOutcome::Failed(CreateFailure::Capacity(output.message()));
    }
    CreateOutcome::Failed(CreateFailure::Other(output.message()))
}

fn classify_delete(output: &FabOutput) -> DeleteOutcome {
    if output.success {
        DeleteOutcome::Deleted
    } else if output.mentions(&["not found", "notfound", "does not exist"]) {
        DeleteOutcome::NotFound
    } else {
        DeleteOutcome::Failed(output.message())
    }
}
