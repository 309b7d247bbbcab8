//! Phase sequencing, rollback on failure, and the remote phases.

mod support;

use std::sync::Arc;

use fabdeploy_core::config::parse_config_str;
use fabdeploy_core::deploy::{DeployOptions, DeployPhase, DeployPlan, Deployer};
use fabdeploy_core::types::ItemKind;
use serde_json::json;
use support::{FakeExecutor, RecordingSecondary, RecordingSleeper, ScriptedTransport, client};
use tempfile::TempDir;

const BASIC: &str = r#"
[workspace]
name = "W"
capacity = "F64"

[[folders]]
name = "Bronze"

[[items]]
kind = "lakehouse"
name = "L1"
folder = "Bronze"

[[principals]]
id = "analyst@contoso.com"
role = "Viewer"
"#;

fn plan(toml: &str) -> DeployPlan {
    DeployPlan::from_config(&parse_config_str(toml).expect("valid config"))
}

// =========================================================================
// Happy path
// =========================================================================

#[test]
fn phases_run_in_order_and_record_created_resources() {
    let executor = FakeExecutor::new();
    let report = Deployer::new(&executor).deploy(&plan(BASIC), &DeployOptions::default());

    assert!(report.success(), "{:?}", report.error);
    assert_eq!(
        executor.calls(),
        vec![
            "create W.Workspace",
            "create W.Workspace/Bronze.Folder",
            "create W.Workspace/Bronze.Folder/L1.Lakehouse",
            "grant W analyst@contoso.com Viewer",
        ]
    );
    let kinds: Vec<ItemKind> = report.created.iter().map(|i| i.kind).collect();
    assert_eq!(
        kinds,
        vec![ItemKind::Workspace, ItemKind::Folder, ItemKind::Lakehouse]
    );
    assert_eq!(report.workspace_id.as_deref(), Some("id-W.Workspace"));
    assert_eq!(report.created[0].metadata["capacity"], "F64");
}

#[test]
fn existing_resources_are_reused_and_never_recorded() {
    let mut executor = FakeExecutor::new();
    executor.existing.insert("W.Workspace".to_string());
    executor
        .existing
        .insert("W.Workspace/Bronze.Folder".to_string());

    let report = Deployer::new(&executor).deploy(&plan(BASIC), &DeployOptions::default());

    assert!(report.success());
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.created[0].name, "L1");
    assert_eq!(report.reused.len(), 2);
    assert_eq!(report.workspace_id.as_deref(), Some("existing-W.Workspace"));
}

#[test]
fn refused_capacity_falls_back_to_no_capacity_once() {
    let mut executor = FakeExecutor::new();
    executor.refuse_capacity = true;

    let report = Deployer::new(&executor).deploy(&plan(BASIC), &DeployOptions::default());

    assert!(report.success());
    assert!(report.capacity_fallback);
    assert_eq!(
        &executor.calls()[..2],
        &["create W.Workspace capacity=F64", "create W.Workspace"]
    );
    assert!(!report.created[0].metadata.contains_key("capacity"));
}

// =========================================================================
// Failure and rollback
// =========================================================================

#[test]
fn failed_principals_phase_rolls_back_items_then_workspace() {
    let temp = TempDir::new().unwrap();
    let checkpoint = temp.path().join("dep.checkpoint.json");
    let mut executor = FakeExecutor::new();
    executor
        .existing
        .insert("W.Workspace/Bronze.Folder".to_string());
    executor.fail_principals = true;
    let options = DeployOptions {
        rollback_on_failure: true,
        checkpoint_path: Some(checkpoint.clone()),
        ..DeployOptions::default()
    };

    let report = Deployer::new(&executor).deploy(&plan(BASIC), &options);

    assert!(!report.success());
    assert_eq!(report.stopped_at, Some(DeployPhase::AddPrincipals));
    assert!(
        report
            .error
            .as_deref()
            .unwrap()
            .contains("principal analyst@contoso.com not found in directory")
    );
    assert!(report.rolled_back);
    let rollback = report.rollback.as_ref().unwrap();
    assert_eq!(rollback.deleted, 2);
    assert_eq!(rollback.failed, 0);
    assert_eq!(
        executor.deletions(),
        vec!["W.Workspace/L1.Lakehouse", "W.Workspace"]
    );
    assert!(!checkpoint.exists());
}

#[test]
fn failure_without_rollback_keeps_resources_and_checkpoint() {
    let temp = TempDir::new().unwrap();
    let checkpoint = temp.path().join("dep.checkpoint.json");
    let mut executor = FakeExecutor::new();
    executor.fail_principals = true;
    let options = DeployOptions {
        checkpoint_path: Some(checkpoint.clone()),
        ..DeployOptions::default()
    };

    let report = Deployer::new(&executor).deploy(&plan(BASIC), &options);

    assert_eq!(report.stopped_at, Some(DeployPhase::AddPrincipals));
    assert!(!report.rolled_back);
    assert!(executor.deletions().is_empty());
    assert_eq!(report.created.len(), 3);
    assert!(checkpoint.exists());
}

#[test]
fn workspace_failure_needs_no_rollback() {
    let mut executor = FakeExecutor::new();
    executor.fail_create.insert("W.Workspace".to_string());
    let options = DeployOptions {
        rollback_on_failure: true,
        ..DeployOptions::default()
    };

    let report = Deployer::new(&executor).deploy(&plan(BASIC), &options);

    assert_eq!(report.stopped_at, Some(DeployPhase::CreateWorkspace));
    assert!(report.error.as_deref().unwrap().contains("W.Workspace rejected"));
    assert!(!report.rolled_back);
    assert!(report.rollback.is_none());
    assert_eq!(executor.calls(), vec!["create W.Workspace"]);
}

#[test]
fn item_failure_stops_before_later_items() {
    let toml = r#"
[workspace]
name = "W"

[[items]]
kind = "notebook"
name = "a"

[[items]]
kind = "notebook"
name = "b"

[[items]]
kind = "report"
name = "c"
"#;
    let mut executor = FakeExecutor::new();
    executor
        .fail_create
        .insert("W.Workspace/b.Notebook".to_string());
    let options = DeployOptions {
        rollback_on_failure: true,
        ..DeployOptions::default()
    };

    let report = Deployer::new(&executor).deploy(&plan(toml), &options);

    assert_eq!(report.stopped_at, Some(DeployPhase::CreateItems));
    assert!(!executor.calls().contains(&"create W.Workspace/c.Report".to_string()));
    assert_eq!(
        executor.deletions(),
        vec!["W.Workspace/a.Notebook", "W.Workspace"]
    );
}

// =========================================================================
// Remote phases
// =========================================================================

const REMOTE: &str = r#"
[workspace]
name = "W"
domain = "Finance"

[git]
provider = "github"
owner = "contoso"
repository = "fabric"

[pipeline]
name = "Sales"
stage = "Development"
"#;

#[test]
fn remote_phases_are_skipped_without_a_client() {
    let executor = FakeExecutor::new();
    let report = Deployer::new(&executor).deploy(&plan(REMOTE), &DeployOptions::default());

    assert!(report.success());
    assert_eq!(
        report.skipped,
        vec![DeployPhase::ConnectGit, DeployPhase::SetupPipeline]
    );
    assert!(executor.calls().contains(&"domain W Finance".to_string()));
}

#[test]
fn git_and_pipeline_phases_use_the_rest_boundary() {
    let transport = ScriptedTransport::new();
    transport
        // ConnectGit
        .ok(json!({}))
        .ok(json!({}))
        // SetupPipeline
        .ok(json!({ "value": [] }))
        .ok(json!({ "id": "p1", "displayName": "Sales" }))
        .ok(json!({ "value": [
            { "id": "s-dev", "displayName": "Development", "order": 0 },
            { "id": "s-test", "displayName": "Test", "order": 1 },
            { "id": "s-prod", "displayName": "Production", "order": 2 },
        ]}))
        .ok(json!({}));
    let client = client(transport.clone(), RecordingSleeper::new());
    let executor = FakeExecutor::new();

    let report = Deployer::new(&executor)
        .with_client(client)
        .deploy(&plan(REMOTE), &DeployOptions::default());

    assert!(report.success(), "{:?}", report.error);
    assert_eq!(report.pipeline_id.as_deref(), Some("p1"));
    assert_eq!(
        transport.paths(),
        vec![
            "workspaces/id-W.Workspace/git/connect",
            "workspaces/id-W.Workspace/git/initializeConnection",
            "deploymentPipelines",
            "deploymentPipelines",
            "deploymentPipelines/p1/stages",
            "deploymentPipelines/p1/stages/s-dev/assignWorkspace",
        ]
    );
    let connect = &transport.requests()[0];
    assert_eq!(
        connect.body.as_ref().unwrap()["gitProviderDetails"]["ownerName"],
        "contoso"
    );
}

#[test]
fn duplicate_git_connection_is_recovered_for_azure_devops() {
    let toml = r#"
[workspace]
name = "W"

[git]
provider = "azure-devops"
owner = "contoso"
project = "analytics"
repository = "fabric"
"#;
    let transport = ScriptedTransport::new();
    transport
        .status(409)
        .ok(json!({ "gitConnectionState": "ConnectedAndInitialized" }));
    let client = client(transport.clone(), RecordingSleeper::new());
    let executor = FakeExecutor::new();

    let report = Deployer::new(&executor)
        .with_client(client)
        .deploy(&plan(toml), &DeployOptions::default());

    assert!(report.success(), "{:?}", report.error);
    assert_eq!(report.reused, vec!["git connection (AzureDevOps)"]);
    assert_eq!(
        transport.paths()[1],
        "workspaces/id-W.Workspace/git/connection"
    );
}

#[test]
fn git_failure_rolls_back_executor_resources() {
    let toml = r#"
[workspace]
name = "W"

[git]
provider = "github"
owner = "contoso"
repository = "fabric"
"#;
    let transport = ScriptedTransport::new();
    transport.status(403);
    let client = client(transport.clone(), RecordingSleeper::new());
    let executor = FakeExecutor::new();
    let options = DeployOptions {
        rollback_on_failure: true,
        ..DeployOptions::default()
    };

    let report = Deployer::new(&executor)
        .with_client(client)
        .deploy(&plan(toml), &options);

    assert_eq!(report.stopped_at, Some(DeployPhase::ConnectGit));
    let error = report.error.as_deref().unwrap();
    assert!(error.contains("Failed to connect workspace to GitHub"));
    assert!(error.contains("HTTP 403"));
    assert_eq!(executor.deletions(), vec!["W.Workspace"]);
}

#[test]
fn secondary_auth_is_refreshed_before_executor_phases() {
    let transport = ScriptedTransport::new();
    let client = client(transport, RecordingSleeper::new());
    let secondary = Arc::new(RecordingSecondary::default());
    let mut executor = FakeExecutor::new();
    executor.secondary = Some(secondary.clone());

    let report = Deployer::new(&executor)
        .with_client(client)
        .deploy(&plan(BASIC), &DeployOptions::default());

    assert!(report.success());
    // first phase syncs; the token does not change within the run
    assert_eq!(secondary.tokens(), vec!["token-1"]);
}
