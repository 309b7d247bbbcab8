//! fabdeploy CLI
//!
//! Command-line interface for provisioning workspaces and promoting
//! deployment pipeline content.

mod fab;
mod interactive;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use fabdeploy_core::config::{ServiceSettings, default_config_path, parse_config, parse_settings};
use fabdeploy_core::context::AppContext;
use fabdeploy_core::deploy::{DeployOptions, DeployPlan, DeployReport, Deployer};
use fabdeploy_core::executor::{ExecutorCall, RecordingExecutor};
use fabdeploy_core::operation::PollOutcome;
use fabdeploy_core::pipeline::{PipelineStage, PromotionResult, infer_target};
use fabdeploy_core::state::{DeploymentState, RollbackReport};

use crate::fab::FabExecutor;
use crate::interactive::{PromotionPlan, confirm_promotion};

#[derive(Parser)]
#[command(name = "fabdeploy")]
#[command(about = "Workspace provisioning and stage promotion", long_about = None)]
#[command(version)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the workspace described by a config file
    Deploy(DeployArgs),

    /// Promote content to the next (or a given) pipeline stage
    Promote(PromoteArgs),

    /// Delete everything recorded in a checkpoint, newest first
    Rollback {
        /// Checkpoint file written by `deploy --checkpoint`
        #[arg(long)]
        checkpoint: PathBuf,

        /// Stop at the first failed deletion
        #[arg(long)]
        stop_on_error: bool,

        /// Config file for service settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Workspace CLI binary
        #[arg(long, default_value = "fab")]
        fab_bin: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List the stages of a deployment pipeline
    Stages {
        /// Pipeline display name or id
        #[arg(long)]
        pipeline: String,

        /// Config file for service settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Check a config file without touching the service
    Validate {
        /// Path to fabdeploy.toml
        config: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Args)]
struct DeployArgs {
    /// Path to fabdeploy.toml
    config: PathBuf,

    /// Delete what this run created if a phase fails
    #[arg(long)]
    rollback_on_failure: bool,

    /// Persist the ledger so `rollback` can undo the run later
    #[arg(long)]
    checkpoint: bool,

    /// Print the executor calls without running them
    #[arg(long)]
    dry_run: bool,

    /// Workspace CLI binary
    #[arg(long, default_value = "fab")]
    fab_bin: String,

    /// Output format
    #[arg(short, long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Args)]
struct PromoteArgs {
    /// Pipeline display name or id
    #[arg(long)]
    pipeline: String,

    /// Source stage (Development, Test, Production)
    #[arg(long)]
    from: String,

    /// Target stage; defaults to the stage after --from
    #[arg(long)]
    to: Option<String>,

    /// Deployment note
    #[arg(long, default_value = "")]
    note: String,

    /// Skip the Production confirmation prompt
    #[arg(short, long)]
    yes: bool,

    /// Config file for service settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only show issues (non-zero exit if problems)
    Quiet,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Deploy(args) => run_deploy(args),
        Commands::Promote(args) => run_promote(args),
        Commands::Rollback {
            checkpoint,
            stop_on_error,
            config,
            fab_bin,
            format,
        } => run_rollback(&checkpoint, stop_on_error, config.as_deref(), &fab_bin, format),
        Commands::Stages {
            pipeline,
            config,
            format,
        } => run_stages(&pipeline, config.as_deref(), format),
        Commands::Validate { config, format } => run_validate(&config, format),
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "fabdeploy=debug,fabdeploy_core=debug,info"
    } else {
        "fabdeploy=info,fabdeploy_core=info,warn"
    };
    // Logs go to stderr so JSON output on stdout stays parseable.
    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!json).then(|| fmt::layer().with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// Service settings from `--config`, else `./fabdeploy.toml`, else defaults.
fn load_settings(config: Option<&Path>) -> Result<ServiceSettings> {
    if let Some(path) = config {
        return parse_settings(path);
    }
    let default = default_config_path(&std::env::current_dir()?);
    if default.exists() {
        parse_settings(&default)
    } else {
        Ok(ServiceSettings::default())
    }
}

// ============================================================================
// deploy
// ============================================================================

fn run_deploy(args: DeployArgs) -> Result<()> {
    let config = parse_config(&args.config)?;
    let plan = DeployPlan::from_config(&config);

    if args.dry_run {
        let executor = RecordingExecutor::new();
        let report = Deployer::new(&executor).deploy(&plan, &DeployOptions::default());
        print_dry_run(&report, &executor.calls(), args.format)?;
        return Ok(());
    }

    let ctx = AppContext::from_settings(config.settings())?;
    let executor = FabExecutor::new(&args.fab_bin);
    let options = ctx.deploy_options(args.rollback_on_failure, args.checkpoint)?;
    let report = ctx.deployer(&executor).deploy(&plan, &options);

    print_deploy_report(&report, args.format)?;
    if !report.success() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_deploy_report(report: &DeployReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if report.success() {
                println!(
                    "{} Deployed workspace '{}'",
                    style("✓").green(),
                    report.workspace
                );
            } else {
                println!(
                    "{} Deployment of '{}' failed",
                    style("✗").red(),
                    report.workspace
                );
            }
            println!("  Deployment: {}", report.deployment_id);
            if let Some(id) = &report.workspace_id {
                println!("  Workspace id: {id}");
            }
            for item in &report.created {
                println!("  + {} {}", item.kind, item.removal_path());
            }
            for label in &report.reused {
                println!("  • {label} already existed");
            }
            if report.capacity_fallback {
                println!("  ⚠ capacity was refused; workspace created without one");
            }
            for phase in &report.skipped {
                println!("  ⚠ {phase} skipped");
            }
            if let Some(id) = &report.pipeline_id {
                println!("  Pipeline: {id}");
            }
            if let (Some(phase), Some(error)) = (&report.stopped_at, &report.error) {
                println!("  {} {phase}: {error}", style("Stopped at").red().bold());
            }
            if let Some(rollback) = &report.rollback {
                print_rollback_lines(rollback);
            } else if let Some(path) = &report.checkpoint_path
                && path.exists()
            {
                println!("  Checkpoint: {}", path.display());
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Quiet => {
            if let (Some(phase), Some(error)) = (&report.stopped_at, &report.error) {
                eprintln!("{phase}: {error}");
            }
            if let Some(rollback) = &report.rollback {
                for error in &rollback.errors {
                    eprintln!("rollback: {error}");
                }
            }
        }
    }
    Ok(())
}

fn print_dry_run(report: &DeployReport, calls: &[ExecutorCall], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("Dry run for workspace '{}':", report.workspace);
            for call in calls {
                println!("  • {}", describe_call(call));
            }
            for phase in &report.skipped {
                println!("  ⚠ {phase} needs the service and was not planned");
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "workspace": report.workspace,
                "calls": calls.iter().map(describe_call).collect::<Vec<_>>(),
                "skipped": report.skipped,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => {}
    }
    Ok(())
}

fn describe_call(call: &ExecutorCall) -> String {
    match call {
        ExecutorCall::CreateWorkspace { name, capacity } => match capacity {
            Some(capacity) => format!("create workspace {name} on capacity {capacity}"),
            None => format!("create workspace {name}"),
        },
        ExecutorCall::DeleteWorkspace(name) => format!("delete workspace {name}"),
        ExecutorCall::RemoveByPath(path) => format!("remove {path}"),
        ExecutorCall::CreateFolder { workspace, name } => {
            format!("create folder {name} in {workspace}")
        }
        ExecutorCall::CreateItem {
            workspace,
            folder,
            kind,
            name,
        } => match folder {
            Some(folder) => format!("create {kind} {name} in {workspace}/{folder}"),
            None => format!("create {kind} {name} in {workspace}"),
        },
        ExecutorCall::AddPrincipal {
            workspace,
            principal,
            role,
        } => format!("grant {role} on {workspace} to {principal}"),
        ExecutorCall::AssignDomain { workspace, domain } => {
            format!("assign {workspace} to domain {domain}")
        }
    }
}

// ============================================================================
// promote / stages
// ============================================================================

fn run_promote(args: PromoteArgs) -> Result<()> {
    let ctx = AppContext::from_settings(load_settings(args.config.as_deref())?)?;
    let promoter = ctx.promoter();

    let target = match &args.to {
        Some(to) => to.clone(),
        None => infer_target(&args.from)?.display_name().to_string(),
    };
    let pipeline = promoter.resolve_pipeline(&args.pipeline)?;

    let plan = PromotionPlan {
        pipeline: &pipeline.display_name,
        source: &args.from,
        target: &target,
        note: &args.note,
    };
    if !confirm_promotion(&plan, args.yes)? {
        println!("Promotion cancelled");
        return Ok(());
    }

    let result = promoter.promote(&pipeline.id, &args.from, Some(&target), &args.note)?;
    print_promotion(&pipeline.display_name, &result, args.format)?;
    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_promotion(pipeline: &str, result: &PromotionResult, format: OutputFormat) -> Result<()> {
    let (status, detail) = match &result.outcome {
        PollOutcome::Completed { operation, .. } => {
            (operation.status.to_string(), operation.error_message())
        }
        PollOutcome::TimedOut { last_status, .. } => (
            "TimedOut".to_string(),
            Some(format!("last observed status {last_status}")),
        ),
    };

    match format {
        OutputFormat::Table => {
            let mark = if result.is_success() {
                style("✓").green()
            } else {
                style("✗").red()
            };
            println!(
                "{mark} {pipeline}: {} → {} {status}",
                result.source_stage, result.target_stage
            );
            println!(
                "  Operation: {} ({} polls)",
                result.operation_id,
                result.outcome.polls()
            );
            if let Some(detail) = &detail {
                println!("  ⚠ {detail}");
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "pipeline": pipeline,
                "pipelineId": result.pipeline_id,
                "source": result.source_stage,
                "target": result.target_stage,
                "operationId": result.operation_id,
                "status": status,
                "polls": result.outcome.polls(),
                "timedOut": result.outcome.is_timeout(),
                "error": detail,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => {
            if !result.is_success() {
                eprintln!(
                    "{} → {}: {status}{}",
                    result.source_stage,
                    result.target_stage,
                    detail.map(|d| format!(" ({d})")).unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

fn run_stages(pipeline: &str, config: Option<&Path>, format: OutputFormat) -> Result<()> {
    let ctx = AppContext::from_settings(load_settings(config)?)?;
    let promoter = ctx.promoter();
    let summary = promoter.resolve_pipeline(pipeline)?;
    let pipeline = promoter.pipeline(summary)?;

    match format {
        OutputFormat::Table => print_stages_table(&pipeline.display_name, &pipeline.stages),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pipeline)?),
        OutputFormat::Quiet => {}
    }
    Ok(())
}

fn print_stages_table(pipeline: &str, stages: &[PipelineStage]) {
    println!("{}", style(pipeline).bold());
    println!("{:<6} {:<14} {}", "ORDER", "STAGE", "WORKSPACE");
    for stage in stages {
        let workspace = stage
            .workspace_name
            .as_deref()
            .or(stage.workspace_id.as_deref())
            .unwrap_or("-");
        println!("{:<6} {:<14} {}", stage.order, stage.display_name, workspace);
    }
}

// ============================================================================
// rollback
// ============================================================================

fn run_rollback(
    checkpoint: &Path,
    stop_on_error: bool,
    config: Option<&Path>,
    fab_bin: &str,
    format: OutputFormat,
) -> Result<()> {
    let ctx = AppContext::from_settings(load_settings(config)?)?;
    let mut state = DeploymentState::resume(checkpoint)?;
    let executor = FabExecutor::new(fab_bin);
    ctx.tokens()
        .ensure_fresh_auth(&executor, ctx.settings().auth.secondary_max_age())?;

    let recorded = state.len();
    let report = state.rollback(&executor, stop_on_error);

    match format {
        OutputFormat::Table => {
            println!(
                "Rollback of {} (started {}, {} recorded)",
                state.deployment_id(),
                state.started_at().format("%Y-%m-%d %H:%M:%S UTC"),
                recorded
            );
            print_rollback_lines(&report);
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "deploymentId": state.deployment_id(),
                "recorded": recorded,
                "report": report,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => {
            for error in &report.errors {
                eprintln!("{error}");
            }
        }
    }

    if !report.success() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_rollback_lines(report: &RollbackReport) {
    let mark = if report.success() {
        style("✓").green()
    } else {
        style("⚠").yellow()
    };
    println!(
        "  {mark} Rolled back: {} deleted, {} failed",
        report.deleted, report.failed
    );
    if report.skipped > 0 {
        println!("  • {} item(s) not attempted", report.skipped);
    }
    for error in &report.errors {
        println!("  ⚠ {error}");
    }
}

// ============================================================================
// validate
// ============================================================================

fn run_validate(config: &Path, format: OutputFormat) -> Result<()> {
    let parsed = parse_config(config)?;
    let plan = DeployPlan::from_config(&parsed);
    let phases = plan.phases();

    match format {
        OutputFormat::Table => {
            println!("{} {} is valid", style("✓").green(), config.display());
            println!("  Workspace: {}", plan.workspace.name);
            if let Some(capacity) = &plan.workspace.capacity {
                println!("  Capacity: {capacity}");
            }
            println!(
                "  {} folder(s), {} item(s), {} principal(s)",
                plan.folders.len(),
                plan.items.len(),
                plan.principals.len()
            );
            if let Some(git) = &plan.git {
                println!(
                    "  Git: {} {}/{} ({})",
                    git.provider, git.owner, git.repository, git.branch
                );
            }
            if let Some(pipeline) = &plan.pipeline {
                println!("  Pipeline: {} ({})", pipeline.name, pipeline.stage);
            }
            let phases: Vec<String> = phases.iter().map(ToString::to_string).collect();
            println!("  Phases: {}", phases.join(" → "));
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "path": config.display().to_string(),
                "valid": true,
                "workspace": plan.workspace.name,
                "folders": plan.folders.len(),
                "items": plan.items.len(),
                "principals": plan.principals.len(),
                "phases": phases,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => {}
    }
    Ok(())
}
