//! converge: validate specs, report drift and manage RDS DB snapshots
//!
//! `validate` and `diff` work offline on JSON field files. The `snapshot`
//! commands talk to RDS through the reconciler, waiting for each operation
//! to settle before returning.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use converge_common::{FieldValue, Fields, RemoteError, ResourceHandle, ResourceKind, ResourceSpec};
use converge_engine::aws::{AwsContext, RdsSnapshotControlPlane};
use converge_engine::differ::{self, DriftRecord};
use converge_engine::resources::{DbSnapshot, ResourceDefinition, SchemaRegistry};
use converge_engine::{Plan, Reconciler, ReconcilerConfig, run_plans};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "converge")]
#[command(about = "Reconcile eventually-consistent cloud resources")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a JSON field file against a kind's schema
    Validate {
        /// Resource kind (db_snapshot, job_queue, qbusiness_retriever, qbusiness_user)
        #[arg(long, value_parser = parse_kind)]
        kind: ResourceKind,

        /// JSON object of desired fields
        #[arg(long)]
        spec: PathBuf,
    },

    /// Compare desired fields against observed fields
    Diff {
        #[arg(long, value_parser = parse_kind)]
        kind: ResourceKind,

        /// JSON object of desired fields
        #[arg(long)]
        desired: PathBuf,

        /// JSON object of observed fields
        #[arg(long)]
        observed: PathBuf,

        /// Print drift records as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Manage RDS DB snapshots
    Snapshot {
        #[command(flatten)]
        aws: AwsArgs,

        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(clap::Args, Debug)]
struct AwsArgs {
    /// AWS region
    #[arg(long, global = true, default_value = "us-east-2")]
    region: String,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Reconciler configuration file (TOML)
    #[arg(long, global = true, env = "CONVERGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum SnapshotAction {
    /// Snapshot a DB instance and wait until the snapshot is available
    Create {
        /// DB instance to snapshot
        #[arg(long)]
        instance: String,

        /// Identifier for the new snapshot
        #[arg(long)]
        snapshot: String,

        /// Account allowed to restore the snapshot (repeatable, or "all")
        #[arg(long = "share")]
        shared_accounts: Vec<String>,
    },

    /// Show a snapshot's current state
    Read {
        #[arg(long)]
        snapshot: String,
    },

    /// Set the accounts allowed to restore a snapshot
    Share {
        #[arg(long)]
        snapshot: String,

        /// Accounts to share with; none unshares completely
        #[arg(long = "account")]
        accounts: Vec<String>,
    },

    /// Delete snapshots and wait until they are gone
    Delete {
        /// Snapshot identifiers
        #[arg(required = true)]
        snapshots: Vec<String>,
    },
}

fn parse_kind(s: &str) -> Result<ResourceKind, String> {
    ResourceKind::parse(s).ok_or_else(|| format!("unknown resource kind: {s}"))
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print the error chain, plus a hint when the remote error has one
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut hint = None;
    for cause in e.chain().skip(1) {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        if let Some(remote) = cause.downcast_ref::<RemoteError>() {
            hint = hint.or(remote.suggestion());
        }
    }
    if let Some(hint) = hint {
        let _ = writeln!(stderr, "\n\x1b[2mHint:\x1b[0m {hint}");
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(
            "converge=info,converge_engine=info,aws_config=warn,aws_smithy_runtime=warn",
        )
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_logging();

    match args.command {
        Command::Validate { kind, spec } => handle_validate(kind, &spec),
        Command::Diff {
            kind,
            desired,
            observed,
            json,
        } => handle_diff(kind, &desired, &observed, json),
        Command::Snapshot { aws, action } => handle_snapshot(aws, action).await,
    }
}

fn read_fields(path: &Path) -> Result<Fields> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON object of fields", path.display()))
}

fn handle_validate(kind: ResourceKind, path: &Path) -> Result<()> {
    let fields = read_fields(path)?;
    let registry = SchemaRegistry::builtin();
    let schema = registry
        .get(kind)
        .with_context(|| format!("No schema for {kind}"))?;

    let problems = schema.check(&fields);
    if problems.is_empty() {
        println!("{} is a valid {kind} spec", path.display());
        return Ok(());
    }
    for problem in &problems {
        println!("  - {problem}");
    }
    anyhow::bail!("{} has {} problem(s)", path.display(), problems.len())
}

fn handle_diff(kind: ResourceKind, desired: &Path, observed: &Path, json: bool) -> Result<()> {
    let desired = read_fields(desired)?;
    let observed = read_fields(observed)?;
    let registry = SchemaRegistry::builtin();
    let schema = registry
        .get(kind)
        .with_context(|| format!("No schema for {kind}"))?;

    let diff = differ::diff(schema, &desired, &observed);
    let records = differ::drift(schema, &desired, &observed);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No drift");
    } else {
        print_drift_table(&records);
        if diff.requires_replacement() {
            println!("\nImmutable fields changed; the resource must be replaced.");
        }
    }
    if !diff.reordered.is_empty() {
        let names: Vec<_> = diff.reordered.iter().map(String::as_str).collect();
        println!("Reordered only (not drift): {}", names.join(", "));
    }
    Ok(())
}

fn print_drift_table(records: &[DriftRecord]) {
    fn show(value: &Option<FieldValue>) -> String {
        value
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string)
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Field"),
            Cell::new("Desired"),
            Cell::new("Observed"),
            Cell::new("Change"),
        ]);
    for record in records {
        table.add_row(vec![
            Cell::new(&record.field),
            Cell::new(show(&record.desired)),
            Cell::new(show(&record.observed)),
            Cell::new(if record.immutable { "replace" } else { "update" }),
        ]);
    }
    println!("{table}");
}

/// Cancel in-flight waits on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
    cancel
}

async fn handle_snapshot(aws: AwsArgs, action: SnapshotAction) -> Result<()> {
    let config = match &aws.config {
        Some(path) => ReconcilerConfig::load(path)?,
        None => ReconcilerConfig::default(),
    };
    if let Some(profile) = &aws.profile {
        info!(profile = %profile, "Using AWS profile");
    }
    let ctx = AwsContext::with_profile(&aws.region, aws.profile.as_deref()).await;
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(RdsSnapshotControlPlane::from_context(&ctx)),
        config,
    ));
    let cancel = cancel_on_ctrl_c();

    match action {
        SnapshotAction::Create {
            instance,
            snapshot,
            shared_accounts,
        } => {
            let spec = DbSnapshot {
                db_instance_identifier: instance,
                db_snapshot_identifier: snapshot,
                shared_accounts: shared_accounts.into_iter().collect(),
            }
            .to_spec();
            let (handle, observed) = reconciler.create(&spec, &cancel).await?;
            info!(%handle, status = %observed.status, "Snapshot ready");
            println!("{}", serde_json::to_string_pretty(&observed)?);
        }

        SnapshotAction::Read { snapshot } => {
            let handle = ResourceHandle::new(ResourceKind::DbSnapshot, snapshot);
            let observed = reconciler.read(&handle).await?;
            println!("{}", serde_json::to_string_pretty(&observed)?);
        }

        SnapshotAction::Share { snapshot, accounts } => {
            let handle = ResourceHandle::new(ResourceKind::DbSnapshot, snapshot);
            let observed = reconciler.read(&handle).await?;
            let mut fields = DbSnapshot::schema().project(&observed.fields);
            fields.insert(
                "shared_accounts".into(),
                FieldValue::string_list(accounts.iter().map(String::as_str)),
            );
            let desired = ResourceSpec::new(ResourceKind::DbSnapshot, fields);
            let updated = reconciler
                .update(&handle, &desired, &observed, &cancel)
                .await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }

        SnapshotAction::Delete { snapshots } => {
            let plans = snapshots
                .into_iter()
                .map(|id| Plan::Delete(ResourceHandle::new(ResourceKind::DbSnapshot, id)))
                .collect();
            let results = run_plans(reconciler, plans, cancel).await;
            let failed = results.iter().filter(|r| !r.is_success()).count();
            for result in &results {
                match &result.outcome {
                    Ok(_) => println!("{}: done", result.label),
                    Err(e) => println!("{}: {e}", result.label),
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed} of {} deletions failed", results.len());
            }
        }
    }

    Ok(())
}
