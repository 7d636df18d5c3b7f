//! `replicate` subcommand: drives one end-to-end replication session
//! between two on-disk workspace snapshots.

use crate::backend::memory::InMemoryBackend;
use crate::config::ReplicationConfig;
use crate::export::Snapshot;
use crate::graph;
use crate::logging::Logger;
use crate::orchestrator::{Orchestrator, ReplicationOptions};
use crate::planner::{self, PlanOptions};
use crate::types::PlanAction;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments for the `replicate` subcommand.
#[derive(Args, Debug)]
pub struct ReplicateArgs {
    /// Path to the source workspace snapshot (JSON, from a prior export).
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Path to the target workspace snapshot (JSON); overwritten in place on success.
    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    /// Skip creating an entity whose name already matches one in the target.
    #[arg(long)]
    pub skip_existing: bool,

    /// Print the creation plan without creating anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Override the Builder's max-retries-on-rate-limit setting.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Override the Builder's fixed inter-request delay, in milliseconds.
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Prefix applied to every created entity's name.
    #[arg(long, default_value = "")]
    pub name_prefix: String,

    /// Suffix applied to every created entity's name.
    #[arg(long, default_value = "")]
    pub name_suffix: String,

    /// Run the post-build Validation Checker and print its report.
    #[arg(long)]
    pub validate: bool,
}

/// Run the `replicate` subcommand: either print the plan (`--dry-run`) or
/// drive a full [`Orchestrator`] session and write the updated target
/// snapshot back to disk.
pub async fn run(args: &ReplicateArgs, mut config: ReplicationConfig, logger: &Logger) -> anyhow::Result<bool> {
    if let Some(max_retries) = args.max_retries {
        config.builder.max_retries = max_retries;
    }
    if let Some(delay_ms) = args.delay_ms {
        config.builder.inter_request_delay_ms = delay_ms;
    }

    let source_snapshot = Snapshot::from_file(&args.source)?;
    let target_snapshot = Snapshot::from_file(&args.target)?;

    if args.dry_run {
        print_plan(args, &source_snapshot.workspace, &target_snapshot.workspace)?;
        return Ok(true);
    }

    let source_backend = Arc::new(InMemoryBackend::from_snapshot(source_snapshot.workspace));
    let target_backend = Arc::new(InMemoryBackend::from_snapshot(target_snapshot.workspace));

    let (sink, mut events) = tokio::sync::mpsc::unbounded_channel();
    let drain = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let orchestrator = Orchestrator::new(source_backend, target_backend.clone(), config).with_events(sink);
    let options = ReplicationOptions {
        skip_existing: args.skip_existing,
        name_prefix: args.name_prefix.clone(),
        name_suffix: args.name_suffix.clone(),
        validate_after_build: args.validate,
        ..Default::default()
    };

    let result = orchestrator.run(format!("cli-{}", now_label()), options).await;
    drop(orchestrator);
    let _ = drain.await;

    logger.info(&format!(
        "replication finished: created={} skipped={} failed={}",
        result.summary.created_count, result.summary.skipped_count, result.summary.failed_count
    ));

    let updated = Snapshot::new(target_backend.to_snapshot());
    std::fs::write(&args.target, updated.to_json_pretty()?)?;

    if let Some(report) = &result.validation_report {
        println!("{}", crate::validate::format_validation_report(report));
    }

    if !result.success {
        for error in &result.errors {
            eprintln!("error: {error}");
        }
    }

    Ok(result.success)
}

fn print_plan(
    args: &ReplicateArgs,
    source: &crate::types::WorkspaceSnapshot,
    target: &crate::types::WorkspaceSnapshot,
) -> anyhow::Result<()> {
    let analysis = graph::analyze(source)?;
    let plan_options = PlanOptions {
        skip_existing: args.skip_existing,
        name_prefix: args.name_prefix.clone(),
        name_suffix: args.name_suffix.clone(),
        ..Default::default()
    };
    let (plan, warnings) = planner::build_plan(&analysis.order, &analysis.edges, target, &plan_options);

    for step in &plan {
        match step.action {
            PlanAction::Create => println!("CREATE {} '{}' (from {})", step.kind, step.new_name, step.source_id),
            PlanAction::Skip => println!(
                "SKIP   {} '{}' (matches {})",
                step.kind,
                step.new_name,
                step.target_id.as_deref().unwrap_or("?")
            ),
        }
    }
    for warning in &warnings.messages {
        println!("warning: {warning}");
    }
    println!(
        "{} steps ({} create, {} skip)",
        plan.len(),
        plan.iter().filter(|s| s.action == PlanAction::Create).count(),
        plan.iter().filter(|s| s.action == PlanAction::Skip).count(),
    );
    Ok(())
}

fn print_event(event: &crate::types::ReplicationEvent) {
    use crate::types::ReplicationEvent::*;
    match event {
        PhaseChanged { phase, .. } => println!("[phase] {phase:?}"),
        EntityCreated { kind, source_id, target_id, .. } => {
            println!("[created] {kind} {source_id} -> {target_id}")
        }
        EntitySkipped { kind, source_id, .. } => println!("[skipped] {kind} {source_id}"),
        EntityFailed { kind, source_id, message, .. } => println!("[failed] {kind} {source_id}: {message}"),
        WorkflowFailed { message, .. } => println!("[workflow-failed] {message}"),
        ProgressUpdated { progress, .. } => println!("[progress] {:.0}%", progress.percentage),
        WorkflowStarted { .. } | WorkflowCompleted { .. } => {}
    }
}

/// A process-relative label distinguishing concurrent CLI runs.
fn now_label() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}
