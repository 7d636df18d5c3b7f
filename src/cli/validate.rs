//! `validate` subcommand: a standalone integrity check against a target
//! workspace snapshot, with an optional diff against a second snapshot.

use crate::export::Snapshot;
use crate::export::diff::diff_snapshots;
use crate::validate::integrity_check;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the `validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the target workspace snapshot (JSON) to check.
    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    /// Optional snapshot to diff the target against (e.g. the source export).
    #[arg(long, value_name = "FILE")]
    pub diff_against: Option<PathBuf>,
}

/// Run the integrity check (and optional diff). Returns whether it passed.
pub fn run(args: &ValidateArgs) -> anyhow::Result<bool> {
    let target = Snapshot::from_file(&args.target)?;
    let issues = integrity_check(&target.workspace);

    if issues.is_empty() {
        println!("=== INTEGRITY CHECK PASSED ===");
    } else {
        println!("=== INTEGRITY CHECK FAILED ===");
        for issue in &issues {
            println!(
                "  - [{}] '{}' {:?}: {}",
                issue.kind, issue.name, issue.issue_type, issue.details
            );
        }
    }

    if let Some(other_path) = &args.diff_against {
        let other = Snapshot::from_file(other_path)?;
        let diff = diff_snapshots(&other.workspace, &target.workspace);
        println!();
        print!("{diff}");
    }

    Ok(issues.is_empty())
}
