//! Tag configuration replication engine CLI.
//!
//! A thin shim wiring [`tagconf_replicate::cli`] argument parsing into
//! [`tagconf_replicate::orchestrator::Orchestrator`] — it owns no pipeline
//! logic itself, the way the teacher's `main.rs` owns no database logic and
//! only wires `Database`/`ToolHandler` together.

use clap::Parser;
use std::path::Path;
use tagconf_replicate::cli::{Cli, Command, replicate, validate};
use tagconf_replicate::config::ReplicationConfig;
use tagconf_replicate::logging::{self, Logger};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose, &cli.log);
    let logger = Logger::new();

    let config = ReplicationConfig::load_or_default(cli.config.as_deref().map(Path::new));

    let success = match &cli.command {
        Command::Replicate(args) => match replicate::run(args, config, &logger).await {
            Ok(success) => success,
            Err(err) => {
                eprintln!("error: {err:#}");
                false
            }
        },
        Command::Validate(args) => match validate::run(args) {
            Ok(passed) => passed,
            Err(err) => {
                eprintln!("error: {err:#}");
                false
            }
        },
    };

    std::process::exit(if success { 0 } else { 1 });
}
