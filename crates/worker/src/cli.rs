//! Command-line arguments.

use clap::{Parser, Subcommand};

/// Book metadata synchronization worker.
///
/// Without a subcommand, consumes synchronization requests until Ctrl-C.
/// Settings come from the environment (`DATABASE_URL`, `REDIS_URL`, ...).
#[derive(Debug, Parser)]
#[command(name = "shelfsync-worker")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Queue synchronization requests for the given ISBNs
    Publish {
        #[arg(required = true)]
        isbns: Vec<String>,
    },
}
