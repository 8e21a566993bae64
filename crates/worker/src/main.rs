use clap::Parser;

use shelfsync_infra::SyncConfig;
use shelfsync_worker::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    shelfsync_observability::init();

    let config = SyncConfig::from_env()?;

    match cli.command {
        Some(Command::Publish { isbns }) => shelfsync_worker::publish(&config, &isbns).await,
        None => shelfsync_worker::run(config).await,
    }
}
