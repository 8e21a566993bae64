//! Process wiring: configuration → adapters → listener → worker pool.

pub mod cli;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use shelfsync_catalog::SynchronizationListener;
use shelfsync_events::{MessageTransport, SynchronizationRequest};
use shelfsync_infra::{OpenLibraryClient, PostgresBookStore, RedisStreamsTransport, SyncConfig, SyncWorker};

async fn connect_transport(
    config: &SyncConfig,
) -> anyhow::Result<RedisStreamsTransport<SynchronizationRequest>> {
    RedisStreamsTransport::connect(&config.redis_url, config.streams.clone())
        .await
        .with_context(|| format!("failed to connect to Redis at {}", config.redis_url))
}

/// Consume synchronization requests until Ctrl-C.
pub async fn run(config: SyncConfig) -> anyhow::Result<()> {
    let database_url = config.database.require_url()?;
    let store = PostgresBookStore::connect(database_url, config.database.max_connections)
        .await
        .context("failed to connect to Postgres")?;
    store
        .ensure_schema()
        .await
        .context("failed to prepare the books table")?;

    let client = OpenLibraryClient::new(config.open_library.clone())
        .context("invalid metadata provider configuration")?;
    let transport = Arc::new(connect_transport(&config).await?);
    let listener = Arc::new(SynchronizationListener::new(client, store));

    let handle = SyncWorker::spawn(config.worker.clone(), transport, listener);
    info!(
        stream_key = %config.streams.stream_key,
        group = %config.streams.group,
        workers = config.worker.concurrency,
        "book synchronization running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutdown requested, draining in-flight deliveries");
    let stats = handle.stats();
    handle.shutdown().await;
    info!(
        received = stats.messages_received,
        acknowledged = stats.messages_acknowledged,
        released = stats.messages_released,
        uptime_secs = stats.uptime_secs,
        "book synchronization stopped"
    );
    Ok(())
}

/// Enqueue one synchronization request per ISBN.
pub async fn publish(config: &SyncConfig, isbns: &[String]) -> anyhow::Result<()> {
    if isbns.is_empty() {
        anyhow::bail!("nothing to publish: pass at least one ISBN");
    }

    let transport = connect_transport(config).await?;
    for isbn in isbns {
        transport
            .publish(&SynchronizationRequest::new(isbn.as_str()))
            .await
            .with_context(|| format!("failed to publish {}", isbn))?;
        info!(isbn = %isbn, "synchronization requested");
    }
    Ok(())
}
