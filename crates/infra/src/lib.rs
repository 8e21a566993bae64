//! Infrastructure layer: Postgres, Redis, the metadata provider client, workers, config.

pub mod book_store;
pub mod config;
pub mod metadata;
pub mod transport;
pub mod workers;

pub use book_store::{InMemoryBookStore, PostgresBookStore};
pub use config::{ConfigError, DatabaseConfig, SyncConfig};
pub use metadata::{OpenLibraryClient, OpenLibraryConfig, RetryPolicy};
pub use transport::StreamsConfig;
#[cfg(feature = "redis")]
pub use transport::{RedisStreamsError, RedisStreamsTransport};
pub use workers::{SyncWorker, SyncWorkerConfig, WorkerHandle, WorkerStats};
