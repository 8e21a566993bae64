//! Consumer loop: transport → handler → ack/release.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shelfsync_events::{Message, MessageHandler, MessageTransport};

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncWorkerConfig {
    /// Prefix for consumer names and logs
    pub name: String,
    /// Number of concurrent consumers
    pub concurrency: usize,
    /// Longest a consumer waits for a delivery before re-checking for shutdown
    pub poll_interval: Duration,
    /// Pause after a transport error
    pub error_backoff: Duration,
}

impl Default for SyncWorkerConfig {
    fn default() -> Self {
        Self {
            name: format!("book-sync-{}", Uuid::now_v7()),
            concurrency: 4,
            poll_interval: Duration::from_millis(250),
            error_backoff: Duration::from_secs(1),
        }
    }
}

impl SyncWorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Worker pool runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Deliveries handed to the handler
    pub messages_received: u64,
    /// Handler returned `Ok` and the delivery was acknowledged
    pub messages_acknowledged: u64,
    /// Handler returned `Err` and the delivery was released
    pub messages_released: u64,
    /// Failed receive/ack/release calls
    pub transport_errors: u64,
    pub current_running: usize,
    pub uptime_secs: u64,
}

/// Handle to control a running worker pool.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
    started: Instant,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for every consumer to stop.
    ///
    /// A delivery being handled when shutdown is requested is finished first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "sync consumer task failed");
            }
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> WorkerStats {
        let mut snapshot = self
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        snapshot.uptime_secs = self.started.elapsed().as_secs();
        snapshot
    }
}

/// Runs `concurrency` consumers over one transport and one handler.
///
/// - `Ok` from the handler acknowledges the delivery (whatever the outcome)
/// - `Err` releases it, leaving redelivery and dead-lettering to the transport
/// - The handler must be idempotent (at-least-once delivery)
#[derive(Debug)]
pub struct SyncWorker;

impl SyncWorker {
    /// Spawn the consumer tasks on the current tokio runtime.
    pub fn spawn<M, T, H>(config: SyncWorkerConfig, transport: Arc<T>, handler: Arc<H>) -> WorkerHandle
    where
        M: Message,
        T: MessageTransport<M> + 'static,
        H: MessageHandler<M> + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(WorkerStats::default()));

        let joins = (0..config.concurrency.max(1))
            .map(|i| {
                let consumer = Consumer {
                    name: format!("{}-{}", config.name, i),
                    poll_interval: config.poll_interval,
                    error_backoff: config.error_backoff,
                    transport: transport.clone(),
                    handler: handler.clone(),
                    stats: stats.clone(),
                };
                tokio::spawn(consumer.run::<M>(shutdown_rx.clone()))
            })
            .collect();

        info!(worker = %config.name, concurrency = config.concurrency.max(1), "sync worker started");

        WorkerHandle {
            shutdown: shutdown_tx,
            joins,
            stats,
            started: Instant::now(),
        }
    }
}

struct Consumer<T, H> {
    name: String,
    poll_interval: Duration,
    error_backoff: Duration,
    transport: Arc<T>,
    handler: Arc<H>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl<T, H> Consumer<T, H> {
    fn record(&self, update: impl FnOnce(&mut WorkerStats)) {
        if let Ok(mut s) = self.stats.lock() {
            update(&mut s);
        }
    }

    async fn run<M>(self, mut shutdown: watch::Receiver<bool>)
    where
        M: Message,
        T: MessageTransport<M>,
        H: MessageHandler<M>,
    {
        let transport: &T = &self.transport;
        let handler: &H = &self.handler;
        debug!(consumer = %self.name, "consumer started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            match transport.receive(&self.name, self.poll_interval).await {
                Ok(Some(delivery)) => {
                    self.record(|s| {
                        s.messages_received += 1;
                        s.current_running += 1;
                    });

                    let result = handler.handle(delivery.payload().clone()).await;

                    self.record(|s| s.current_running = s.current_running.saturating_sub(1));

                    match result {
                        Ok(outcome) => {
                            debug!(
                                consumer = %self.name,
                                delivery_id = %delivery.id(),
                                outcome = ?outcome,
                                "message handled"
                            );
                            match transport.ack(&delivery).await {
                                Ok(()) => self.record(|s| s.messages_acknowledged += 1),
                                Err(e) => {
                                    error!(consumer = %self.name, delivery_id = %delivery.id(), error = %e, "ack failed");
                                    self.record(|s| s.transport_errors += 1);
                                }
                            }
                        }
                        Err(err) => {
                            let delivery_id = delivery.id().clone();
                            warn!(
                                consumer = %self.name,
                                delivery_id = %delivery_id,
                                attempt = delivery.attempt(),
                                error = %err,
                                "message handling failed, releasing"
                            );
                            match transport.release(delivery, &err.to_string()).await {
                                Ok(()) => self.record(|s| s.messages_released += 1),
                                Err(e) => {
                                    error!(consumer = %self.name, delivery_id = %delivery_id, error = %e, "release failed");
                                    self.record(|s| s.transport_errors += 1);
                                }
                            }
                        }
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    error!(consumer = %self.name, error = %e, "failed to receive");
                    self.record(|s| s.transport_errors += 1);
                    tokio::select! {
                        _ = tokio::time::sleep(self.error_backoff) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        debug!(consumer = %self.name, "consumer stopped");
    }
}
