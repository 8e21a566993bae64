//! Redis Streams transport (durable, at-least-once delivery).
//!
//! - **Stream**: one entry per request, fields `message_type` + `payload` (JSON)
//! - **Consumer group**: all workers share one group; each entry goes to one consumer
//! - **Redelivery**: an unacknowledged entry idle for longer than the visibility
//!   timeout is claimed (XCLAIM) by the next consumer that asks
//! - **Dead-letter stream**: entries released after `max_deliveries`, and entries
//!   that cannot be decoded, are copied to the DLQ and acknowledged

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamRangeReply, StreamReadOptions,
    StreamReadReply,
};
use tracing::{debug, instrument, warn};

use shelfsync_events::{DeadLetter, Delivery, DeliveryId, Message, MessageTransport};

use super::StreamsConfig;

/// Pending entries inspected per reclaim pass.
const RECLAIM_BATCH: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum RedisStreamsError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Consumer group error: {0}")]
    ConsumerGroup(String),
}

fn command_error(command: &str) -> impl FnOnce(redis::RedisError) -> RedisStreamsError + '_ {
    move |e| RedisStreamsError::Command(format!("{} failed: {}", command, e))
}

/// An entry read from the stream before decoding.
struct RawEntry {
    id: String,
    attempt: u32,
    payload: Option<String>,
}

#[derive(Debug)]
pub struct RedisStreamsTransport<M> {
    client: Arc<redis::Client>,
    config: StreamsConfig,
    _message: PhantomData<fn() -> M>,
}

impl<M> Clone for RedisStreamsTransport<M> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.clone(),
            _message: PhantomData,
        }
    }
}

impl<M: Message> RedisStreamsTransport<M> {
    /// Open a client for `redis_url` and make sure the consumer group exists.
    pub async fn connect(
        redis_url: impl AsRef<str>,
        config: StreamsConfig,
    ) -> Result<Self, RedisStreamsError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))?;

        let transport = Self {
            client: Arc::new(client),
            config,
            _message: PhantomData,
        };
        transport.ensure_consumer_group().await?;
        Ok(transport)
    }

    pub fn config(&self) -> &StreamsConfig {
        &self.config
    }

    /// Create the consumer group (and the stream) if missing.
    pub async fn ensure_consumer_group(&self) -> Result<(), RedisStreamsError> {
        let mut conn = self.connection().await?;

        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.config.stream_key, &self.config.group, "0")
            .await;

        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(RedisStreamsError::ConsumerGroup(e.to_string())),
        }
    }

    /// Most recent dead letters, oldest first.
    pub async fn dead_letters(&self, count: usize) -> Result<Vec<DeadLetter>, RedisStreamsError> {
        let mut conn = self.connection().await?;
        let reply: StreamRangeReply = conn
            .xrevrange_count(&self.config.dlq_key, "+", "-", count)
            .await
            .map_err(command_error("XREVRANGE"))?;

        let mut letters: Vec<DeadLetter> = reply.ids.iter().map(dead_letter_from_entry).collect();
        letters.reverse();
        Ok(letters)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, RedisStreamsError> {
        self.client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))
    }

    /// Claim one entry whose delivery went unacknowledged past the visibility timeout.
    async fn reclaim(
        &self,
        conn: &mut MultiplexedConnection,
        consumer: &str,
    ) -> Result<Option<RawEntry>, RedisStreamsError> {
        let min_idle_ms = self.config.visibility_timeout.as_millis() as usize;

        let pending: StreamPendingCountReply = conn
            .xpending_count(&self.config.stream_key, &self.config.group, "-", "+", RECLAIM_BATCH)
            .await
            .map_err(command_error("XPENDING"))?;

        for candidate in pending.ids {
            if candidate.last_delivered_ms < min_idle_ms {
                continue;
            }

            let claimed: StreamClaimReply = conn
                .xclaim(
                    &self.config.stream_key,
                    &self.config.group,
                    consumer,
                    min_idle_ms,
                    &[&candidate.id],
                )
                .await
                .map_err(command_error("XCLAIM"))?;

            // Another consumer may have claimed it first.
            if let Some(entry) = claimed.ids.into_iter().next() {
                debug!(
                    consumer,
                    message_id = %entry.id,
                    previous_consumer = %candidate.consumer,
                    "reclaimed idle delivery"
                );
                return Ok(Some(RawEntry {
                    attempt: candidate.times_delivered as u32 + 1,
                    payload: entry.get("payload"),
                    id: entry.id,
                }));
            }
        }

        Ok(None)
    }

    async fn read_new(
        &self,
        conn: &mut MultiplexedConnection,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<RawEntry>, RedisStreamsError> {
        // BLOCK 0 would wait forever.
        let block_ms = (block.as_millis() as usize).max(1);
        let options = StreamReadOptions::default()
            .group(&self.config.group, consumer)
            .count(1)
            .block(block_ms);

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.config.stream_key], &[">"], &options)
            .await
            .map_err(command_error("XREADGROUP"))?;

        let entry = reply
            .into_iter()
            .flat_map(|r| r.keys)
            .flat_map(|k| k.ids)
            .next();

        Ok(entry.map(|entry| RawEntry {
            attempt: 1,
            payload: entry.get("payload"),
            id: entry.id,
        }))
    }

    /// Copy an entry to the dead-letter stream and acknowledge the original.
    async fn dead_letter(
        &self,
        conn: &mut MultiplexedConnection,
        id: &str,
        attempts: u32,
        reason: &str,
        payload: &str,
    ) -> Result<(), RedisStreamsError> {
        let failed_at = Utc::now().to_rfc3339();
        let attempts = attempts.to_string();
        let _: String = conn
            .xadd(
                &self.config.dlq_key,
                "*",
                &[
                    ("original_message_id", id),
                    ("message_type", M::MESSAGE_TYPE),
                    ("attempts", attempts.as_str()),
                    ("reason", reason),
                    ("failed_at", failed_at.as_str()),
                    ("payload", payload),
                ],
            )
            .await
            .map_err(command_error("DLQ XADD"))?;

        let _: i64 = conn
            .xack(&self.config.stream_key, &self.config.group, &[id])
            .await
            .map_err(command_error("XACK"))?;

        warn!(
            message_id = %id,
            attempts = %attempts,
            reason,
            "message sent to dead-letter queue"
        );
        Ok(())
    }

    /// Turn a raw entry into a delivery, dead-lettering it when that is impossible
    /// or when its delivery budget is already spent.
    async fn decode(
        &self,
        conn: &mut MultiplexedConnection,
        raw: RawEntry,
    ) -> Result<Option<Delivery<M>>, RedisStreamsError> {
        let payload = raw.payload.unwrap_or_default();

        if raw.attempt > self.config.max_deliveries {
            self.dead_letter(
                conn,
                &raw.id,
                raw.attempt - 1,
                "delivery budget exhausted without acknowledgement",
                &payload,
            )
            .await?;
            return Ok(None);
        }

        match serde_json::from_str::<M>(&payload) {
            Ok(message) => Ok(Some(Delivery::new(
                DeliveryId::new(raw.id),
                raw.attempt,
                message,
            ))),
            Err(e) => {
                let reason = format!("undecodable payload: {}", e);
                self.dead_letter(conn, &raw.id, raw.attempt, &reason, &payload)
                    .await?;
                Ok(None)
            }
        }
    }
}

fn dead_letter_from_entry(entry: &StreamId) -> DeadLetter {
    let field = |name: &str| entry.get::<String>(name).unwrap_or_default();

    DeadLetter {
        delivery_id: DeliveryId::new(field("original_message_id")),
        attempts: field("attempts").parse().unwrap_or(0),
        reason: field("reason"),
        failed_at: DateTime::parse_from_rfc3339(&field("failed_at"))
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        payload: field("payload"),
    }
}

#[async_trait]
impl<M: Message> MessageTransport<M> for RedisStreamsTransport<M> {
    type Error = RedisStreamsError;

    #[instrument(skip(self, message), fields(stream_key = %self.config.stream_key), err)]
    async fn publish(&self, message: &M) -> Result<(), Self::Error> {
        let payload = serde_json::to_string(message)
            .map_err(|e| RedisStreamsError::Serialization(e.to_string()))?;

        let mut conn = self.connection().await?;
        let _: String = conn
            .xadd(
                &self.config.stream_key,
                "*",
                &[("message_type", M::MESSAGE_TYPE), ("payload", payload.as_str())],
            )
            .await
            .map_err(command_error("XADD"))?;
        Ok(())
    }

    async fn receive(
        &self,
        consumer: &str,
        max_wait: Duration,
    ) -> Result<Option<Delivery<M>>, Self::Error> {
        let deadline = tokio::time::Instant::now() + max_wait;
        let mut conn = self.connection().await?;

        loop {
            let raw = match self.reclaim(&mut conn, consumer).await? {
                Some(raw) => Some(raw),
                None => {
                    let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                    self.read_new(&mut conn, consumer, remaining).await?
                }
            };

            let Some(raw) = raw else {
                return Ok(None);
            };

            if let Some(delivery) = self.decode(&mut conn, raw).await? {
                return Ok(Some(delivery));
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery<M>) -> Result<(), Self::Error> {
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .xack(
                &self.config.stream_key,
                &self.config.group,
                &[delivery.id().as_str()],
            )
            .await
            .map_err(command_error("XACK"))?;
        Ok(())
    }

    /// Dead-letter once the delivery budget is spent; otherwise leave the entry
    /// pending so it is claimed again after the visibility timeout.
    async fn release(&self, delivery: Delivery<M>, reason: &str) -> Result<(), Self::Error> {
        if delivery.attempt() < self.config.max_deliveries {
            debug!(
                message_id = %delivery.id(),
                attempt = delivery.attempt(),
                reason,
                "delivery released for redelivery"
            );
            return Ok(());
        }

        let payload = serde_json::to_string(delivery.payload())
            .map_err(|e| RedisStreamsError::Serialization(e.to_string()))?;
        let mut conn = self.connection().await?;
        self.dead_letter(
            &mut conn,
            delivery.id().as_str(),
            delivery.attempt(),
            reason,
            &payload,
        )
        .await
    }
}
