//! In-memory transport for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::envelope::{DeadLetter, Delivery, DeliveryId};
use crate::message::Message;
use crate::transport::MessageTransport;

/// Default max deliveries before a message is dead-lettered.
const DEFAULT_MAX_DELIVERIES: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum InMemoryTransportError {
    /// Internal lock poisoning.
    #[error("in-memory transport lock poisoned")]
    Poisoned,

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Ack/release for a delivery that is not in flight.
    #[error("unknown delivery: {0}")]
    UnknownDelivery(DeliveryId),
}

#[derive(Debug)]
struct Entry {
    id: DeliveryId,
    raw: String,
    /// Times this entry has been handed to a consumer.
    deliveries: u32,
}

#[derive(Debug, Default)]
struct State {
    ready: VecDeque<Entry>,
    in_flight: HashMap<DeliveryId, Entry>,
    dead_letters: Vec<DeadLetter>,
    acknowledged: u64,
}

/// In-memory queue with ack/release semantics.
///
/// - No IO
/// - Released deliveries go to the back of the queue
/// - Entries reaching `max_deliveries` (or undecodable ones) are dead-lettered
/// - No visibility timeout: an unacknowledged delivery stays in flight until
///   acked or released
#[derive(Debug)]
pub struct InMemoryTransport<M> {
    state: Mutex<State>,
    notify: Notify,
    max_deliveries: u32,
    _message: PhantomData<fn() -> M>,
}

impl<M> InMemoryTransport<M> {
    pub fn new() -> Self {
        Self::with_max_deliveries(DEFAULT_MAX_DELIVERIES)
    }

    pub fn with_max_deliveries(max_deliveries: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            max_deliveries: max_deliveries.max(1),
            _message: PhantomData,
        }
    }

    /// Enqueue a raw wire payload (bypasses serialization).
    pub fn publish_raw(&self, raw: impl Into<String>) -> Result<DeliveryId, InMemoryTransportError> {
        let id = DeliveryId::new(Uuid::now_v7().to_string());
        {
            let mut state = self.lock()?;
            state.ready.push_back(Entry {
                id: id.clone(),
                raw: raw.into(),
                deliveries: 0,
            });
        }
        self.notify.notify_waiters();
        Ok(id)
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock()
            .map(|s| s.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Messages waiting to be delivered.
    pub fn ready_len(&self) -> usize {
        self.lock().map(|s| s.ready.len()).unwrap_or(0)
    }

    /// Deliveries handed out but neither acked nor released.
    pub fn in_flight_len(&self) -> usize {
        self.lock().map(|s| s.in_flight.len()).unwrap_or(0)
    }

    pub fn acknowledged(&self) -> u64 {
        self.lock().map(|s| s.acknowledged).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, InMemoryTransportError> {
        self.state.lock().map_err(|_| InMemoryTransportError::Poisoned)
    }
}

impl<M> Default for InMemoryTransport<M> {
    fn default() -> Self {
        Self::new()
    }
}

fn dead_letter(entry: Entry, reason: impl Into<String>) -> DeadLetter {
    DeadLetter {
        delivery_id: entry.id,
        attempts: entry.deliveries,
        reason: reason.into(),
        failed_at: Utc::now(),
        payload: entry.raw,
    }
}

impl<M: Message> InMemoryTransport<M> {
    fn try_take(&self, consumer: &str) -> Result<Option<Delivery<M>>, InMemoryTransportError> {
        let mut state = self.lock()?;

        while let Some(mut entry) = state.ready.pop_front() {
            entry.deliveries += 1;

            match serde_json::from_str::<M>(&entry.raw) {
                Ok(payload) => {
                    debug!(
                        consumer,
                        delivery_id = %entry.id,
                        attempt = entry.deliveries,
                        "delivering message"
                    );
                    let delivery = Delivery::new(entry.id.clone(), entry.deliveries, payload);
                    state.in_flight.insert(entry.id.clone(), entry);
                    return Ok(Some(delivery));
                }
                Err(e) => {
                    warn!(
                        delivery_id = %entry.id,
                        message_type = M::MESSAGE_TYPE,
                        error = %e,
                        "undecodable message dead-lettered"
                    );
                    let letter = dead_letter(entry, format!("undecodable payload: {}", e));
                    state.dead_letters.push(letter);
                }
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl<M: Message> MessageTransport<M> for InMemoryTransport<M> {
    type Error = InMemoryTransportError;

    async fn publish(&self, message: &M) -> Result<(), Self::Error> {
        let raw = serde_json::to_string(message)
            .map_err(|e| InMemoryTransportError::Serialization(e.to_string()))?;
        self.publish_raw(raw)?;
        Ok(())
    }

    async fn receive(
        &self,
        consumer: &str,
        max_wait: Duration,
    ) -> Result<Option<Delivery<M>>, Self::Error> {
        let deadline = tokio::time::Instant::now() + max_wait;

        loop {
            // Register interest before checking the queue so a publish between the
            // check and the wait is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_take(consumer)? {
                return Ok(Some(delivery));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery<M>) -> Result<(), Self::Error> {
        let mut state = self.lock()?;
        state
            .in_flight
            .remove(delivery.id())
            .ok_or_else(|| InMemoryTransportError::UnknownDelivery(delivery.id().clone()))?;
        state.acknowledged += 1;
        Ok(())
    }

    async fn release(&self, delivery: Delivery<M>, reason: &str) -> Result<(), Self::Error> {
        {
            let mut state = self.lock()?;
            let entry = state
                .in_flight
                .remove(delivery.id())
                .ok_or_else(|| InMemoryTransportError::UnknownDelivery(delivery.id().clone()))?;

            if entry.deliveries >= self.max_deliveries {
                warn!(
                    delivery_id = %entry.id,
                    attempts = entry.deliveries,
                    reason,
                    "message dead-lettered after max deliveries"
                );
                let letter = dead_letter(entry, reason);
                state.dead_letters.push(letter);
                return Ok(());
            }

            state.ready.push_back(entry);
        }

        self.notify.notify_waiters();
        Ok(())
    }
}
