use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport-assigned identifier of one delivery (e.g. a Redis stream entry ID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(String);

impl DeliveryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A decoded message handed to a consumer, plus delivery metadata.
///
/// Notes:
/// - Delivery is **at-least-once**: the same message can come back with a
///   higher `attempt` if it was released or never acknowledged.
/// - `attempt` is 1-based (first delivery is attempt 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery<M> {
    id: DeliveryId,
    attempt: u32,
    payload: M,
}

impl<M> Delivery<M> {
    pub fn new(id: DeliveryId, attempt: u32, payload: M) -> Self {
        Self {
            id,
            attempt,
            payload,
        }
    }

    pub fn id(&self) -> &DeliveryId {
        &self.id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn payload(&self) -> &M {
        &self.payload
    }

    pub fn into_payload(self) -> M {
        self.payload
    }
}

/// A message a transport gave up on.
///
/// Either it exceeded the max-delivery count or it could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub delivery_id: DeliveryId,
    pub attempts: u32,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
    /// Raw wire payload, kept for inspection/replay.
    pub payload: String,
}
