//! Message transport abstraction (mechanics only).
//!
//! A transport is the pipeline's only link to the outside world: it hands decoded
//! messages to consumers and learns, per delivery, whether processing finished.
//!
//! ## Delivery Guarantees
//!
//! Transports provide **at-least-once delivery**:
//! - A delivery that is released, or never acknowledged within the transport's
//!   visibility window, is delivered again (possibly to another consumer)
//! - Messages for different keys may be delivered out of order
//! - Consumers must be idempotent
//!
//! ## Redelivery and Dead-Letters
//!
//! Retrying a failed message is the transport's decision, not the consumer's. A
//! consumer reports failure with `release()`; the transport either schedules a
//! redelivery or, once the max-delivery count is reached, moves the message to a
//! dead-letter destination. Payloads that cannot be decoded are dead-lettered
//! immediately and never reach a consumer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::envelope::Delivery;
use crate::message::Message;

/// Queue/topic binding for one message type.
///
/// ## Usage Pattern
///
/// ```ignore
/// loop {
///     match transport.receive("worker-1", Duration::from_millis(250)).await? {
///         Some(delivery) => match handler.handle(delivery.payload().clone()).await {
///             Ok(_) => transport.ack(&delivery).await?,
///             Err(e) => transport.release(delivery, &e.to_string()).await?,
///         },
///         None => continue, // check for shutdown
///     }
/// }
/// ```
///
/// ## Thread Safety
///
/// Implementations are `Send + Sync`; any number of consumers may call `receive`
/// concurrently. Each delivery is handed to exactly one consumer at a time.
#[async_trait]
pub trait MessageTransport<M: Message>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Publish a message to the topic.
    async fn publish(&self, message: &M) -> Result<(), Self::Error>;

    /// Wait up to `max_wait` for the next delivery for `consumer`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn receive(
        &self,
        consumer: &str,
        max_wait: Duration,
    ) -> Result<Option<Delivery<M>>, Self::Error>;

    /// Processing finished; the delivery must not be redelivered.
    async fn ack(&self, delivery: &Delivery<M>) -> Result<(), Self::Error>;

    /// Processing failed; redeliver later or dead-letter per the transport's policy.
    async fn release(&self, delivery: Delivery<M>, reason: &str) -> Result<(), Self::Error>;
}

#[async_trait]
impl<M, T> MessageTransport<M> for Arc<T>
where
    M: Message,
    T: MessageTransport<M> + ?Sized,
{
    type Error = T::Error;

    async fn publish(&self, message: &M) -> Result<(), Self::Error> {
        (**self).publish(message).await
    }

    async fn receive(
        &self,
        consumer: &str,
        max_wait: Duration,
    ) -> Result<Option<Delivery<M>>, Self::Error> {
        (**self).receive(consumer, max_wait).await
    }

    async fn ack(&self, delivery: &Delivery<M>) -> Result<(), Self::Error> {
        (**self).ack(delivery).await
    }

    async fn release(&self, delivery: Delivery<M>, reason: &str) -> Result<(), Self::Error> {
        (**self).release(delivery, reason).await
    }
}
