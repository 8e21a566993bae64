use std::sync::Arc;

use async_trait::async_trait;

use crate::message::Message;

/// Processes one decoded message (consumer-side abstraction).
///
/// `Ok` means the message is done with, whatever the outcome (including a
/// deliberate drop); the consumer loop acknowledges it. `Err` means processing
/// failed and the transport's redelivery policy should decide what happens next.
///
/// Handlers must be idempotent: the same message can be handled more than once.
#[async_trait]
pub trait MessageHandler<M: Message>: Send + Sync {
    type Outcome: core::fmt::Debug + Send;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn handle(&self, message: M) -> Result<Self::Outcome, Self::Error>;
}

#[async_trait]
impl<M, H> MessageHandler<M> for Arc<H>
where
    M: Message,
    H: MessageHandler<M> + ?Sized,
{
    type Outcome = H::Outcome;
    type Error = H::Error;

    async fn handle(&self, message: M) -> Result<Self::Outcome, Self::Error> {
        (**self).handle(message).await
    }
}
