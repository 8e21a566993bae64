use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// A message that can travel over a `MessageTransport`.
///
/// Messages are encoded as JSON on the wire.
pub trait Message:
    Serialize + DeserializeOwned + Clone + core::fmt::Debug + Send + Sync + 'static
{
    /// Stable message type identifier (e.g. "book.synchronization.requested").
    const MESSAGE_TYPE: &'static str;
}

/// Request to make sure local metadata exists for one ISBN.
///
/// The ISBN is carried raw: validating it is the consumer's job, so that a
/// malformed value is dropped by policy instead of failing decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynchronizationRequest {
    pub isbn: String,
}

impl SynchronizationRequest {
    pub fn new(isbn: impl Into<String>) -> Self {
        Self { isbn: isbn.into() }
    }
}

impl Message for SynchronizationRequest {
    const MESSAGE_TYPE: &'static str = "book.synchronization.requested";
}
