//! Message mechanics for the synchronization pipeline.
//!
//! This crate is transport-agnostic: it defines the inbound message type, the
//! delivery envelope, the transport and handler seams, and an in-memory transport
//! for tests/dev. Broker-backed transports live in `shelfsync-infra`.

pub mod envelope;
pub mod handler;
pub mod in_memory;
pub mod message;
pub mod transport;

pub use envelope::{DeadLetter, Delivery, DeliveryId};
pub use handler::MessageHandler;
pub use in_memory::{InMemoryTransport, InMemoryTransportError};
pub use message::{Message, SynchronizationRequest};
pub use transport::MessageTransport;
