//! Outbound metadata provider clients.
//!
//! `OpenLibraryClient` implements `shelfsync_catalog::MetadataClient` over HTTP,
//! with per-attempt timeouts and a bounded `RetryPolicy`.

pub mod open_library;
mod payload;
pub mod retry;

pub use open_library::{OpenLibraryClient, OpenLibraryConfig};
pub use retry::RetryPolicy;
