use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use shelfsync_core::{BookMetadata, Isbn};

/// Why a metadata fetch failed.
///
/// Only `TransientExhausted` describes a fault that might clear up on its own;
/// everything else is permanent for the ISBN in question.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Timeouts / connection failures / 5xx on every attempt.
    #[error("metadata provider still failing after {attempts} attempts: {last_error}")]
    TransientExhausted { attempts: u32, last_error: String },

    /// The provider rejected the request (4xx).
    #[error("metadata provider rejected the request with status {status}")]
    Rejected { status: u16 },

    /// The provider answered, but has no entry for the ISBN.
    #[error("no metadata found for ISBN {isbn}")]
    NotFound { isbn: Isbn },

    /// The response body could not be interpreted as book metadata.
    #[error("unparsable metadata payload: {0}")]
    Parse(String),

    /// The request could not be built (e.g. invalid base URL).
    #[error("invalid metadata request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::TransientExhausted { .. })
    }
}

/// Client for an external book-metadata provider.
///
/// Implementations own their retry policy and timeouts; a returned error means
/// the client has given up on this call.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn fetch(&self, isbn: &Isbn) -> Result<BookMetadata, FetchError>;
}

#[async_trait]
impl<C> MetadataClient for Arc<C>
where
    C: MetadataClient + ?Sized,
{
    async fn fetch(&self, isbn: &Isbn) -> Result<BookMetadata, FetchError> {
        (**self).fetch(isbn).await
    }
}

#[async_trait]
impl<'a, C> MetadataClient for &'a C
where
    C: MetadataClient + ?Sized,
{
    async fn fetch(&self, isbn: &Isbn) -> Result<BookMetadata, FetchError> {
        (**self).fetch(isbn).await
    }
}
