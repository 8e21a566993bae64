use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use shelfsync_core::{BookRecord, Isbn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A record with this ISBN already exists (uniqueness constraint on `isbn`).
    #[error("book with ISBN {isbn} already exists")]
    Conflict { isbn: Isbn },

    /// The store could not be reached or the operation failed.
    #[error("book store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// Persistent book catalog.
///
/// The store is the single source of idempotency truth: it must reject a second
/// record for an existing ISBN with `StoreError::Conflict`, atomically, even when
/// two writers race (callers' own existence checks are only an optimization).
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn find_by_isbn(&self, isbn: &Isbn) -> Result<Option<BookRecord>, StoreError>;

    /// Persist a new record and return it with its store-assigned `id`.
    async fn save(&self, record: BookRecord) -> Result<BookRecord, StoreError>;
}

#[async_trait]
impl<S> BookStore for Arc<S>
where
    S: BookStore + ?Sized,
{
    async fn find_by_isbn(&self, isbn: &Isbn) -> Result<Option<BookRecord>, StoreError> {
        (**self).find_by_isbn(isbn).await
    }

    async fn save(&self, record: BookRecord) -> Result<BookRecord, StoreError> {
        (**self).save(record).await
    }
}

#[async_trait]
impl<'a, S> BookStore for &'a S
where
    S: BookStore + ?Sized,
{
    async fn find_by_isbn(&self, isbn: &Isbn) -> Result<Option<BookRecord>, StoreError> {
        (**self).find_by_isbn(isbn).await
    }

    async fn save(&self, record: BookRecord) -> Result<BookRecord, StoreError> {
        (**self).save(record).await
    }
}
