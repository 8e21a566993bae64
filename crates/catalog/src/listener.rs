//! Synchronization listener: one message in, at most one new book record out.
//!
//! ## Flow
//!
//! ```text
//! SynchronizationRequest → validate ISBN ─(malformed)→ Discarded
//!                              │
//!                              ▼
//!                     BookStore::find_by_isbn ─(found)→ AlreadyPresent
//!                              │
//!                              ▼
//!                     MetadataClient::fetch ─(error)→ SyncError::Fetch
//!                              │
//!                              ▼
//!                        BookStore::save ─(conflict)→ AlreadySynchronized
//!                              │
//!                              ▼
//!                           Created
//! ```
//!
//! ## Idempotency
//!
//! Delivery is at-least-once, so the same ISBN may be handled repeatedly, and
//! concurrently by different workers. The existence check keeps the common
//! duplicate cheap (no remote call). It is not what makes the listener correct:
//! two workers can both see "absent". The store's uniqueness constraint decides,
//! and the loser's `StoreError::Conflict` is an ordinary no-op outcome.
//!
//! ## Failures
//!
//! A malformed ISBN is a data problem that no retry can fix, so it is dropped
//! (logged) instead of returned. Fetch and store failures are returned so the
//! transport's redelivery policy can act; the listener never retries itself.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use shelfsync_core::{BookRecord, Isbn};
use shelfsync_events::{MessageHandler, SynchronizationRequest};

use crate::metadata::{FetchError, MetadataClient};
use crate::store::{BookStore, StoreError};

/// What handling a request amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The ISBN was malformed; the message was dropped.
    Discarded { reason: String },
    /// A record already existed; nothing was fetched or written.
    AlreadyPresent(BookRecord),
    /// A new record was stored.
    Created(BookRecord),
    /// Another writer stored the ISBN between our check and our write.
    AlreadySynchronized,
}

/// A processing failure; the message should be redelivered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Whether redelivering the same message could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Fetch(e) => e.is_transient(),
            SyncError::Store(StoreError::Unavailable(_)) => true,
            SyncError::Store(StoreError::Conflict { .. }) => false,
        }
    }
}

/// Consumes synchronization requests and keeps the local catalog populated.
#[derive(Debug, Clone)]
pub struct SynchronizationListener<C, S> {
    client: C,
    store: S,
}

impl<C, S> SynchronizationListener<C, S>
where
    C: MetadataClient,
    S: BookStore,
{
    pub fn new(client: C, store: S) -> Self {
        Self { client, store }
    }

    /// Handle one delivered request.
    #[instrument(skip(self, request), fields(isbn = %request.isbn), err)]
    pub async fn handle(&self, request: SynchronizationRequest) -> Result<SyncOutcome, SyncError> {
        let isbn = match Isbn::parse(&request.isbn) {
            Ok(isbn) => isbn,
            Err(e) => {
                warn!(error = %e, "discarding synchronization request with malformed ISBN");
                return Ok(SyncOutcome::Discarded {
                    reason: e.to_string(),
                });
            }
        };

        if let Some(existing) = self.store.find_by_isbn(&isbn).await? {
            debug!(book_id = ?existing.id, "book already present, skipping fetch");
            return Ok(SyncOutcome::AlreadyPresent(existing));
        }

        let metadata = self.client.fetch(&isbn).await?;
        let record = BookRecord::from_metadata(metadata);

        match self.store.save(record).await {
            Ok(saved) => {
                info!(book_id = ?saved.id, title = %saved.title, "book synchronized");
                Ok(SyncOutcome::Created(saved))
            }
            Err(StoreError::Conflict { .. }) => {
                debug!("book stored concurrently by another worker");
                Ok(SyncOutcome::AlreadySynchronized)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl<C, S> MessageHandler<SynchronizationRequest> for SynchronizationListener<C, S>
where
    C: MetadataClient,
    S: BookStore,
{
    type Outcome = SyncOutcome;
    type Error = SyncError;

    async fn handle(&self, message: SynchronizationRequest) -> Result<SyncOutcome, SyncError> {
        SynchronizationListener::handle(self, message).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use shelfsync_core::{BookId, BookMetadata};

    use super::*;

    const VALID_ISBN: &str = "1234567891234";

    /// Metadata client returning scripted results and counting calls.
    #[derive(Default)]
    struct ScriptedClient {
        results: Mutex<VecDeque<Result<BookMetadata, FetchError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn returning(result: Result<BookMetadata, FetchError>) -> Self {
            let client = Self::default();
            client.results.lock().unwrap().push_back(result);
            client
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MetadataClient for ScriptedClient {
        async fn fetch(&self, isbn: &Isbn) -> Result<BookMetadata, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::NotFound { isbn: isbn.clone() }))
        }
    }

    /// Store recording every call; `save` assigns sequential ids.
    #[derive(Default)]
    struct RecordingStore {
        records: Mutex<HashMap<Isbn, BookRecord>>,
        lookups: Mutex<Vec<Isbn>>,
        saved: Mutex<Vec<BookRecord>>,
        find_error: Option<StoreError>,
        save_error: Option<StoreError>,
    }

    impl RecordingStore {
        fn with_existing(record: BookRecord) -> Self {
            let store = Self::default();
            store
                .records
                .lock()
                .unwrap()
                .insert(record.isbn.clone(), record);
            store
        }

        fn lookups(&self) -> Vec<Isbn> {
            self.lookups.lock().unwrap().clone()
        }

        fn saved(&self) -> Vec<BookRecord> {
            self.saved.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BookStore for RecordingStore {
        async fn find_by_isbn(&self, isbn: &Isbn) -> Result<Option<BookRecord>, StoreError> {
            self.lookups.lock().unwrap().push(isbn.clone());
            if let Some(e) = &self.find_error {
                return Err(e.clone());
            }
            Ok(self.records.lock().unwrap().get(isbn).cloned())
        }

        async fn save(&self, record: BookRecord) -> Result<BookRecord, StoreError> {
            self.saved.lock().unwrap().push(record.clone());
            if let Some(e) = &self.save_error {
                return Err(e.clone());
            }
            let mut records = self.records.lock().unwrap();
            let stored = record.with_id(BookId::new(records.len() as i64 + 1));
            records.insert(stored.isbn.clone(), stored.clone());
            Ok(stored)
        }
    }

    fn isbn(raw: &str) -> Isbn {
        Isbn::parse(raw).unwrap()
    }

    fn metadata(raw_isbn: &str) -> BookMetadata {
        let mut m = BookMetadata::new(isbn(raw_isbn), "A Promised Land");
        m.author = Some("Barack Obama".to_string());
        m.page_count = Some(500);
        m
    }

    #[tokio::test]
    async fn rejects_book_when_isbn_is_malformed() {
        let client = ScriptedClient::default();
        let store = RecordingStore::default();
        let listener = SynchronizationListener::new(&client, &store);

        let outcome = listener
            .handle(SynchronizationRequest::new("43"))
            .await
            .unwrap();

        assert!(matches!(outcome, SyncOutcome::Discarded { .. }));
        assert_eq!(client.calls(), 0);
        assert!(store.lookups().is_empty());
        assert!(store.saved().is_empty());
    }

    #[tokio::test]
    async fn does_not_override_existing_book() {
        let existing = BookRecord::from_metadata(metadata(VALID_ISBN)).with_id(BookId::new(9));
        let client = ScriptedClient::default();
        let store = RecordingStore::with_existing(existing.clone());
        let listener = SynchronizationListener::new(&client, &store);

        let outcome = listener
            .handle(SynchronizationRequest::new(VALID_ISBN))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::AlreadyPresent(existing));
        assert_eq!(client.calls(), 0);
        assert!(store.saved().is_empty());
    }

    #[tokio::test]
    async fn propagates_fetch_failure_without_saving() {
        let client = ScriptedClient::returning(Err(FetchError::TransientExhausted {
            attempts: 3,
            last_error: "network timeout".to_string(),
        }));
        let store = RecordingStore::default();
        let listener = SynchronizationListener::new(&client, &store);

        let err = listener
            .handle(SynchronizationRequest::new(VALID_ISBN))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::Fetch(FetchError::TransientExhausted { attempts: 3, .. })
        ));
        assert!(err.is_transient());
        assert_eq!(client.calls(), 1);
        assert!(store.saved().is_empty());
    }

    #[tokio::test]
    async fn propagates_permanent_fetch_failure() {
        let client = ScriptedClient::returning(Err(FetchError::Rejected { status: 404 }));
        let store = RecordingStore::default();
        let listener = SynchronizationListener::new(&client, &store);

        let err = listener
            .handle(SynchronizationRequest::new(VALID_ISBN))
            .await
            .unwrap_err();

        assert_eq!(err, SyncError::Fetch(FetchError::Rejected { status: 404 }));
        assert!(!err.is_transient());
        assert!(store.saved().is_empty());
    }

    #[tokio::test]
    async fn stores_book_when_new_and_isbn_is_valid() {
        let client = ScriptedClient::returning(Ok(metadata(VALID_ISBN)));
        let store = RecordingStore::default();
        let listener = SynchronizationListener::new(&client, &store);

        let outcome = listener
            .handle(SynchronizationRequest::new(VALID_ISBN))
            .await
            .unwrap();

        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, None);
        assert_eq!(saved[0].author.as_deref(), Some("Barack Obama"));
        assert_eq!(saved[0].page_count, Some(500));

        match outcome {
            SyncOutcome::Created(record) => {
                assert_eq!(record.id, Some(BookId::new(1)));
                assert_eq!(record.isbn, isbn(VALID_ISBN));
            }
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stores_page_count_from_provider_payload() {
        let mut payload = BookMetadata::new(isbn("9780596004651"), "Head First Java");
        payload.page_count = Some(619);
        let client = ScriptedClient::returning(Ok(payload));
        let store = RecordingStore::default();
        let listener = SynchronizationListener::new(&client, &store);

        let outcome = listener
            .handle(SynchronizationRequest::new("9780596004651"))
            .await
            .unwrap();

        let before = &store.saved()[0];
        assert_eq!(before.id, None);
        assert_eq!(before.isbn.as_str(), "9780596004651");
        assert_eq!(before.page_count, Some(619));

        let SyncOutcome::Created(after) = outcome else {
            panic!("expected Created");
        };
        assert!(after.id.is_some());
        assert_eq!(after.page_count, Some(619));
    }

    #[tokio::test]
    async fn treats_save_conflict_as_already_synchronized() {
        let client = ScriptedClient::returning(Ok(metadata(VALID_ISBN)));
        let store = RecordingStore {
            save_error: Some(StoreError::Conflict {
                isbn: isbn(VALID_ISBN),
            }),
            ..Default::default()
        };
        let listener = SynchronizationListener::new(&client, &store);

        let outcome = listener
            .handle(SynchronizationRequest::new(VALID_ISBN))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::AlreadySynchronized);
        assert_eq!(store.saved().len(), 1);
    }

    #[tokio::test]
    async fn propagates_unavailable_store_without_fetching() {
        let client = ScriptedClient::default();
        let store = RecordingStore {
            find_error: Some(StoreError::unavailable("connection refused")),
            ..Default::default()
        };
        let listener = SynchronizationListener::new(&client, &store);

        let err = listener
            .handle(SynchronizationRequest::new(VALID_ISBN))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Store(StoreError::Unavailable(_))));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn propagates_save_failure() {
        let client = ScriptedClient::returning(Ok(metadata(VALID_ISBN)));
        let store = RecordingStore {
            save_error: Some(StoreError::unavailable("disk full")),
            ..Default::default()
        };
        let listener = SynchronizationListener::new(&client, &store);

        let err = listener
            .handle(SynchronizationRequest::new(VALID_ISBN))
            .await
            .unwrap_err();

        assert_eq!(err, SyncError::Store(StoreError::unavailable("disk full")));
    }

    #[tokio::test]
    async fn handling_the_same_isbn_twice_stores_one_record() {
        let client = ScriptedClient::returning(Ok(metadata(VALID_ISBN)));
        let store = RecordingStore::default();
        let listener = SynchronizationListener::new(&client, &store);

        let first = listener
            .handle(SynchronizationRequest::new(VALID_ISBN))
            .await
            .unwrap();
        let second = listener
            .handle(SynchronizationRequest::new(VALID_ISBN))
            .await
            .unwrap();

        assert!(matches!(first, SyncOutcome::Created(_)));
        assert!(matches!(second, SyncOutcome::AlreadyPresent(_)));
        assert_eq!(client.calls(), 1);
        assert_eq!(store.saved().len(), 1);
        assert_eq!(store.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn looks_up_isbn10_requests_by_normalized_isbn13() {
        let client = ScriptedClient::default();
        let existing = BookRecord::from_metadata(metadata("9780596004651")).with_id(BookId::new(1));
        let store = RecordingStore::with_existing(existing);
        let listener = SynchronizationListener::new(&client, &store);

        let outcome = listener
            .handle(SynchronizationRequest::new("0-596-00465-6"))
            .await
            .unwrap();

        assert!(matches!(outcome, SyncOutcome::AlreadyPresent(_)));
        assert_eq!(store.lookups(), vec![isbn("9780596004651")]);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: malformed ISBNs never reach the client or the store.
            #[test]
            fn malformed_isbns_touch_no_collaborator(
                raw in "[0-9]{0,9}|[0-9]{11,12}|[0-9]{14,18}|[a-zA-Z]{1,16}|[0-9]{5}[a-z][0-9]{7}"
            ) {
                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                let client = ScriptedClient::default();
                let store = RecordingStore::default();
                let listener = SynchronizationListener::new(&client, &store);

                let outcome = rt.block_on(listener.handle(SynchronizationRequest::new(raw)));

                let is_discarded = matches!(outcome, Ok(SyncOutcome::Discarded { .. }));
                prop_assert!(is_discarded);
                prop_assert_eq!(client.calls(), 0);
                prop_assert!(store.lookups().is_empty());
                prop_assert!(store.saved().is_empty());
            }
        }
    }
}
