use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use shelfsync_catalog::{BookStore, StoreError};
use shelfsync_core::{BookId, BookRecord, Isbn};

#[derive(Debug)]
struct State {
    by_isbn: HashMap<Isbn, BookRecord>,
    next_id: i64,
}

/// In-memory book catalog for tests/dev.
///
/// Uniqueness on `isbn` is checked and applied under one write lock, so racing
/// saves of the same ISBN produce exactly one record and one `Conflict`.
#[derive(Debug)]
pub struct InMemoryBookStore {
    inner: RwLock<State>,
}

impl InMemoryBookStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(State {
                by_isbn: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|s| s.by_isbn.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records, ordered by id.
    pub fn all(&self) -> Vec<BookRecord> {
        let mut records: Vec<BookRecord> = match self.inner.read() {
            Ok(s) => s.by_isbn.values().cloned().collect(),
            Err(_) => return vec![],
        };
        records.sort_by_key(|r| r.id);
        records
    }
}

impl Default for InMemoryBookStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> StoreError {
    StoreError::unavailable("in-memory book store lock poisoned")
}

#[async_trait]
impl BookStore for InMemoryBookStore {
    async fn find_by_isbn(&self, isbn: &Isbn) -> Result<Option<BookRecord>, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        Ok(state.by_isbn.get(isbn).cloned())
    }

    async fn save(&self, record: BookRecord) -> Result<BookRecord, StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;

        if state.by_isbn.contains_key(&record.isbn) {
            return Err(StoreError::Conflict { isbn: record.isbn });
        }

        let id = BookId::new(state.next_id);
        state.next_id += 1;

        let saved = record.with_id(id);
        state.by_isbn.insert(saved.isbn.clone(), saved.clone());
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfsync_core::BookMetadata;

    fn record(isbn: &str, title: &str) -> BookRecord {
        BookRecord::from_metadata(BookMetadata::new(Isbn::parse(isbn).unwrap(), title))
    }

    #[tokio::test]
    async fn save_assigns_sequential_ids() {
        let store = InMemoryBookStore::new();

        let a = store.save(record("9780596004651", "Head First Java")).await.unwrap();
        let b = store.save(record("9780131103627", "The C Programming Language")).await.unwrap();

        assert_eq!(a.id, Some(BookId::new(1)));
        assert_eq!(b.id, Some(BookId::new(2)));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn find_returns_saved_record() {
        let store = InMemoryBookStore::new();
        let isbn = Isbn::parse("9780596004651").unwrap();

        assert_eq!(store.find_by_isbn(&isbn).await.unwrap(), None);

        let saved = store.save(record("9780596004651", "Head First Java")).await.unwrap();
        assert_eq!(store.find_by_isbn(&isbn).await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn second_save_for_same_isbn_conflicts() {
        let store = InMemoryBookStore::new();
        store.save(record("9780596004651", "Head First Java")).await.unwrap();

        let err = store
            .save(record("9780596004651", "Head First Java, 2nd Edition"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            StoreError::Conflict {
                isbn: Isbn::parse("9780596004651").unwrap()
            }
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.all()[0].title, "Head First Java");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_produce_one_record() {
        let store = std::sync::Arc::new(InMemoryBookStore::new());

        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .save(record("9780596004651", &format!("copy {i}")))
                    .await
            }));
        }

        let mut created = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(StoreError::Conflict { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(conflicts, 15);
        assert_eq!(store.len(), 1);
    }
}
