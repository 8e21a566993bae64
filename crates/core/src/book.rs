//! Book catalog entity and the metadata payload it is created from.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::id::BookId;
use crate::isbn::Isbn;

/// Metadata for one book edition as returned by an external provider.
///
/// Shaped like a `BookRecord` without an identifier. Providers may omit any
/// field except the ISBN and title; omitted fields stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub isbn: Isbn,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub page_count: Option<u32>,
    pub publisher: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl BookMetadata {
    /// Minimal metadata (ISBN + title); every other field absent.
    pub fn new(isbn: Isbn, title: impl Into<String>) -> Self {
        Self {
            isbn,
            title: title.into(),
            author: None,
            description: None,
            genre: None,
            page_count: None,
            publisher: None,
            thumbnail_url: None,
        }
    }
}

/// A book in the local catalog.
///
/// At most one record exists per `isbn`; the store enforces that. Records are
/// created once and never mutated by the synchronization pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    /// Assigned by the store on creation.
    pub id: Option<BookId>,
    pub isbn: Isbn,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub page_count: Option<u32>,
    pub publisher: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl BookRecord {
    /// Build an unsaved record (no `id`) from fetched metadata.
    pub fn from_metadata(metadata: BookMetadata) -> Self {
        let BookMetadata {
            isbn,
            title,
            author,
            description,
            genre,
            page_count,
            publisher,
            thumbnail_url,
        } = metadata;

        Self {
            id: None,
            isbn,
            title,
            author,
            description,
            genre,
            page_count,
            publisher,
            thumbnail_url,
        }
    }

    /// Return the record with the store-assigned identifier.
    pub fn with_id(mut self, id: BookId) -> Self {
        self.id = Some(id);
        self
    }
}

impl Entity for BookRecord {
    type Id = BookId;

    fn id(&self) -> Option<&Self::Id> {
        self.id.as_ref()
    }
}
