//! Open Library `jscmd=data` response parsing.
//!
//! The body is an object keyed by `"ISBN:<isbn>"`. Unknown ISBNs produce `{}`.
//! Every field except `title` is optional; odd values for optional fields
//! (e.g. a non-numeric page count) are treated as absent, not as a parse error.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use shelfsync_catalog::FetchError;
use shelfsync_core::{BookMetadata, Isbn};

#[derive(Debug, Deserialize)]
struct Entry {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<Named>,
    #[serde(default)]
    publishers: Vec<Named>,
    #[serde(default)]
    subjects: Vec<Named>,
    number_of_pages: Option<JsonValue>,
    notes: Option<Notes>,
    cover: Option<Cover>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Notes {
    Text(String),
    Typed { value: String },
}

#[derive(Debug, Deserialize)]
struct Cover {
    small: Option<String>,
    medium: Option<String>,
    large: Option<String>,
}

fn first_name(items: Vec<Named>) -> Option<String> {
    items
        .into_iter()
        .filter_map(|n| n.name)
        .map(|n| n.trim().to_string())
        .find(|n| !n.is_empty())
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parse a provider response body into metadata for `isbn`.
pub(crate) fn parse_books_response(isbn: &Isbn, body: &[u8]) -> Result<BookMetadata, FetchError> {
    let mut doc: HashMap<String, JsonValue> = serde_json::from_slice(body)
        .map_err(|e| FetchError::Parse(format!("response is not a JSON object: {}", e)))?;

    let key = format!("ISBN:{}", isbn);
    let Some(raw_entry) = doc.remove(&key) else {
        return Err(FetchError::NotFound { isbn: isbn.clone() });
    };

    let entry: Entry = serde_json::from_value(raw_entry)
        .map_err(|e| FetchError::Parse(format!("unexpected shape for {}: {}", key, e)))?;

    let title = entry
        .title
        .and_then(non_empty)
        .ok_or_else(|| FetchError::Parse(format!("{} has no title", key)))?;

    let page_count = entry
        .number_of_pages
        .as_ref()
        .and_then(JsonValue::as_u64)
        .and_then(|n| u32::try_from(n).ok());

    let description = entry.notes.and_then(|notes| match notes {
        Notes::Text(text) => non_empty(text),
        Notes::Typed { value } => non_empty(value),
    });

    let thumbnail_url = entry
        .cover
        .and_then(|c| c.small.or(c.medium).or(c.large))
        .and_then(non_empty);

    Ok(BookMetadata {
        isbn: isbn.clone(),
        title,
        author: first_name(entry.authors),
        description,
        genre: first_name(entry.subjects),
        page_count,
        publisher: first_name(entry.publishers),
        thumbnail_url,
    })
}
