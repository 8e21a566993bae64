//! `shelfsync-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! the ISBN business key, the book record entity and the metadata payload the
//! synchronization pipeline moves between its collaborators.

pub mod book;
pub mod entity;
pub mod error;
pub mod id;
pub mod isbn;
pub mod value_object;

pub use book::{BookMetadata, BookRecord};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::BookId;
pub use isbn::Isbn;
pub use value_object::ValueObject;
