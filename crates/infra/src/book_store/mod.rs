//! `BookStore` adapters.
//!
//! - `InMemoryBookStore`: tests/dev
//! - `PostgresBookStore`: production, `books` table with a unique `isbn`

mod in_memory;
mod postgres;

pub use in_memory::InMemoryBookStore;
pub use postgres::PostgresBookStore;
