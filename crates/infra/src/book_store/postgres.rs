//! Postgres-backed book catalog.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | A record with this ISBN already exists |
//! | Database (other) | Any other | `Unavailable` | Constraint or query failure |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` | Database unreachable |
//! | Other | N/A | `Unavailable` | Row decoding, protocol errors, etc. |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{instrument, warn};

use shelfsync_catalog::{BookStore, StoreError};
use shelfsync_core::{BookId, BookRecord, Isbn};

const SCHEMA: &str = include_str!("../../migrations/0001_books.sql");

/// Postgres-backed `BookStore`.
///
/// Uniqueness per ISBN is enforced by the `books_isbn_unique` constraint, so two
/// workers inserting the same ISBN concurrently end with one row and one `Conflict`.
#[derive(Debug, Clone)]
pub struct PostgresBookStore {
    pool: Arc<PgPool>,
}

impl PostgresBookStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a connection pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `books` table if it does not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl BookStore for PostgresBookStore {
    #[instrument(skip(self), fields(isbn = %isbn), err)]
    async fn find_by_isbn(&self, isbn: &Isbn) -> Result<Option<BookRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                id,
                isbn,
                title,
                author,
                description,
                genre,
                page_count,
                publisher,
                thumbnail_url
            FROM books
            WHERE isbn = $1
            "#,
        )
        .bind(isbn.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_isbn", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(skip(self, record), fields(isbn = %record.isbn), err)]
    async fn save(&self, mut record: BookRecord) -> Result<BookRecord, StoreError> {
        let page_count = page_count_column(record.page_count);
        if page_count.is_none() && record.page_count.is_some() {
            warn!(page_count = ?record.page_count, "page_count out of range, storing without it");
            record.page_count = None;
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO books (
                isbn,
                title,
                author,
                description,
                genre,
                page_count,
                publisher,
                thumbnail_url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(record.isbn.as_str())
        .bind(&record.title)
        .bind(&record.author)
        .bind(&record.description)
        .bind(&record.genre)
        .bind(page_count)
        .bind(&record.publisher)
        .bind(&record.thumbnail_url)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict {
                    isbn: record.isbn.clone(),
                }
            } else {
                map_sqlx_error("save", e)
            }
        })?;

        Ok(record.with_id(BookId::new(id)))
    }
}

/// `INTEGER` column value; counts beyond `i32::MAX` are dropped.
fn page_count_column(page_count: Option<u32>) -> Option<i32> {
    page_count.and_then(|n| i32::try_from(n).ok())
}

fn record_from_row(row: &PgRow) -> Result<BookRecord, StoreError> {
    let decode = |e: sqlx::Error| StoreError::unavailable(format!("failed to decode book row: {}", e));

    let isbn: String = row.try_get("isbn").map_err(decode)?;
    let isbn = Isbn::parse(&isbn)
        .map_err(|e| StoreError::unavailable(format!("stored isbn '{}' is invalid: {}", isbn, e)))?;
    let page_count: Option<i32> = row.try_get("page_count").map_err(decode)?;

    Ok(BookRecord {
        id: Some(BookId::new(row.try_get("id").map_err(decode)?)),
        isbn,
        title: row.try_get("title").map_err(decode)?,
        author: row.try_get("author").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        genre: row.try_get("genre").map_err(decode)?,
        page_count: page_count.and_then(|n| u32::try_from(n).ok()),
        publisher: row.try_get("publisher").map_err(decode)?,
        thumbnail_url: row.try_get("thumbnail_url").map_err(decode)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => StoreError::unavailable(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            StoreError::unavailable(format!("connection pool closed during {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::unavailable(format!("timed out acquiring a connection for {}", operation))
        }
        other => StoreError::unavailable(format!("{} failed: {}", operation, other)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
