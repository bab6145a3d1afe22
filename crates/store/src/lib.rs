//! # Blood Bank Store
//!
//! Thin client for the remote record store (a Supabase/PostgREST deployment) plus an
//! in-memory backend with the same query semantics.
//!
//! Callers describe reads and updates with [`Query`] and go through the [`RecordStore`]
//! trait, so services never know which backend they talk to. Typed reads decode rows with
//! `serde_path_to_error`; a row that fails to decode is logged and skipped rather than
//! failing the whole listing.

mod memory;
mod query;
mod supabase;

pub use memory::InMemoryStore;
pub use query::{Direction, Filter, OrderBy, Query};
pub use supabase::{RetryPolicy, SupabaseStore};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Maximum number of ids placed in a single `in.()` filter.
///
/// Keeps request URLs well under common proxy limits.
pub const IN_CHUNK_SIZE: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
    #[error("request to {table} failed: {message}")]
    Transport { table: String, message: String },
    #[error("{table} responded with status {status}: {body}")]
    Status {
        table: String,
        status: u16,
        body: String,
    },
    #[error("malformed response from {table}: {message}")]
    MalformedBody { table: String, message: String },
    #[error("table {0} is unavailable")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Backend able to answer PostgREST-style queries.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short label used in logs.
    fn backend_tag(&self) -> &'static str;

    async fn select(&self, query: &Query) -> StoreResult<Vec<Value>>;

    /// Inserts `row` (an object, or an array of objects) and returns the stored rows.
    async fn insert(&self, table: &str, row: Value) -> StoreResult<Vec<Value>>;

    /// Applies `patch` to every row matching `query` and returns the updated rows.
    async fn update(&self, query: &Query, patch: Value) -> StoreResult<Vec<Value>>;
}

/// Runs `query` and decodes each row into `T`, skipping rows that do not decode.
pub async fn fetch_rows<T>(store: &dyn RecordStore, query: &Query) -> StoreResult<Vec<T>>
where
    T: DeserializeOwned,
{
    let rows = store.select(query).await?;
    Ok(decode_rows(query.table_name(), rows))
}

/// Like [`fetch_rows`] but degrades to an empty list when the store call fails.
pub async fn fetch_or_empty<T>(store: &dyn RecordStore, query: &Query) -> Vec<T>
where
    T: DeserializeOwned,
{
    match fetch_rows(store, query).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(
                backend = store.backend_tag(),
                table = query.table_name(),
                "store read failed, continuing with no rows: {}",
                e
            );
            Vec::new()
        }
    }
}

/// Fetches rows whose `column` is one of `ids`, splitting the id list into
/// [`IN_CHUNK_SIZE`] batches. Issues no request at all when `ids` is empty.
///
/// Any failing batch degrades to no rows for that batch.
pub async fn fetch_in_chunks<T>(
    store: &dyn RecordStore,
    base: &Query,
    column: &str,
    ids: &[String],
) -> Vec<T>
where
    T: DeserializeOwned,
{
    let mut unique: Vec<&String> = ids.iter().collect();
    unique.sort();
    unique.dedup();

    let mut out = Vec::new();
    for chunk in unique.chunks(IN_CHUNK_SIZE) {
        let query = base.clone().in_list(column, chunk.iter());
        out.extend(fetch_or_empty::<T>(store, &query).await);
    }
    out
}

/// Reads every row matching `base` in `limit`/`offset` windows of `batch_size` rows,
/// stopping at the first short window or after `max_batches` requests.
///
/// PostgREST caps each response (`max_rows`), so an unwindowed read of a large table is
/// silently truncated. `base` should carry an ordering that makes the windows stable.
pub async fn fetch_batched<T>(
    store: &dyn RecordStore,
    base: &Query,
    batch_size: usize,
    max_batches: usize,
) -> StoreResult<Vec<T>>
where
    T: DeserializeOwned,
{
    let batch_size = batch_size.max(1);
    let mut out = Vec::new();
    for batch in 0..max_batches {
        let query = base
            .clone()
            .limit(batch_size)
            .offset(batch * batch_size);
        let rows = store.select(&query).await?;
        let short = rows.len() < batch_size;
        out.extend(decode_rows::<T>(base.table_name(), rows));
        if short {
            return Ok(out);
        }
    }
    tracing::warn!(
        table = base.table_name(),
        rows = out.len(),
        "batch limit reached, results may be incomplete"
    );
    Ok(out)
}

pub(crate) fn decode_rows<T>(table: &str, rows: Vec<Value>) -> Vec<T>
where
    T: DeserializeOwned,
{
    rows.into_iter()
        .filter_map(|row| match serde_path_to_error::deserialize::<_, T>(row) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    table,
                    path = %e.path(),
                    "skipping malformed row: {}",
                    e.inner()
                );
                None
            }
        })
        .collect()
}
