//! The Memory Store client seam.
//!
//! Lorekeeper never talks to a concrete vector database directly. Every
//! backend implements [`MemoryStore`]:
//!
//! - [`SqliteStore`][crate::sqlite::SqliteStore] – local-embedded, persists
//!   to a SQLite file next to the game.
//! - `RemoteStore` (in `lorekeeper-bridge`) – remote-networked, speaks the
//!   bridge's HTTP surface.
//!
//! Backends are constructed once at startup and handed to their callers
//! explicitly; there is no process-wide client.

use async_trait::async_trait;
use lorekeeper_types::{
    CollectionHandle, CountOutcome, DeleteOutcome, MemoryError, MemoryRecord, Predicate,
    QueryResultItem,
};

use crate::format::{self, GetColumns, QueryColumns};

/// Typed capability set over an external semantic-memory store.
///
/// # Contract
///
/// * `create_or_get_collection` is idempotent and never fails because the
///   collection already exists.
/// * `upsert_many` replaces records sharing an id wholesale. It fails with
///   [`MemoryError::CollectionNotFound`] rather than creating the collection.
/// * `query_columns` returns the store's raw columnar answer, nearest first,
///   in the store's own order for ties. Nothing here re-sorts it.
/// * `delete_collection` and `count` report a missing collection through
///   their outcome types, not as errors.
///
/// No method retries. Connectivity failures surface as
/// [`MemoryError::StoreUnavailable`].
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Cheap liveness probe.
    async fn heartbeat(&self) -> Result<(), MemoryError>;

    async fn create_or_get_collection(&self, name: &str) -> Result<CollectionHandle, MemoryError>;

    /// Insert or replace every record in `records` as one unit.
    async fn upsert_many(
        &self,
        collection: &str,
        records: Vec<MemoryRecord>,
    ) -> Result<(), MemoryError>;

    async fn upsert(&self, collection: &str, record: MemoryRecord) -> Result<(), MemoryError> {
        self.upsert_many(collection, vec![record]).await
    }

    /// Similarity search returning one columnar batch for `query_text`.
    async fn query_columns(
        &self,
        collection: &str,
        query_text: &str,
        limit: usize,
        predicate: Option<&Predicate>,
    ) -> Result<QueryColumns, MemoryError>;

    /// Similarity search reshaped into records, nearest first.
    async fn query(
        &self,
        collection: &str,
        query_text: &str,
        limit: usize,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<QueryResultItem>, MemoryError> {
        let columns = self
            .query_columns(collection, query_text, limit, predicate)
            .await?;
        Ok(format::format(columns, limit))
    }

    /// Point lookup of several ids; unknown ids are simply absent.
    async fn get_columns(&self, collection: &str, ids: &[String])
    -> Result<GetColumns, MemoryError>;

    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<MemoryRecord>, MemoryError> {
        let columns = self.get_columns(collection, &[id.to_string()]).await?;
        Ok(format::first_record(columns))
    }

    async fn delete_collection(&self, name: &str) -> Result<DeleteOutcome, MemoryError>;

    async fn list_collections(&self) -> Result<Vec<String>, MemoryError>;

    async fn count(&self, collection: &str) -> Result<CountOutcome, MemoryError>;
}
