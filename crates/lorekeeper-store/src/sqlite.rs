//! Local-embedded memory store.
//!
//! Persists collections and memory records to a single SQLite file and
//! answers similarity queries by brute-force cosine ranking over the
//! requested collection.
//!
//! # Storage layout
//!
//! | table         | column        | type | description                                  |
//! |---------------|---------------|------|----------------------------------------------|
//! | `collections` | id            | TEXT | UUID v4 primary key                          |
//! |               | name          | TEXT | unique collection name                       |
//! |               | created_at    | TEXT | RFC-3339 creation time (UTC)                 |
//! | `memories`    | collection_id | TEXT | owning collection                            |
//! |               | id            | TEXT | caller-assigned id, unique per collection    |
//! |               | document      | TEXT | memory text                                  |
//! |               | metadata      | TEXT | compact JSON object of scalars               |
//! |               | embedding     | BLOB | little-endian f32 vector (4 × N bytes)       |
//! |               | updated_at    | TEXT | RFC-3339 time of the last upsert             |
//!
//! Several processes may open the same file; writers wait on SQLite's busy
//! timeout ([`DEFAULT_BUSY_TIMEOUT`] unless changed with
//! [`SqliteStore::with_busy_timeout`]) and then fail with
//! [`MemoryError::StoreUnavailable`]. Concurrent upserts of one id resolve
//! last-writer-wins inside SQLite.
//!
//! Every trait method runs its SQLite work on Tokio's blocking pool, so a
//! locked file or a long scan never stalls the async workers.
//!
//! # Example
//!
//! ```rust
//! use lorekeeper_store::{MemoryStore, SqliteStore};
//! use lorekeeper_types::{MemoryRecord, Metadata};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let store = SqliteStore::open_in_memory().unwrap();
//! store.create_or_get_collection("npc1").await.unwrap();
//! store
//!     .upsert("npc1", MemoryRecord::new("mem1", "Helped with the quest", Metadata::new()))
//!     .await
//!     .unwrap();
//!
//! let hits = store.query("npc1", "quest help", 5, None).await.unwrap();
//! assert_eq!(hits[0].id, "mem1");
//! # });
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lorekeeper_types::{
    CollectionHandle, CountOutcome, DeleteOutcome, MemoryError, MemoryRecord, Metadata,
    Predicate,
};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::embedding::{
    Embedder, HashingEmbedder, bytes_to_embedding, cosine_distance, embedding_to_bytes,
};
use crate::format::{GetColumns, QueryColumns};
use crate::store::MemoryStore;

/// How long a statement waits for another connection's lock before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Lock contention and an unopenable file mean the store is unavailable;
/// anything else is a backend fault.
fn store_err(e: rusqlite::Error) -> MemoryError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen) => {
            MemoryError::StoreUnavailable(e.to_string())
        }
        _ => MemoryError::Backend(e.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SqliteStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed [`MemoryStore`].
pub struct SqliteStore {
    inner: Arc<Inner>,
}

/// State shared with blocking tasks.
struct Inner {
    conn: Mutex<Connection>,
    embedder: Box<dyn Embedder>,
}

impl SqliteStore {
    /// Open (or create) a persistent database at `path` using the default
    /// [`HashingEmbedder`]. Missing parent directories are created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        Self::open_with_embedder(path, Box::new(HashingEmbedder::default()))
    }

    pub fn open_with_embedder(
        path: impl AsRef<Path>,
        embedder: Box<dyn Embedder>,
    ) -> Result<Self, MemoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::StoreUnavailable(format!(
                    "cannot create {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT).map_err(store_err)?;
        Self::with_connection(conn, embedder)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::with_connection(conn, Box::new(HashingEmbedder::default()))
    }

    fn with_connection(conn: Connection, embedder: Box<dyn Embedder>) -> Result<Self, MemoryError> {
        init_schema(&conn)?;
        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                embedder,
            }),
        })
    }

    /// Replace the busy timeout (builder-style). A zero duration fails
    /// immediately on contention.
    pub fn with_busy_timeout(self, timeout: Duration) -> Result<Self, MemoryError> {
        self.inner.conn()?.busy_timeout(timeout).map_err(store_err)?;
        Ok(self)
    }

    /// Run `f` against the shared state on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, MemoryError>
    where
        F: FnOnce(&Inner) -> Result<T, MemoryError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| MemoryError::Backend(format!("sqlite task failed: {e}")))?
    }
}

impl Inner {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, MemoryError> {
        self.conn
            .lock()
            .map_err(|_| MemoryError::Backend("sqlite connection mutex poisoned".to_string()))
    }

    // ── synchronous operations ───────────────────────────────────────────────

    fn create_or_get_sync(&self, name: &str) -> Result<CollectionHandle, MemoryError> {
        let conn = self.conn()?;
        // ON CONFLICT keeps concurrent creators from racing into a UNIQUE error.
        conn.execute(
            "INSERT INTO collections (id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO NOTHING",
            params![Uuid::new_v4().to_string(), name, Utc::now().to_rfc3339()],
        )
        .map_err(store_err)?;
        let id = collection_id(&conn, name)?
            .ok_or_else(|| MemoryError::CollectionNotFound(name.to_string()))?;
        Ok(CollectionHandle {
            name: name.to_string(),
            id,
        })
    }

    fn upsert_sync(&self, collection: &str, records: Vec<MemoryRecord>) -> Result<(), MemoryError> {
        // Serialise and embed before taking the lock.
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let metadata = serde_json::to_string(&record.metadata)
                .map_err(|e| MemoryError::MalformedMetadata(e.to_string()))?;
            let embedding = embedding_to_bytes(&self.embedder.embed(&record.document));
            rows.push((record.id, record.document, metadata, embedding));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(store_err)?;
        let cid = collection_id(&tx, collection)?
            .ok_or_else(|| MemoryError::CollectionNotFound(collection.to_string()))?;
        let now = Utc::now().to_rfc3339();
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO memories
                         (collection_id, id, document, metadata, embedding, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(collection_id, id) DO UPDATE SET
                         document   = excluded.document,
                         metadata   = excluded.metadata,
                         embedding  = excluded.embedding,
                         updated_at = excluded.updated_at",
                )
                .map_err(store_err)?;
            for (id, document, metadata, embedding) in &rows {
                stmt.execute(params![cid.to_string(), id, document, metadata, embedding, now])
                    .map_err(store_err)?;
            }
        }
        tx.commit().map_err(store_err)?;
        debug!(collection, count = rows.len(), "upserted memories");
        Ok(())
    }

    fn query_sync(
        &self,
        collection: &str,
        query_text: &str,
        limit: usize,
        predicate: Option<&Predicate>,
    ) -> Result<QueryColumns, MemoryError> {
        let query_embedding = self.embedder.embed(query_text);
        let conn = self.conn()?;
        let cid = collection_id(&conn, collection)?
            .ok_or_else(|| MemoryError::CollectionNotFound(collection.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, document, metadata, embedding
                 FROM memories
                 WHERE collection_id = ?1
                 ORDER BY rowid ASC",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![cid.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })
            .map_err(store_err)?;

        let mut scored = Vec::new();
        for row in rows {
            let (id, document, metadata_json, blob) = row.map_err(store_err)?;
            let metadata = parse_metadata(&id, &metadata_json)?;
            if predicate.is_some_and(|p| !p.matches(&metadata)) {
                continue;
            }
            let embedding = bytes_to_embedding(&blob);
            if embedding.len() != query_embedding.len() {
                warn!(collection, id = %id, "skipping memory with mismatched embedding dimension");
                continue;
            }
            let distance = cosine_distance(&embedding, &query_embedding);
            scored.push((id, document, metadata, distance));
        }
        // Stable sort: equal distances keep insertion order.
        scored.sort_by(|a, b| a.3.total_cmp(&b.3));
        scored.truncate(limit);

        let mut ids = Vec::with_capacity(scored.len());
        let mut documents = Vec::with_capacity(scored.len());
        let mut metadatas = Vec::with_capacity(scored.len());
        let mut distances = Vec::with_capacity(scored.len());
        for (id, document, metadata, distance) in scored {
            ids.push(id);
            documents.push(Some(document));
            metadatas.push(Some(metadata));
            distances.push(distance);
        }
        Ok(QueryColumns {
            ids: vec![ids],
            documents: Some(vec![documents]),
            metadatas: Some(vec![metadatas]),
            distances: Some(vec![distances]),
        })
    }

    fn get_sync(&self, collection: &str, ids: &[String]) -> Result<GetColumns, MemoryError> {
        let conn = self.conn()?;
        let cid = collection_id(&conn, collection)?
            .ok_or_else(|| MemoryError::CollectionNotFound(collection.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT document, metadata FROM memories
                 WHERE collection_id = ?1 AND id = ?2",
            )
            .map_err(store_err)?;

        let mut out = GetColumns {
            ids: Vec::new(),
            documents: Some(Vec::new()),
            metadatas: Some(Vec::new()),
        };
        for id in ids {
            let found = stmt
                .query_row(params![cid.to_string(), id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .optional()
                .map_err(store_err)?;
            if let Some((document, metadata_json)) = found {
                let metadata = parse_metadata(id, &metadata_json)?;
                out.ids.push(id.clone());
                out.documents.get_or_insert_with(Vec::new).push(Some(document));
                out.metadatas.get_or_insert_with(Vec::new).push(Some(metadata));
            }
        }
        Ok(out)
    }

    fn delete_sync(&self, name: &str) -> Result<DeleteOutcome, MemoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(store_err)?;
        let Some(cid) = collection_id(&tx, name)? else {
            return Ok(DeleteOutcome::NotFound {
                note: MemoryError::CollectionNotFound(name.to_string()).to_string(),
            });
        };
        tx.execute(
            "DELETE FROM memories WHERE collection_id = ?1",
            params![cid.to_string()],
        )
        .map_err(store_err)?;
        tx.execute("DELETE FROM collections WHERE id = ?1", params![cid.to_string()])
            .map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        Ok(DeleteOutcome::Deleted)
    }

    fn list_sync(&self) -> Result<Vec<String>, MemoryError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT name FROM collections ORDER BY created_at ASC, name ASC")
            .map_err(store_err)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(names)
    }

    fn count_sync(&self, collection: &str) -> Result<CountOutcome, MemoryError> {
        let conn = self.conn()?;
        let Some(cid) = collection_id(&conn, collection)? else {
            return Ok(CountOutcome::Missing {
                error: MemoryError::CollectionNotFound(collection.to_string()).to_string(),
            });
        };
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memories WHERE collection_id = ?1",
                params![cid.to_string()],
                |row| row.get(0),
            )
            .map_err(store_err)?;
        Ok(CountOutcome::Counted(usize::try_from(n).unwrap_or(0)))
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    async fn heartbeat(&self) -> Result<(), MemoryError> {
        self.blocking(|inner| {
            let conn = inner.conn()?;
            conn.query_row("SELECT 1", [], |_| Ok(())).map_err(store_err)
        })
        .await
    }

    async fn create_or_get_collection(&self, name: &str) -> Result<CollectionHandle, MemoryError> {
        let name = name.to_string();
        self.blocking(move |inner| inner.create_or_get_sync(&name))
            .await
    }

    async fn upsert_many(
        &self,
        collection: &str,
        records: Vec<MemoryRecord>,
    ) -> Result<(), MemoryError> {
        let collection = collection.to_string();
        self.blocking(move |inner| inner.upsert_sync(&collection, records))
            .await
    }

    async fn query_columns(
        &self,
        collection: &str,
        query_text: &str,
        limit: usize,
        predicate: Option<&Predicate>,
    ) -> Result<QueryColumns, MemoryError> {
        let collection = collection.to_string();
        let query_text = query_text.to_string();
        let predicate = predicate.cloned();
        self.blocking(move |inner| {
            inner.query_sync(&collection, &query_text, limit, predicate.as_ref())
        })
        .await
    }

    async fn get_columns(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<GetColumns, MemoryError> {
        let collection = collection.to_string();
        let ids = ids.to_vec();
        self.blocking(move |inner| inner.get_sync(&collection, &ids))
            .await
    }

    async fn delete_collection(&self, name: &str) -> Result<DeleteOutcome, MemoryError> {
        let name = name.to_string();
        self.blocking(move |inner| inner.delete_sync(&name)).await
    }

    async fn list_collections(&self) -> Result<Vec<String>, MemoryError> {
        self.blocking(|inner| inner.list_sync()).await
    }

    async fn count(&self, collection: &str) -> Result<CountOutcome, MemoryError> {
        let collection = collection.to_string();
        self.blocking(move |inner| inner.count_sync(&collection))
            .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

fn init_schema(conn: &Connection) -> Result<(), MemoryError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS collections (
            id         TEXT NOT NULL PRIMARY KEY,
            name       TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS memories (
            collection_id TEXT NOT NULL,
            id            TEXT NOT NULL,
            document      TEXT NOT NULL,
            metadata      TEXT NOT NULL,
            embedding     BLOB NOT NULL,
            updated_at    TEXT NOT NULL,
            PRIMARY KEY (collection_id, id)
        );",
    )
    .map_err(store_err)
}

fn collection_id(conn: &Connection, name: &str) -> Result<Option<Uuid>, MemoryError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT id FROM collections WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(store_err)?;
    raw.map(|s| {
        Uuid::parse_str(&s)
            .map_err(|e| MemoryError::Backend(format!("corrupt collection id {s:?}: {e}")))
    })
    .transpose()
}

fn parse_metadata(id: &str, json: &str) -> Result<Metadata, MemoryError> {
    serde_json::from_str(json)
        .map_err(|e| MemoryError::Backend(format!("corrupt metadata for {id}: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
