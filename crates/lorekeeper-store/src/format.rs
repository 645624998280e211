//! Result formatter.
//!
//! The external store answers queries column-wise: parallel arrays of ids,
//! documents, metadatas and distances, nested once more per query text.
//! Callers want one self-contained record per hit. [`format`] performs that
//! reshaping for the first query batch.
//!
//! Partial responses are expected. The documents column is authoritative for
//! the number of hits; a shorter id, metadata or distance column is padded
//! with `""`, `{}` and `0.0` respectively. A missing or empty documents column
//! yields no hits, never an error.

use lorekeeper_types::{MemoryRecord, Metadata, QueryResultItem};
use serde::{Deserialize, Serialize};

/// Raw columnar query response, one inner vector per query text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryColumns {
    #[serde(default)]
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    pub distances: Option<Vec<Vec<f64>>>,
}

impl QueryColumns {
    /// An empty response with every column present and no batches.
    pub fn empty() -> Self {
        Self {
            ids: Vec::new(),
            documents: Some(Vec::new()),
            metadatas: Some(Vec::new()),
            distances: Some(Vec::new()),
        }
    }

    /// Append the first batch of `other` as the next batch of `self`.
    ///
    /// Used to answer a request carrying several query texts with one
    /// nested response. Absent columns in `other` contribute an empty batch.
    pub fn push_batch(&mut self, other: QueryColumns) {
        fn first<T>(column: Option<Vec<Vec<T>>>) -> Vec<T> {
            column.and_then(|c| c.into_iter().next()).unwrap_or_default()
        }
        self.ids.push(other.ids.into_iter().next().unwrap_or_default());
        self.documents
            .get_or_insert_with(Vec::new)
            .push(first(other.documents));
        self.metadatas
            .get_or_insert_with(Vec::new)
            .push(first(other.metadatas));
        self.distances
            .get_or_insert_with(Vec::new)
            .push(first(other.distances));
    }
}

/// Raw columnar point-lookup response (flat, no per-query nesting).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetColumns {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Option<Metadata>>>,
}

/// Reshape the first batch of `columns` into at most `limit` records.
pub fn format(columns: QueryColumns, limit: usize) -> Vec<QueryResultItem> {
    let Some(documents) = columns.documents.and_then(|d| d.into_iter().next()) else {
        return Vec::new();
    };
    let ids = columns.ids.into_iter().next().unwrap_or_default();
    let metadatas = columns
        .metadatas
        .and_then(|m| m.into_iter().next())
        .unwrap_or_default();
    let distances = columns
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();

    documents
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, document)| QueryResultItem {
            id: ids.get(i).cloned().unwrap_or_default(),
            document: document.unwrap_or_default(),
            metadata: metadatas.get(i).cloned().flatten().unwrap_or_default(),
            distance: distances.get(i).copied().unwrap_or(0.0),
        })
        .collect()
}

/// The first record of a point-lookup response, or `None` when the store
/// returned no documents.
pub fn first_record(columns: GetColumns) -> Option<MemoryRecord> {
    let document = columns.documents?.into_iter().next()?;
    Some(MemoryRecord {
        id: columns.ids.into_iter().next().unwrap_or_default(),
        document: document.unwrap_or_default(),
        metadata: columns
            .metadatas
            .and_then(|m| m.into_iter().next())
            .flatten()
            .unwrap_or_default(),
    })
}
