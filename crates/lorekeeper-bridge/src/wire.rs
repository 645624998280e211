//! Request and response bodies of the bridge's HTTP surface.
//!
//! Shared by the server ([`crate::server`]) and the client
//! ([`crate::client::RemoteStore`]) so both sides agree on one closed set of
//! shapes.

use lorekeeper_types::{MemoryError, MemoryRecord, Metadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default number of results when a query body omits `n_results`.
pub const DEFAULT_N_RESULTS: usize = 5;

fn default_n_results() -> usize {
    DEFAULT_N_RESULTS
}

/// `POST /collection/{name}/add`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddRequest {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub documents: Vec<String>,
    #[serde(default)]
    pub metadatas: Vec<Option<Metadata>>,
}

impl AddRequest {
    pub fn from_records(records: Vec<MemoryRecord>) -> Self {
        let mut req = AddRequest::default();
        for r in records {
            req.ids.push(r.id);
            req.documents.push(r.document);
            req.metadatas.push(Some(r.metadata));
        }
        req
    }

    /// Zip the parallel arrays into records.
    ///
    /// `ids` and `documents` must have equal length; `metadatas` must be
    /// empty or match them too.
    pub fn into_records(self) -> Result<Vec<MemoryRecord>, MemoryError> {
        let n = self.ids.len();
        if self.documents.len() != n {
            return Err(MemoryError::InvalidArgument(format!(
                "got {n} ids but {} documents",
                self.documents.len()
            )));
        }
        if !self.metadatas.is_empty() && self.metadatas.len() != n {
            return Err(MemoryError::InvalidArgument(format!(
                "got {n} ids but {} metadatas",
                self.metadatas.len()
            )));
        }
        let mut metadatas = self.metadatas.into_iter();
        Ok(self
            .ids
            .into_iter()
            .zip(self.documents)
            .map(|(id, document)| MemoryRecord {
                id,
                document,
                metadata: metadatas.next().flatten().unwrap_or_default(),
            })
            .collect())
    }
}

/// `POST /collection/{name}/query`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query_texts: Vec<String>,
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Value>,
}

/// `POST /collection/{name}/get`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetRequest {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Answer to `POST /collection/{name}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionCreated {
    pub name: String,
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessBody {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SuccessBody {
    pub fn ok() -> Self {
        Self {
            success: true,
            note: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountBody {
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionsBody {
    pub collections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthBody {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
