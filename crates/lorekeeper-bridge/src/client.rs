//! [`RemoteStore`] – a [`MemoryStore`] backed by a running bridge.
//!
//! Every trait operation maps to exactly one bridge request. The predicate
//! travels as the store's `where` object produced by
//! [`Predicate::to_where`]; an absent predicate omits the field.
//!
//! Transport failures (connection refused, timeouts) become
//! [`MemoryError::StoreUnavailable`]. Nothing is retried.

use std::time::Duration;

use async_trait::async_trait;
use lorekeeper_store::{GetColumns, MemoryStore, QueryColumns};
use lorekeeper_types::{
    CollectionHandle, CountOutcome, DeleteOutcome, MemoryError, MemoryRecord, Predicate,
    validate_collection_name,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::wire::{
    AddRequest, CollectionCreated, CollectionsBody, CountBody, ErrorBody, GetRequest, HealthBody,
    QueryRequest, SuccessBody,
};

/// Async client for a Lorekeeper bridge.
///
/// Construct once and reuse; the inner `reqwest::Client` pools connections.
pub struct RemoteStore {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteStore {
    /// Create a client for the bridge at `base_url`
    /// (e.g. `"http://localhost:8001"`).
    ///
    /// `timeout` bounds each whole request; `None` waits indefinitely.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, MemoryError> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder
            .build()
            .map_err(|e| MemoryError::StoreUnavailable(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, name: &str, suffix: &str) -> Result<String, MemoryError> {
        validate_collection_name(name)?;
        Ok(format!("{}/collection/{name}{suffix}", self.base_url))
    }

    /// Send `req` and turn non-success statuses into [`MemoryError`]s.
    async fn send(&self, req: RequestBuilder, collection: Option<&str>) -> Result<Response, MemoryError> {
        let resp = req.send().await.map_err(transport_err)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        debug!(%status, %message, "bridge returned an error");
        Err(match status {
            StatusCode::NOT_FOUND => match collection {
                Some(name) => MemoryError::CollectionNotFound(name.to_string()),
                None => MemoryError::Backend(message),
            },
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                MemoryError::InvalidArgument(message)
            }
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                MemoryError::StoreUnavailable(message)
            }
            _ => MemoryError::Backend(message),
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        collection: Option<&str>,
    ) -> Result<T, MemoryError> {
        self.send(req, collection)
            .await?
            .json::<T>()
            .await
            .map_err(|e| MemoryError::Backend(format!("unexpected bridge response: {e}")))
    }
}

fn transport_err(e: reqwest::Error) -> MemoryError {
    if e.is_timeout() {
        MemoryError::StoreUnavailable(format!("request timed out: {e}"))
    } else {
        MemoryError::StoreUnavailable(e.to_string())
    }
}

#[async_trait]
impl MemoryStore for RemoteStore {
    async fn heartbeat(&self) -> Result<(), MemoryError> {
        let url = format!("{}/health", self.base_url);
        let resp = self.client.get(&url).send().await.map_err(transport_err)?;
        let status = resp.status();
        let body: HealthBody = resp
            .json()
            .await
            .map_err(|e| MemoryError::Backend(format!("unexpected health response: {e}")))?;
        if status.is_success() && body.status == "ok" {
            Ok(())
        } else {
            Err(MemoryError::StoreUnavailable(
                body.message.unwrap_or_else(|| status.to_string()),
            ))
        }
    }

    async fn create_or_get_collection(&self, name: &str) -> Result<CollectionHandle, MemoryError> {
        let url = self.collection_url(name, "")?;
        let created: CollectionCreated = self.send_json(self.client.post(&url), None).await?;
        Ok(CollectionHandle {
            name: created.name,
            id: created.id,
        })
    }

    async fn upsert_many(
        &self,
        collection: &str,
        records: Vec<MemoryRecord>,
    ) -> Result<(), MemoryError> {
        let url = self.collection_url(collection, "/add")?;
        let body = AddRequest::from_records(records);
        let _: SuccessBody = self
            .send_json(self.client.post(&url).json(&body), Some(collection))
            .await?;
        Ok(())
    }

    async fn query_columns(
        &self,
        collection: &str,
        query_text: &str,
        limit: usize,
        predicate: Option<&Predicate>,
    ) -> Result<QueryColumns, MemoryError> {
        let url = self.collection_url(collection, "/query")?;
        let body = QueryRequest {
            query_texts: vec![query_text.to_string()],
            n_results: limit,
            where_clause: predicate.map(Predicate::to_where),
        };
        self.send_json(self.client.post(&url).json(&body), Some(collection))
            .await
    }

    async fn get_columns(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<GetColumns, MemoryError> {
        let url = self.collection_url(collection, "/get")?;
        let body = GetRequest { ids: ids.to_vec() };
        self.send_json(self.client.post(&url).json(&body), Some(collection))
            .await
    }

    async fn delete_collection(&self, name: &str) -> Result<DeleteOutcome, MemoryError> {
        let url = self.collection_url(name, "")?;
        let body: SuccessBody = self.send_json(self.client.delete(&url), None).await?;
        Ok(match body.note {
            Some(note) => DeleteOutcome::NotFound { note },
            None => DeleteOutcome::Deleted,
        })
    }

    async fn list_collections(&self) -> Result<Vec<String>, MemoryError> {
        let url = format!("{}/collections", self.base_url);
        let body: CollectionsBody = self.send_json(self.client.get(&url), None).await?;
        Ok(body.collections)
    }

    async fn count(&self, collection: &str) -> Result<CountOutcome, MemoryError> {
        let url = self.collection_url(collection, "/count")?;
        match self
            .send_json::<CountBody>(self.client.get(&url), Some(collection))
            .await
        {
            Ok(body) => Ok(CountOutcome::Counted(body.count)),
            Err(e @ MemoryError::CollectionNotFound(_)) => Ok(CountOutcome::Missing {
                error: e.to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let store = RemoteStore::new("http://localhost:8001/", None).unwrap();
        assert_eq!(store.base_url(), "http://localhost:8001");
        assert_eq!(
            store.collection_url("npc1", "/add").unwrap(),
            "http://localhost:8001/collection/npc1/add"
        );
    }

    #[test]
    fn invalid_collection_name_never_reaches_the_network() {
        let store = RemoteStore::new("http://localhost:8001", None).unwrap();
        assert!(matches!(
            store.collection_url("../etc", "").unwrap_err(),
            MemoryError::InvalidArgument(_)
        ));
    }

    #[tokio::test]
    async fn unreachable_bridge_is_store_unavailable() {
        // Port 9 (discard) on localhost is reliably closed in test sandboxes.
        let store = RemoteStore::new("http://127.0.0.1:9", Some(Duration::from_secs(2))).unwrap();
        let err = store.list_collections().await.unwrap_err();
        assert!(matches!(err, MemoryError::StoreUnavailable(_)), "{err:?}");
    }
}
