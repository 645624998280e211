//! [`BridgeServer`] – HTTP surface over a [`MemoryStore`].
//!
//! Listens on `0.0.0.0:8001` by default (configurable via
//! [`BridgeServer::with_host`] and [`BridgeServer::with_port`]).
//!
//! | method | path | body | answer |
//! |---|---|---|---|
//! | GET | `/health` | – | `{status:"ok"}` / 500 `{status:"error", message}` |
//! | GET | `/collections` | – | `{collections:[...]}` |
//! | POST | `/collection/{name}` | – | `{name, id}` |
//! | DELETE | `/collection/{name}` | – | `{success:true}` (plus `note` if it did not exist) |
//! | POST | `/collection/{name}/add` | `{ids, documents, metadatas}` | `{success:true}` |
//! | POST | `/collection/{name}/query` | `{query_texts, n_results, where?}` | raw columnar result |
//! | POST | `/collection/{name}/get` | `{ids}` | `{ids, documents, metadatas}` |
//! | GET | `/collection/{name}/count` | – | `{count}` / 404 `{error, count:0}` |
//!
//! Every failure answers with `{error}` and a 4xx/5xx status derived from
//! [`MemoryError::http_status`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use lorekeeper_store::{GetColumns, MemoryStore, QueryColumns};
use lorekeeper_types::{CountOutcome, DeleteOutcome, MemoryError, Predicate, validate_collection_name};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::wire::{
    AddRequest, CollectionCreated, CollectionsBody, CountBody, ErrorBody, GetRequest, HealthBody,
    QueryRequest, SuccessBody,
};

/// Default TCP port for the bridge.
pub const DEFAULT_PORT: u16 = 8001;

/// Default bind address for the bridge.
pub const DEFAULT_HOST: &str = "0.0.0.0";

// ---------------------------------------------------------------------------
// BridgeServer
// ---------------------------------------------------------------------------

/// HTTP server exposing one [`MemoryStore`] to out-of-process callers.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use lorekeeper_bridge::BridgeServer;
/// use lorekeeper_store::SqliteStore;
///
/// #[tokio::main]
/// async fn main() {
///     let store = Arc::new(SqliteStore::open("memories.db").expect("open store"));
///     BridgeServer::new(store)
///         .run()
///         .await
///         .expect("bridge server failed");
/// }
/// ```
pub struct BridgeServer {
    store: Arc<dyn MemoryStore>,
    host: String,
    port: u16,
}

impl BridgeServer {
    /// Create a server backed by `store` on [`DEFAULT_HOST`]:[`DEFAULT_PORT`].
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }

    /// Override the bind address (builder-style).
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind and serve until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::StoreUnavailable`] if the listener cannot bind
    /// or the server loop fails.
    pub async fn run(self) -> Result<(), MemoryError> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("bind error on {addr}: {e}")))?;

        info!(%addr, "lorekeeper bridge listening");

        axum::serve(listener, router(self.store))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| MemoryError::StoreUnavailable(format!("server error: {e}")))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C; shutting down");
    }
    info!("shutdown signal received");
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the bridge router over `store`.
pub fn router(store: Arc<dyn MemoryStore>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/collections", get(list_collections))
        .route(
            "/collection/{name}",
            post(create_collection).delete(delete_collection),
        )
        .route("/collection/{name}/add", post(add))
        .route("/collection/{name}/query", post(query))
        .route("/collection/{name}/get", post(get_records))
        .route("/collection/{name}/count", get(count))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

type AppState = Arc<dyn MemoryStore>;

/// Maps a [`MemoryError`] onto `{error}` with the matching status.
struct ApiError(MemoryError);

impl From<MemoryError> for ApiError {
    fn from(e: MemoryError) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(MemoryError::InvalidArgument(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(error = %self.0, "bridge request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            count: None,
        };
        (status, Json(body)).into_response()
    }
}

fn collection_path(name: &str) -> Result<(), ApiError> {
    validate_collection_name(name).map_err(ApiError)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(store): State<AppState>) -> Response {
    match store.heartbeat().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthBody {
                status: "ok".to_string(),
                message: None,
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(HealthBody {
                status: "error".to_string(),
                message: Some(e.to_string()),
            }),
        )
            .into_response(),
    }
}

async fn list_collections(State(store): State<AppState>) -> Result<Json<CollectionsBody>, ApiError> {
    let collections = store.list_collections().await?;
    Ok(Json(CollectionsBody { collections }))
}

async fn create_collection(
    State(store): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CollectionCreated>, ApiError> {
    collection_path(&name)?;
    let handle = store.create_or_get_collection(&name).await?;
    Ok(Json(CollectionCreated {
        name: handle.name,
        id: handle.id,
    }))
}

async fn delete_collection(
    State(store): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SuccessBody>, ApiError> {
    collection_path(&name)?;
    let body = match store.delete_collection(&name).await? {
        DeleteOutcome::Deleted => SuccessBody::ok(),
        DeleteOutcome::NotFound { note } => SuccessBody {
            success: true,
            note: Some(note),
        },
    };
    Ok(Json(body))
}

async fn add(
    State(store): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<AddRequest>, JsonRejection>,
) -> Result<Json<SuccessBody>, ApiError> {
    collection_path(&name)?;
    let Json(req) = payload?;
    let records = req.into_records()?;
    store.upsert_many(&name, records).await?;
    Ok(Json(SuccessBody::ok()))
}

async fn query(
    State(store): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryColumns>, ApiError> {
    collection_path(&name)?;
    let Json(req) = payload?;
    if req.query_texts.is_empty() {
        return Err(MemoryError::InvalidArgument("query_texts must not be empty".into()).into());
    }
    if req.n_results == 0 {
        return Err(MemoryError::InvalidArgument("n_results must be at least 1".into()).into());
    }
    let predicate = req
        .where_clause
        .as_ref()
        .map(Predicate::from_where)
        .transpose()?;

    let mut merged = QueryColumns::empty();
    for text in &req.query_texts {
        let batch = store
            .query_columns(&name, text, req.n_results, predicate.as_ref())
            .await?;
        merged.push_batch(batch);
    }
    Ok(Json(merged))
}

async fn get_records(
    State(store): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<GetRequest>, JsonRejection>,
) -> Result<Json<GetColumns>, ApiError> {
    collection_path(&name)?;
    let Json(req) = payload?;
    Ok(Json(store.get_columns(&name, &req.ids).await?))
}

async fn count(
    State(store): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    collection_path(&name)?;
    let response = match store.count(&name).await? {
        CountOutcome::Counted(count) => (StatusCode::OK, Json(CountBody { count })).into_response(),
        CountOutcome::Missing { error } => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error,
                count: Some(0),
            }),
        )
            .into_response(),
    };
    Ok(response)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use lorekeeper_store::SqliteStore;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = call(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let app = app();
        let (status, first) = call(&app, "POST", "/collection/npc1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["name"], "npc1");
        let (_, second) = call(&app, "POST", "/collection/npc1", None).await;
        assert_eq!(first["id"], second["id"]);
    }

    #[tokio::test]
    async fn add_then_query_returns_raw_columns() {
        let app = app();
        call(&app, "POST", "/collection/npc1", None).await;
        let (status, body) = call(
            &app,
            "POST",
            "/collection/npc1/add",
            Some(json!({
                "ids": ["mem1", "mem2"],
                "documents": ["The player helped me with the sword quest", "The merchant sells bread"],
                "metadatas": [{"importance": 8}, {"importance": 3}]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true}));

        let (status, body) = call(
            &app,
            "POST",
            "/collection/npc1/query",
            Some(json!({
                "query_texts": ["sword quest"],
                "n_results": 5,
                "where": {"importance": {"$gte": 5}}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ids"], json!([["mem1"]]));
        assert_eq!(body["metadatas"][0][0]["importance"], 8);
        assert!(body["distances"][0][0].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn query_with_two_texts_nests_two_batches() {
        let app = app();
        call(&app, "POST", "/collection/npc1", None).await;
        let (_, body) = call(
            &app,
            "POST",
            "/collection/npc1/query",
            Some(json!({"query_texts": ["a", "b"]})),
        )
        .await;
        assert_eq!(body["documents"], json!([[], []]));
    }

    #[tokio::test]
    async fn add_to_missing_collection_is_404_and_creates_nothing() {
        let app = app();
        let (status, body) = call(
            &app,
            "POST",
            "/collection/ghost/add",
            Some(json!({"ids": ["a"], "documents": ["x"]})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("ghost"));

        let (_, list) = call(&app, "GET", "/collections", None).await;
        assert_eq!(list, json!({"collections": []}));
    }

    #[tokio::test]
    async fn malformed_bodies_are_400() {
        let app = app();
        call(&app, "POST", "/collection/npc1", None).await;
        let (status, body) = call(
            &app,
            "POST",
            "/collection/npc1/add",
            Some(json!({"ids": ["a", "b"], "documents": ["x"]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("error").is_some());

        let (status, _) = call(
            &app,
            "POST",
            "/collection/npc1/query",
            Some(json!({"query_texts": ["x"], "where": {"$or": []}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            "/collection/npc1/add",
            Some(json!({"ids": ["a"], "documents": ["x"], "metadatas": [{"tags": [1]}]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_collection_name_is_400() {
        let (status, _) = call(&app(), "POST", "/collection/bad%20name", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_missing_collection_succeeds_with_note() {
        let (status, body) = call(&app(), "DELETE", "/collection/ghost", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["note"].is_string());
    }

    #[tokio::test]
    async fn count_and_get() {
        let app = app();
        let (status, body) = call(&app, "GET", "/collection/npc1/count", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["count"], 0);

        call(&app, "POST", "/collection/npc1", None).await;
        call(
            &app,
            "POST",
            "/collection/npc1/add",
            Some(json!({"ids": ["m1"], "documents": ["remembered"]})),
        )
        .await;
        let (status, body) = call(&app, "GET", "/collection/npc1/count", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"count": 1}));

        let (_, body) = call(
            &app,
            "POST",
            "/collection/npc1/get",
            Some(json!({"ids": ["m1", "missing"]})),
        )
        .await;
        assert_eq!(body["ids"], json!(["m1"]));
        assert_eq!(body["documents"], json!(["remembered"]));
    }
}
