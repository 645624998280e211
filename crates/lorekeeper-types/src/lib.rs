//! `lorekeeper-types` – shared data model for the Lorekeeper memory bridge.
//!
//! Every other crate in the workspace speaks in terms of the types defined
//! here: memory records and their scalar metadata, query results, collection
//! handles, the abstract metadata [`Predicate`], and the global
//! [`MemoryError`] taxonomy.

pub mod predicate;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use predicate::Predicate;

// ─────────────────────────────────────────────────────────────────────────────
// Metadata
// ─────────────────────────────────────────────────────────────────────────────

/// A single scalar metadata value.
///
/// Nested objects, arrays and `null` are not representable; the external
/// store only indexes flat scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetadataValue {
    /// Numeric view of this value, or `None` for strings and booleans.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            MetadataValue::Bool(_) | MetadataValue::Str(_) => None,
        }
    }

    /// Equality that treats `Int(2)` and `Float(2.0)` as the same number.
    pub fn loosely_eq(&self, other: &MetadataValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Convert a JSON value into a scalar, rejecting `null`, arrays and
    /// objects.
    pub fn from_json(value: &serde_json::Value) -> Option<MetadataValue> {
        match value {
            serde_json::Value::Bool(b) => Some(MetadataValue::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(MetadataValue::Int)
                .or_else(|| n.as_f64().map(MetadataValue::Float)),
            serde_json::Value::String(s) => Some(MetadataValue::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            MetadataValue::Bool(b) => serde_json::Value::Bool(*b),
            MetadataValue::Int(i) => serde_json::Value::from(*i),
            MetadataValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            MetadataValue::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        MetadataValue::Int(v.into())
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Str(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Str(v)
    }
}

/// Flat string → scalar mapping attached to every memory record.
pub type Metadata = BTreeMap<String, MetadataValue>;

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// A single memory record as stored in a collection.
///
/// Identity is `id`; an upsert with the same `id` replaces the document and
/// metadata wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub document: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl MemoryRecord {
    pub fn new(id: impl Into<String>, document: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            document: document.into(),
            metadata,
        }
    }
}

/// One entry of a similarity query, nearest first.
///
/// `distance` is the store's opaque relevance score (lower is closer) and is
/// passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResultItem {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub distance: f64,
}

/// Identity of a collection returned by create-or-get.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionHandle {
    pub name: String,
    pub id: Uuid,
}

/// Result of deleting a collection. A missing collection is not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound { note: String },
}

/// Result of counting a collection. A missing collection counts as zero and
/// carries the reason instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountOutcome {
    Counted(usize),
    Missing { error: String },
}

impl CountOutcome {
    pub fn count(&self) -> usize {
        match self {
            CountOutcome::Counted(n) => *n,
            CountOutcome::Missing { .. } => 0,
        }
    }
}

/// Maximum length of a collection name.
pub const MAX_COLLECTION_NAME_LEN: usize = 63;

/// Check that `name` is usable both as a store key and as a URL path segment.
///
/// Accepts 1–63 characters drawn from `[A-Za-z0-9._-]`.
pub fn validate_collection_name(name: &str) -> Result<(), MemoryError> {
    if name.is_empty() || name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(MemoryError::InvalidArgument(format!(
            "collection name must be 1-{MAX_COLLECTION_NAME_LEN} characters, got {}",
            name.len()
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(MemoryError::InvalidArgument(format!(
            "collection name {name:?} contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Global error type spanning input decoding, dispatcher misuse and store
/// failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemoryError {
    #[error("Invalid base64 data: {0}")]
    MalformedToken(String),

    #[error("Invalid metadata: {0}")]
    MalformedMetadata(String),

    #[error("Collection {0} does not exist")]
    CollectionNotFound(String),

    #[error("Memory store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("{command} expects at least {expected} argument(s), got {got}")]
    Arity {
        command: String,
        expected: usize,
        got: usize,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Store error: {0}")]
    Backend(String),
}

impl MemoryError {
    /// Decode-stage faults are caller input problems the CLI reports with a
    /// zero exit status; everything else is fatal for the invocation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MemoryError::MalformedToken(_) | MemoryError::MalformedMetadata(_)
        )
    }

    /// HTTP status the bridge answers with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            MemoryError::MalformedToken(_)
            | MemoryError::MalformedMetadata(_)
            | MemoryError::UnknownCommand(_)
            | MemoryError::Arity { .. }
            | MemoryError::InvalidArgument(_) => 400,
            MemoryError::CollectionNotFound(_) => 404,
            MemoryError::StoreUnavailable(_) => 503,
            MemoryError::Backend(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_value_deserializes_each_scalar_kind() {
        let meta: Metadata = serde_json::from_str(
            r#"{"importance": 8, "weight": 0.5, "hostile": false, "emotion": "grateful"}"#,
        )
        .unwrap();
        assert_eq!(meta["importance"], MetadataValue::Int(8));
        assert_eq!(meta["weight"], MetadataValue::Float(0.5));
        assert_eq!(meta["hostile"], MetadataValue::Bool(false));
        assert_eq!(meta["emotion"], MetadataValue::Str("grateful".into()));
    }

    #[test]
    fn metadata_rejects_nested_values() {
        let res: Result<Metadata, _> = serde_json::from_str(r#"{"tags": ["a", "b"]}"#);
        assert!(res.is_err());
        let res: Result<Metadata, _> = serde_json::from_str(r#"{"owner": null}"#);
        assert!(res.is_err());
    }

    #[test]
    fn loosely_eq_crosses_int_and_float() {
        assert!(MetadataValue::Int(2).loosely_eq(&MetadataValue::Float(2.0)));
        assert!(!MetadataValue::Int(2).loosely_eq(&MetadataValue::Str("2".into())));
        assert!(MetadataValue::Str("tier2".into()).loosely_eq(&"tier2".into()));
    }

    #[test]
    fn record_without_metadata_defaults_to_empty() {
        let rec: MemoryRecord =
            serde_json::from_str(r#"{"id": "m1", "document": "hello"}"#).unwrap();
        assert!(rec.metadata.is_empty());
    }

    #[test]
    fn count_outcome_missing_is_zero() {
        let missing = CountOutcome::Missing {
            error: "gone".into(),
        };
        assert_eq!(missing.count(), 0);
        assert_eq!(CountOutcome::Counted(3).count(), 3);
    }

    #[test]
    fn collection_name_validation() {
        assert!(validate_collection_name("npc_42.memories-v2").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("has space").is_err());
        assert!(validate_collection_name("slash/name").is_err());
        assert!(validate_collection_name(&"x".repeat(64)).is_err());
    }

    #[test]
    fn error_classification() {
        assert!(MemoryError::MalformedToken("x".into()).is_recoverable());
        assert!(MemoryError::MalformedMetadata("x".into()).is_recoverable());
        assert!(!MemoryError::CollectionNotFound("npc1".into()).is_recoverable());
        assert!(!MemoryError::UnknownCommand("frobnicate".into()).is_recoverable());

        assert_eq!(MemoryError::CollectionNotFound("npc1".into()).http_status(), 404);
        assert_eq!(MemoryError::StoreUnavailable("down".into()).http_status(), 503);
        assert_eq!(MemoryError::InvalidArgument("bad".into()).http_status(), 400);
        assert_eq!(MemoryError::Backend("disk".into()).http_status(), 500);
    }

    #[test]
    fn error_display() {
        let err = MemoryError::Arity {
            command: "add_memory".into(),
            expected: 3,
            got: 1,
        };
        assert_eq!(err.to_string(), "add_memory expects at least 3 argument(s), got 1");
        assert!(
            MemoryError::CollectionNotFound("npc1".into())
                .to_string()
                .contains("npc1")
        );
    }
}
