//! Abstract metadata predicates.
//!
//! A [`Predicate`] is a boolean expression over record metadata used to
//! narrow a similarity search. Two atomic forms exist, "field at least a
//! number" and "field equals a value", combined only under logical AND.
//!
//! The store's wire protocol uses a MongoDB-like `where` object. Translation
//! happens in exactly one place in each direction:
//!
//! * [`Predicate::to_where`] – predicate → wire shape
//!   (`{"importance": {"$gte": 5}}`, `{"memory_tier": 2}`, `{"$and": [...]}`)
//! * [`Predicate::from_where`] – wire shape → predicate, rejecting operators
//!   this system does not support.

use serde_json::{Map, Number, Value};

use crate::{Metadata, MemoryError, MetadataValue};

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `field >= threshold`
    AtLeast { field: String, threshold: Number },
    /// `field == value`
    Equals { field: String, value: MetadataValue },
    /// Conjunction of every child, in order.
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn at_least(field: impl Into<String>, threshold: Number) -> Self {
        Predicate::AtLeast {
            field: field.into(),
            threshold,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Predicate::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Combine `parts` under AND.
    ///
    /// Zero parts is no filter at all, a single part is returned unwrapped,
    /// and two or more become one conjunction preserving their order.
    pub fn all(mut parts: Vec<Predicate>) -> Option<Predicate> {
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Predicate::And(parts)),
        }
    }

    /// Serialise into the store's `where` object.
    pub fn to_where(&self) -> Value {
        match self {
            Predicate::AtLeast { field, threshold } => {
                let mut op = Map::new();
                op.insert("$gte".to_string(), Value::Number(threshold.clone()));
                let mut obj = Map::new();
                obj.insert(field.clone(), Value::Object(op));
                Value::Object(obj)
            }
            Predicate::Equals { field, value } => {
                let mut obj = Map::new();
                obj.insert(field.clone(), value.to_json());
                Value::Object(obj)
            }
            Predicate::And(children) => {
                let mut obj = Map::new();
                obj.insert(
                    "$and".to_string(),
                    Value::Array(children.iter().map(Predicate::to_where).collect()),
                );
                Value::Object(obj)
            }
        }
    }

    /// Parse a `where` object produced by [`to_where`][Self::to_where] or by
    /// any client speaking the same dialect.
    ///
    /// Supported: `$and`, `$gte`, `$eq` and bare scalar equality. Every other
    /// operator is an [`MemoryError::InvalidArgument`].
    pub fn from_where(value: &Value) -> Result<Predicate, MemoryError> {
        let obj = value
            .as_object()
            .ok_or_else(|| invalid(format!("where clause must be an object, got {value}")))?;
        if obj.len() != 1 {
            return Err(invalid(format!(
                "where clause must have exactly one key, got {}",
                obj.len()
            )));
        }
        let Some((key, inner)) = obj.iter().next() else {
            return Err(invalid("empty where clause".to_string()));
        };

        if key == "$and" {
            let items = inner
                .as_array()
                .ok_or_else(|| invalid("$and expects an array".to_string()))?;
            if items.is_empty() {
                return Err(invalid("$and expects at least one clause".to_string()));
            }
            let children = items
                .iter()
                .map(Predicate::from_where)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Predicate::And(children));
        }
        if key.starts_with('$') {
            return Err(invalid(format!("unsupported logical operator {key}")));
        }

        match inner {
            Value::Object(ops) => {
                if ops.len() != 1 {
                    return Err(invalid(format!(
                        "field {key} must carry exactly one operator"
                    )));
                }
                let Some((op, operand)) = ops.iter().next() else {
                    return Err(invalid(format!("field {key} has no operator")));
                };
                match op.as_str() {
                    "$gte" => match operand {
                        Value::Number(n) => Ok(Predicate::at_least(key.clone(), n.clone())),
                        other => Err(invalid(format!("$gte on {key} expects a number, got {other}"))),
                    },
                    "$eq" => MetadataValue::from_json(operand)
                        .map(|v| Predicate::equals(key.clone(), v))
                        .ok_or_else(|| invalid(format!("$eq on {key} expects a scalar"))),
                    other => Err(invalid(format!("unsupported operator {other} on {key}"))),
                }
            }
            scalar => MetadataValue::from_json(scalar)
                .map(|v| Predicate::equals(key.clone(), v))
                .ok_or_else(|| invalid(format!("field {key} expects a scalar or operator object"))),
        }
    }

    /// Evaluate against a record's metadata. Missing fields never match.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Predicate::AtLeast { field, threshold } => {
                match (metadata.get(field).and_then(MetadataValue::as_f64), threshold.as_f64()) {
                    (Some(actual), Some(min)) => actual >= min,
                    _ => false,
                }
            }
            Predicate::Equals { field, value } => metadata
                .get(field)
                .is_some_and(|actual| actual.loosely_eq(value)),
            Predicate::And(children) => children.iter().all(|c| c.matches(metadata)),
        }
    }
}

fn invalid(msg: String) -> MemoryError {
    MemoryError::InvalidArgument(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, MetadataValue)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    // ── all ──────────────────────────────────────────────────────────────────

    #[test]
    fn all_of_nothing_is_no_filter() {
        assert_eq!(Predicate::all(vec![]), None);
    }

    #[test]
    fn all_of_one_is_unwrapped() {
        let p = Predicate::equals("memory_tier", 2);
        assert_eq!(Predicate::all(vec![p.clone()]), Some(p));
    }

    #[test]
    fn all_of_many_preserves_order() {
        let a = Predicate::at_least("importance", 5.into());
        let b = Predicate::equals("memory_tier", "tier2");
        assert_eq!(
            Predicate::all(vec![a.clone(), b.clone()]),
            Some(Predicate::And(vec![a, b]))
        );
    }

    // ── to_where ─────────────────────────────────────────────────────────────

    #[test]
    fn to_where_shapes() {
        assert_eq!(
            Predicate::at_least("importance", 5.into()).to_where(),
            json!({"importance": {"$gte": 5}})
        );
        assert_eq!(
            Predicate::equals("memory_tier", 2).to_where(),
            json!({"memory_tier": 2})
        );
        let both = Predicate::And(vec![
            Predicate::at_least("importance", 5.into()),
            Predicate::equals("memory_tier", 2),
        ]);
        assert_eq!(
            both.to_where(),
            json!({"$and": [{"importance": {"$gte": 5}}, {"memory_tier": 2}]})
        );
    }

    // ── from_where ───────────────────────────────────────────────────────────

    #[test]
    fn from_where_inverts_to_where() {
        let p = Predicate::And(vec![
            Predicate::at_least("importance", 5.into()),
            Predicate::equals("memory_tier", "tier2"),
        ]);
        assert_eq!(Predicate::from_where(&p.to_where()).unwrap(), p);
    }

    #[test]
    fn from_where_accepts_explicit_eq() {
        let p = Predicate::from_where(&json!({"emotion": {"$eq": "grateful"}})).unwrap();
        assert_eq!(p, Predicate::equals("emotion", "grateful"));
    }

    #[test]
    fn from_where_rejects_unsupported_operators() {
        for clause in [
            json!({"$or": [{"a": 1}, {"b": 2}]}),
            json!({"importance": {"$lt": 3}}),
            json!({"importance": {"$gte": "high"}}),
            json!({"$and": []}),
            json!({"a": 1, "b": 2}),
            json!([1, 2]),
            json!({"tags": [1, 2]}),
        ] {
            let err = Predicate::from_where(&clause).unwrap_err();
            assert!(matches!(err, MemoryError::InvalidArgument(_)), "{clause}");
        }
    }

    // ── matches ──────────────────────────────────────────────────────────────

    #[test]
    fn at_least_matches_numbers_only() {
        let p = Predicate::at_least("importance", 5.into());
        assert!(p.matches(&meta(&[("importance", MetadataValue::Int(8))])));
        assert!(p.matches(&meta(&[("importance", MetadataValue::Float(5.0))])));
        assert!(!p.matches(&meta(&[("importance", MetadataValue::Int(4))])));
        assert!(!p.matches(&meta(&[("importance", MetadataValue::Str("9".into()))])));
        assert!(!p.matches(&Metadata::new()));
    }

    #[test]
    fn and_requires_every_child() {
        let p = Predicate::And(vec![
            Predicate::at_least("importance", 5.into()),
            Predicate::equals("memory_tier", 2),
        ]);
        let hit = meta(&[
            ("importance", MetadataValue::Int(8)),
            ("memory_tier", MetadataValue::Int(2)),
        ]);
        let miss = meta(&[
            ("importance", MetadataValue::Int(8)),
            ("memory_tier", MetadataValue::Int(1)),
        ]);
        assert!(p.matches(&hit));
        assert!(!p.matches(&miss));
    }
}
