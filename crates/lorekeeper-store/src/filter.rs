//! Filter builder.
//!
//! Callers narrow a similarity query with at most two scalar constraints: a
//! minimum importance and an exact memory tier. [`build`] turns whichever of
//! them are present into one [`Predicate`], or into no filter at all.

use lorekeeper_types::{MetadataValue, Predicate};
use serde_json::Number;

/// Metadata field compared against the minimum importance.
pub const IMPORTANCE_FIELD: &str = "importance";
/// Metadata field compared against the requested tier.
pub const TIER_FIELD: &str = "memory_tier";

/// Build the metadata filter for a query.
///
/// * no constraint → `None`; the request carries no `where` at all
/// * one constraint → that atomic predicate, unwrapped
/// * both → `And([importance, tier])` in that order
pub fn build(min_importance: Option<Number>, tier: Option<MetadataValue>) -> Option<Predicate> {
    let mut parts = Vec::with_capacity(2);
    if let Some(min) = min_importance {
        parts.push(Predicate::at_least(IMPORTANCE_FIELD, min));
    }
    if let Some(tier) = tier {
        parts.push(Predicate::equals(TIER_FIELD, tier));
    }
    Predicate::all(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_constraints_means_no_filter() {
        assert_eq!(build(None, None), None);
    }

    #[test]
    fn importance_alone_is_not_wrapped() {
        let p = build(Some(5.into()), None).unwrap();
        assert_eq!(p, Predicate::at_least("importance", 5.into()));
        assert_eq!(p.to_where(), json!({"importance": {"$gte": 5}}));
    }

    #[test]
    fn tier_alone_is_not_wrapped() {
        let p = build(None, Some(MetadataValue::Int(2))).unwrap();
        assert_eq!(p, Predicate::equals("memory_tier", 2));
        assert_eq!(p.to_where(), json!({"memory_tier": 2}));
    }

    #[test]
    fn both_constraints_form_ordered_conjunction() {
        let p = build(Some(5.into()), Some(MetadataValue::Str("tier2".into()))).unwrap();
        assert_eq!(
            p,
            Predicate::And(vec![
                Predicate::at_least("importance", 5.into()),
                Predicate::equals("memory_tier", "tier2"),
            ])
        );
        assert_eq!(
            p.to_where(),
            json!({"$and": [{"importance": {"$gte": 5}}, {"memory_tier": "tier2"}]})
        );
    }
}
