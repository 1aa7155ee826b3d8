//! Attribute maps attached to retain/insert operations.
//!
//! Values are arbitrary JSON. A `null` value on a retain clears the key when
//! composed onto a document; document inserts never carry nulls.

use std::collections::BTreeMap;

use serde_json::Value;

pub type AttributeMap = BTreeMap<String, Value>;

/// Build an attribute map from `(key, value)` pairs.
pub fn attrs<K: Into<String>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> AttributeMap {
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Overlay `b` onto `a`. When `keep_null` is false (composing onto document
/// content) null values are dropped instead of stored.
pub fn compose(a: Option<&AttributeMap>, b: Option<&AttributeMap>, keep_null: bool) -> Option<AttributeMap> {
    let mut out = a.cloned().unwrap_or_default();
    if let Some(b) = b {
        for (k, v) in b {
            out.insert(k.clone(), v.clone());
        }
    }
    if !keep_null {
        out.retain(|_, v| !v.is_null());
    }
    if out.is_empty() { None } else { Some(out) }
}

/// The retain attributes that turn `a` into `b`: changed keys take `b`'s
/// value, keys missing from `b` become null.
pub fn diff(a: Option<&AttributeMap>, b: Option<&AttributeMap>) -> Option<AttributeMap> {
    let empty = AttributeMap::new();
    let a = a.unwrap_or(&empty);
    let b = b.unwrap_or(&empty);
    let mut out = AttributeMap::new();
    for key in a.keys().chain(b.keys()) {
        if a.get(key) != b.get(key) {
            out.insert(key.clone(), b.get(key).cloned().unwrap_or(Value::Null));
        }
    }
    if out.is_empty() { None } else { Some(out) }
}

/// The retain attributes that undo applying `applied` on top of `base`.
pub fn invert(applied: &AttributeMap, base: Option<&AttributeMap>) -> Option<AttributeMap> {
    let empty = AttributeMap::new();
    let base = base.unwrap_or(&empty);
    let mut out = AttributeMap::new();
    for (key, value) in applied {
        let base_value = base.get(key).cloned().unwrap_or(Value::Null);
        if base_value != *value {
            out.insert(key.clone(), base_value);
        }
    }
    if out.is_empty() { None } else { Some(out) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_compose_overlays_and_drops_null() {
        let base = attrs([("bold", json!(true)), ("href", json!("a"))]);
        let patch = attrs([("bold", json!(null)), ("italic", json!(true))]);

        let kept = compose(Some(&base), Some(&patch), true).unwrap();
        assert_eq!(kept.get("bold"), Some(&json!(null)));

        let dropped = compose(Some(&base), Some(&patch), false).unwrap();
        assert!(!dropped.contains_key("bold"));
        assert_eq!(dropped.get("italic"), Some(&json!(true)));
        assert_eq!(dropped.get("href"), Some(&json!("a")));
    }

    #[test]
    fn test_compose_empty_result_is_none() {
        let patch = attrs([("bold", json!(null))]);
        assert_eq!(compose(None, Some(&patch), false), None);
    }

    #[test]
    fn test_diff_emits_changed_and_removed_keys() {
        let a = attrs([("bold", json!(true)), ("href", json!("x"))]);
        let b = attrs([("href", json!("y")), ("italic", json!(true))]);

        let d = diff(Some(&a), Some(&b)).unwrap();
        assert_eq!(d.get("bold"), Some(&json!(null)));
        assert_eq!(d.get("href"), Some(&json!("y")));
        assert_eq!(d.get("italic"), Some(&json!(true)));

        assert_eq!(diff(Some(&a), Some(&a)), None);
    }

    #[test]
    fn test_invert_restores_base_values() {
        let base = attrs([("bold", json!(true))]);
        let applied = attrs([("bold", json!(null)), ("italic", json!(true))]);

        let inv = invert(&applied, Some(&base)).unwrap();
        assert_eq!(inv.get("bold"), Some(&json!(true)));
        assert_eq!(inv.get("italic"), Some(&json!(null)));
    }
}
