use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::attributes::AttributeMap;

/// The payload of an insert: a text run or an embedded object (image,
/// mention, ...). Embeds occupy exactly one position in delta space.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertValue {
    Text(String),
    Embed(Value),
}

impl InsertValue {
    pub fn len(&self) -> usize {
        match self {
            InsertValue::Text(s) => s.chars().count(),
            InsertValue::Embed(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, InsertValue::Text(s) if s.is_empty())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            InsertValue::Text(s) => Some(s),
            InsertValue::Embed(_) => None,
        }
    }
}

/// One delta operation. Lengths count characters, not bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaOp {
    Retain {
        n: usize,
        attributes: Option<AttributeMap>,
    },
    Insert {
        value: InsertValue,
        attributes: Option<AttributeMap>,
    },
    Delete {
        n: usize,
    },
}

impl DeltaOp {
    pub fn retain(n: usize) -> Self {
        DeltaOp::Retain { n, attributes: None }
    }

    pub fn retain_with(n: usize, attributes: AttributeMap) -> Self {
        DeltaOp::Retain { n, attributes: Some(attributes) }
    }

    pub fn insert(text: impl Into<String>) -> Self {
        DeltaOp::Insert {
            value: InsertValue::Text(text.into()),
            attributes: None,
        }
    }

    pub fn insert_with(text: impl Into<String>, attributes: AttributeMap) -> Self {
        DeltaOp::Insert {
            value: InsertValue::Text(text.into()),
            attributes: Some(attributes),
        }
    }

    pub fn insert_embed(value: Value, attributes: Option<AttributeMap>) -> Self {
        DeltaOp::Insert {
            value: InsertValue::Embed(value),
            attributes,
        }
    }

    pub fn delete(n: usize) -> Self {
        DeltaOp::Delete { n }
    }

    /// Length of the op in delta space.
    pub fn len(&self) -> usize {
        match self {
            DeltaOp::Retain { n, .. } | DeltaOp::Delete { n } => *n,
            DeltaOp::Insert { value, .. } => value.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn attributes(&self) -> Option<&AttributeMap> {
        match self {
            DeltaOp::Retain { attributes, .. } | DeltaOp::Insert { attributes, .. } => {
                attributes.as_ref()
            }
            DeltaOp::Delete { .. } => None,
        }
    }
}

// The wire form follows the usual rich-text convention:
// {"retain": n}, {"insert": "text"}, {"insert": {...}}, {"delete": n},
// each optionally with {"attributes": {...}}.

impl Serialize for DeltaOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let attributes = self.attributes();
        let entries = 1 + usize::from(attributes.is_some());
        let mut map = serializer.serialize_map(Some(entries))?;
        match self {
            DeltaOp::Retain { n, .. } => map.serialize_entry("retain", n)?,
            DeltaOp::Delete { n } => map.serialize_entry("delete", n)?,
            DeltaOp::Insert { value: InsertValue::Text(s), .. } => {
                map.serialize_entry("insert", s)?
            }
            DeltaOp::Insert { value: InsertValue::Embed(v), .. } => {
                map.serialize_entry("insert", v)?
            }
        }
        if let Some(attributes) = attributes {
            map.serialize_entry("attributes", attributes)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DeltaOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OpVisitor;

        impl<'de> Visitor<'de> for OpVisitor {
            type Value = DeltaOp;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a retain/insert/delete operation map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<DeltaOp, A::Error> {
                let mut retain: Option<usize> = None;
                let mut delete: Option<usize> = None;
                let mut insert: Option<Value> = None;
                let mut attributes: Option<AttributeMap> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "retain" => retain = Some(map.next_value()?),
                        "delete" => delete = Some(map.next_value()?),
                        "insert" => insert = Some(map.next_value()?),
                        "attributes" => attributes = Some(map.next_value()?),
                        other => return Err(de::Error::unknown_field(other, &["retain", "delete", "insert", "attributes"])),
                    }
                }

                match (retain, delete, insert) {
                    (Some(n), None, None) => Ok(DeltaOp::Retain { n, attributes }),
                    (None, Some(n), None) => Ok(DeltaOp::Delete { n }),
                    (None, None, Some(Value::String(s))) => Ok(DeltaOp::Insert {
                        value: InsertValue::Text(s),
                        attributes,
                    }),
                    (None, None, Some(v)) => Ok(DeltaOp::Insert {
                        value: InsertValue::Embed(v),
                        attributes,
                    }),
                    _ => Err(de::Error::custom(
                        "operation must have exactly one of retain/insert/delete",
                    )),
                }
            }
        }

        deserializer.deserialize_map(OpVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::attributes::attrs;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_op_lengths_are_char_counts() {
        assert_eq!(DeltaOp::insert("héllo").len(), 5);
        assert_eq!(DeltaOp::insert("🦀").len(), 1);
        assert_eq!(DeltaOp::insert_embed(json!({"image": "x.png"}), None).len(), 1);
        assert_eq!(DeltaOp::retain(4).len(), 4);
        assert_eq!(DeltaOp::delete(2).len(), 2);
    }

    #[test]
    fn test_op_json_round_trip() {
        let ops = vec![
            DeltaOp::insert("ab"),
            DeltaOp::insert_with("cd", attrs([("bold", json!(true))])),
            DeltaOp::insert_embed(json!({"image": "x.png"}), None),
            DeltaOp::retain(3),
            DeltaOp::retain_with(1, attrs([("href", json!(null))])),
            DeltaOp::delete(2),
        ];
        for op in ops {
            let text = serde_json::to_string(&op).unwrap();
            let back: DeltaOp = serde_json::from_str(&text).unwrap();
            assert_eq!(back, op);
        }
    }

    #[test]
    fn test_op_json_shape() {
        let op = DeltaOp::insert_with("hi", attrs([("bold", json!(true))]));
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value, json!({"insert": "hi", "attributes": {"bold": true}}));

        let op = DeltaOp::retain(7);
        assert_eq!(serde_json::to_value(&op).unwrap(), json!({"retain": 7}));
    }

    #[test]
    fn test_op_json_rejects_ambiguous_map() {
        let err = serde_json::from_str::<DeltaOp>(r#"{"retain": 1, "delete": 2}"#);
        assert!(err.is_err());
    }
}
