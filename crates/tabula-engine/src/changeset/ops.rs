use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::delta::Delta;
use crate::json::NodeData;
use crate::model::Location;

/// An executed document operation, as recorded in the
/// [`ChangesetApplied`](crate::state::ChangesetApplied) event.
///
/// Locations are captured at execution time, so replaying the list in order
/// against an equal document reproduces the change, and every op carries
/// enough of the prior state to be inverted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChangesetOp {
    /// `location` addresses the first inserted child.
    InsertNodes {
        location: Location,
        children: Vec<NodeData>,
    },
    /// `location` addresses the child that was removed; `children` holds
    /// the serialized subtrees for inversion.
    RemoveNodes {
        location: Location,
        children: Vec<NodeData>,
    },
    /// A text-model edit under attribute `key` of the node at `location`.
    TextEdit {
        location: Location,
        key: String,
        delta: Delta,
        invert: Delta,
    },
    /// Shallow attribute merge; `old_attributes` holds the replaced values
    /// (null for keys that were absent).
    UpdateAttributes {
        location: Location,
        attributes: Map<String, Value>,
        old_attributes: Map<String, Value>,
    },
}

impl ChangesetOp {
    pub fn location(&self) -> &Location {
        match self {
            ChangesetOp::InsertNodes { location, .. }
            | ChangesetOp::RemoveNodes { location, .. }
            | ChangesetOp::TextEdit { location, .. }
            | ChangesetOp::UpdateAttributes { location, .. } => location,
        }
    }

    /// The operation that undoes this one.
    pub fn invert(&self) -> ChangesetOp {
        match self {
            ChangesetOp::InsertNodes { location, children } => ChangesetOp::RemoveNodes {
                location: location.clone(),
                children: children.clone(),
            },
            ChangesetOp::RemoveNodes { location, children } => ChangesetOp::InsertNodes {
                location: location.clone(),
                children: children.clone(),
            },
            ChangesetOp::TextEdit { location, key, delta, invert } => ChangesetOp::TextEdit {
                location: location.clone(),
                key: key.clone(),
                delta: invert.clone(),
                invert: delta.clone(),
            },
            ChangesetOp::UpdateAttributes { location, attributes, old_attributes } => {
                ChangesetOp::UpdateAttributes {
                    location: location.clone(),
                    attributes: old_attributes.clone(),
                    old_attributes: attributes.clone(),
                }
            }
        }
    }

    /// How many siblings this op inserts (positive) or removes (negative)
    /// at its location; zero for non-structural ops.
    pub fn structural_delta(&self) -> isize {
        match self {
            ChangesetOp::InsertNodes { children, .. } => children.len() as isize,
            ChangesetOp::RemoveNodes { children, .. } => -(children.len() as isize),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_ops() -> Vec<ChangesetOp> {
        vec![
            ChangesetOp::InsertNodes {
                location: Location::from_indices([1, 0]),
                children: vec![NodeData::new("Text", "blk-000001")],
            },
            ChangesetOp::RemoveNodes {
                location: Location::from_indices([1, 2]),
                children: vec![NodeData::new("Text", "blk-000002")],
            },
            ChangesetOp::TextEdit {
                location: Location::from_indices([1, 0]),
                key: "textContent".to_string(),
                delta: Delta::new().retain(2).insert("x"),
                invert: Delta::new().retain(2).delete(1),
            },
            ChangesetOp::UpdateAttributes {
                location: Location::from_indices([1, 0]),
                attributes: [("textType".to_string(), json!("heading1"))].into_iter().collect(),
                old_attributes: [("textType".to_string(), json!(null))].into_iter().collect(),
            },
        ]
    }

    #[test]
    fn test_double_invert_is_identity() {
        for op in sample_ops() {
            assert_eq!(op.invert().invert(), op);
        }
    }

    #[test]
    fn test_invert_swaps_structural_ops() {
        let insert = &sample_ops()[0];
        assert!(matches!(insert.invert(), ChangesetOp::RemoveNodes { .. }));
        assert_eq!(insert.structural_delta(), 1);
        assert_eq!(insert.invert().structural_delta(), -1);
    }

    #[test]
    fn test_op_json_round_trip() {
        for op in sample_ops() {
            let text = serde_json::to_string(&op).unwrap();
            let back: ChangesetOp = serde_json::from_str(&text).unwrap();
            assert_eq!(back, op);
        }
    }
}
