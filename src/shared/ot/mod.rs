//! Operational Transform Types
//!
//! This module provides the two document types the sync engine understands
//! and a single dispatch surface over them.
//!
//! # Types
//!
//! - **`json0`** - structured JSON documents edited by path-scoped components
//! - **`rich_text`** - Quill-style deltas over a flat character sequence
//!
//! # Transform Sides
//!
//! When two operations were composed against the same version, one of them
//! must be ordered first when both insert at the same position. `Side::Left`
//! wins that tie. The backend transforms an incoming op against already
//! committed ops with `Side::Left`; clients transform their pending ops
//! against incoming server ops with `Side::Left` and the server ops against
//! their pending ops with `Side::Right`, so both ends agree.

/// JSON0 components
pub mod json0;

/// Rich-text deltas
pub mod rich_text;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::shared::error::{SharedError, SharedResult};

pub use json0::{Component, ComponentKind, SubtypeOp};
pub use rich_text::{Delta, DeltaOp};

/// Tie-break side for concurrent inserts at the same position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn flip(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Document OT type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OtType {
    #[serde(rename = "json0", alias = "http://sharejs.org/types/JSONv0")]
    Json0,
    #[serde(rename = "rich-text", alias = "http://sharejs.org/types/rich-text/v1")]
    RichText,
}

impl OtType {
    pub fn name(&self) -> &'static str {
        match self {
            OtType::Json0 => "json0",
            OtType::RichText => "rich-text",
        }
    }

    /// Parse a wire operation of this type
    pub fn parse_op(&self, value: Value) -> SharedResult<DocOp> {
        match self {
            OtType::Json0 => Ok(DocOp::Json0(json0::parse(value)?)),
            OtType::RichText => {
                let delta: Delta = serde_json::from_value(value)?;
                Ok(DocOp::RichText(delta))
            }
        }
    }

    /// Validate and normalize initial data for a create
    pub fn create_data(&self, data: Value) -> SharedResult<Value> {
        match self {
            OtType::Json0 => Ok(data),
            OtType::RichText => {
                let delta: Delta = serde_json::from_value(data)?;
                if !delta.is_document() {
                    return Err(SharedError::invalid_op("rich-text documents may only contain inserts"));
                }
                Ok(serde_json::to_value(delta)?)
            }
        }
    }

    /// Apply an operation to document data, returning the new data
    ///
    /// The input is never modified; a failed apply leaves nothing behind.
    pub fn apply(&self, data: &Value, op: &DocOp) -> SharedResult<Value> {
        match (self, op) {
            (OtType::Json0, DocOp::Json0(components)) => json0::apply(data, components),
            (OtType::RichText, DocOp::RichText(delta)) => {
                let doc: Delta = serde_json::from_value(data.clone())?;
                Ok(serde_json::to_value(doc.apply(delta)?)?)
            }
            (ty, op) => Err(SharedError::invalid_op(format!(
                "{} operation cannot apply to a {} document",
                op.ot_type().name(),
                ty.name()
            ))),
        }
    }
}

/// Parsed operation of either type
#[derive(Debug, Clone, PartialEq)]
pub enum DocOp {
    Json0(Vec<Component>),
    RichText(Delta),
}

impl Serialize for DocOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DocOp::Json0(components) => components.serialize(serializer),
            DocOp::RichText(delta) => delta.ops.serialize(serializer),
        }
    }
}

impl DocOp {
    pub fn ot_type(&self) -> OtType {
        match self {
            DocOp::Json0(_) => OtType::Json0,
            DocOp::RichText(_) => OtType::RichText,
        }
    }

    pub fn is_noop(&self) -> bool {
        match self {
            DocOp::Json0(components) => components.is_empty(),
            DocOp::RichText(delta) => delta.is_empty(),
        }
    }

    /// Transform `self` so that it applies after `other`
    pub fn transform(&self, other: &DocOp, side: Side) -> SharedResult<DocOp> {
        match (self, other) {
            (DocOp::Json0(op), DocOp::Json0(other)) => Ok(DocOp::Json0(json0::transform(op, other, side)?)),
            (DocOp::RichText(op), DocOp::RichText(other)) => {
                Ok(DocOp::RichText(rich_text::transform(op, other, side)))
            }
            _ => Err(SharedError::invalid_op("cannot transform operations of different types")),
        }
    }

    pub fn to_value(&self) -> SharedResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ot_type_names_and_aliases() {
        let ty: OtType = serde_json::from_value(json!("http://sharejs.org/types/rich-text/v1")).unwrap();
        assert_eq!(ty, OtType::RichText);
        let ty: OtType = serde_json::from_value(json!("json0")).unwrap();
        assert_eq!(ty, OtType::Json0);
        assert_eq!(serde_json::to_value(OtType::RichText).unwrap(), json!("rich-text"));
        assert!(serde_json::from_value::<OtType>(json!("text0")).is_err());
    }

    #[test]
    fn test_rich_text_create_rejects_non_document() {
        assert!(OtType::RichText.create_data(json!([{"retain": 3}])).is_err());
        let data = OtType::RichText.create_data(json!([{"insert": "hi"}])).unwrap();
        assert_eq!(data, json!({"ops": [{"insert": "hi"}]}));
    }

    #[test]
    fn test_apply_rejects_mismatched_type() {
        let op = OtType::RichText.parse_op(json!([{"insert": "x"}])).unwrap();
        assert!(OtType::Json0.apply(&json!({}), &op).is_err());
    }

    #[test]
    fn test_wire_shape_of_ops() {
        let op = OtType::RichText.parse_op(json!([{"retain": 1}, {"insert": "x"}])).unwrap();
        assert_eq!(op.to_value().unwrap(), json!([{"retain": 1}, {"insert": "x"}]));
        let op = OtType::Json0.parse_op(json!([{"p": ["n"], "na": 1}])).unwrap();
        assert_eq!(op.to_value().unwrap(), json!([{"p": ["n"], "na": 1}]));
    }

    #[test]
    fn test_rich_text_transform_ties_follow_side() {
        let doc = json!({"ops": [{"insert": "ab"}]});
        let a = OtType::RichText.parse_op(json!([{"retain": 1}, {"insert": "A"}])).unwrap();
        let b = OtType::RichText.parse_op(json!([{"retain": 1}, {"insert": "B"}])).unwrap();
        let after_a = OtType::RichText.apply(&doc, &a).unwrap();
        let result = OtType::RichText.apply(&after_a, &b.transform(&a, Side::Right).unwrap()).unwrap();
        assert_eq!(result, json!({"ops": [{"insert": "aABb"}]}));
    }
}
