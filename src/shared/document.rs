/**
 * Documents, Snapshots and Operations
 *
 * A document is addressed by `(collection, id)` and moves through versions
 * by create, edit and delete operations. A document that was never created
 * sits at version 0 with no type and no data; every committed operation
 * (including create and delete) advances the version by one.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::shared::error::{SharedError, SharedResult};
use crate::shared::ot::{DocOp, OtType};

/// `(collection, id)` address of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocKey {
    pub collection: String,
    pub id: String,
}

impl DocKey {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Materialized state of a document at one version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    #[serde(rename = "v")]
    pub version: u64,
    #[serde(rename = "type")]
    pub ot_type: Option<OtType>,
    pub data: Option<Value>,
}

impl Snapshot {
    /// State of a document that has never been created
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: 0,
            ot_type: None,
            data: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.ot_type.is_some()
    }

    /// Apply an operation, producing the next version
    pub fn apply(&self, payload: &OpPayload) -> SharedResult<Snapshot> {
        let (ot_type, data) = match (payload, self.ot_type) {
            (OpPayload::Create { ot_type, data }, None) => (Some(*ot_type), Some(ot_type.create_data(data.clone())?)),
            (OpPayload::Create { .. }, Some(_)) => return Err(SharedError::invalid_op("document already exists")),
            (OpPayload::Edit(op), Some(ot_type)) => {
                let current = self.data.as_ref().unwrap_or(&Value::Null);
                (Some(ot_type), Some(ot_type.apply(current, op)?))
            }
            (OpPayload::Delete, Some(_)) => (None, None),
            (_, None) => return Err(SharedError::invalid_op("document does not exist")),
        };
        Ok(Snapshot {
            id: self.id.clone(),
            version: self.version + 1,
            ot_type,
            data,
        })
    }
}

/// What an operation does to a document
#[derive(Debug, Clone, PartialEq)]
pub enum OpPayload {
    Create { ot_type: OtType, data: Value },
    Edit(DocOp),
    Delete,
}

impl OpPayload {
    pub fn is_create(&self) -> bool {
        matches!(self, OpPayload::Create { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, OpPayload::Delete)
    }
}

/// Initial type and data carried by a create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateData {
    #[serde(rename = "type")]
    pub ot_type: OtType,
    #[serde(default)]
    pub data: Value,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Wire form of an operation body: exactly one of `create`, `op` or `del`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<CreateData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub del: bool,
}

impl RawOp {
    /// Parse the body against the target document's current type
    pub fn into_payload(self, doc_type: Option<OtType>) -> SharedResult<OpPayload> {
        match (self.create, self.op, self.del) {
            (Some(create), None, false) => Ok(OpPayload::Create {
                ot_type: create.ot_type,
                data: create.data,
            }),
            (None, Some(op), false) => {
                let ot_type = doc_type.ok_or_else(|| SharedError::invalid_op("document does not exist"))?;
                Ok(OpPayload::Edit(ot_type.parse_op(op)?))
            }
            (None, None, true) => Ok(OpPayload::Delete),
            _ => Err(SharedError::invalid_op("op must carry exactly one of create, op or del")),
        }
    }
}

impl TryFrom<&OpPayload> for RawOp {
    type Error = SharedError;

    fn try_from(payload: &OpPayload) -> Result<Self, Self::Error> {
        Ok(match payload {
            OpPayload::Create { ot_type, data } => RawOp {
                create: Some(CreateData {
                    ot_type: *ot_type,
                    data: data.clone(),
                }),
                ..RawOp::default()
            },
            OpPayload::Edit(op) => RawOp {
                op: Some(op.to_value()?),
                ..RawOp::default()
            },
            OpPayload::Delete => RawOp {
                del: true,
                ..RawOp::default()
            },
        })
    }
}

/// Bookkeeping stored with every committed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpMetadata {
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Schema version for operations written by a migration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration: Option<u32>,
}

impl OpMetadata {
    pub fn now(user_id: Option<String>) -> Self {
        Self {
            ts: Utc::now(),
            user_id,
            migration: None,
        }
    }
}

/// Entry of a document's operation log
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedOp {
    /// Submitting client
    pub src: String,
    /// Client-local sequence number
    pub seq: u64,
    /// Version the operation applied to
    pub version: u64,
    pub payload: OpPayload,
    pub metadata: OpMetadata,
}
