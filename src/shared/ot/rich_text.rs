/**
 * Rich Text Deltas
 *
 * Quill-style deltas: runs of `insert` (text or a single embed), `retain`
 * and `delete`, each optionally carrying formatting attributes. A document is
 * a delta made only of inserts; an edit is applied by composing it onto the
 * document.
 *
 * Lengths count Unicode scalar values. An embed has length one.
 */

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::shared::error::{SharedError, SharedResult};
use crate::shared::ot::Side;

/// Formatting attributes; a `null` value removes the attribute
pub type AttributeMap = Map<String, Value>;

/// Inserted content
#[derive(Debug, Clone, PartialEq)]
pub enum Insertable {
    Text(String),
    Embed(Value),
}

impl Insertable {
    fn len(&self) -> usize {
        match self {
            Insertable::Text(text) => text.chars().count(),
            Insertable::Embed(_) => 1,
        }
    }
}

/// One delta run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDeltaOp", into = "RawDeltaOp")]
pub enum DeltaOp {
    Insert {
        insert: Insertable,
        attributes: Option<AttributeMap>,
    },
    Retain {
        count: usize,
        attributes: Option<AttributeMap>,
    },
    Delete {
        count: usize,
    },
}

#[derive(Serialize, Deserialize)]
struct RawDeltaOp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    insert: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retain: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delete: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attributes: Option<AttributeMap>,
}

impl TryFrom<RawDeltaOp> for DeltaOp {
    type Error = SharedError;

    fn try_from(raw: RawDeltaOp) -> Result<Self, Self::Error> {
        let attributes = raw.attributes.filter(|a| !a.is_empty());
        match (raw.insert, raw.retain, raw.delete) {
            (Some(Value::String(text)), None, None) => Ok(DeltaOp::Insert {
                insert: Insertable::Text(text),
                attributes,
            }),
            (Some(Value::Null), None, None) => Err(SharedError::invalid_op("null insert")),
            (Some(embed), None, None) => Ok(DeltaOp::Insert {
                insert: Insertable::Embed(embed),
                attributes,
            }),
            (None, Some(count), None) => Ok(DeltaOp::Retain { count, attributes }),
            (None, None, Some(count)) if attributes.is_none() => Ok(DeltaOp::Delete { count }),
            _ => Err(SharedError::invalid_op(
                "delta op must have exactly one of insert, retain or delete",
            )),
        }
    }
}

impl From<DeltaOp> for RawDeltaOp {
    fn from(op: DeltaOp) -> Self {
        match op {
            DeltaOp::Insert { insert, attributes } => RawDeltaOp {
                insert: Some(match insert {
                    Insertable::Text(text) => Value::String(text),
                    Insertable::Embed(embed) => embed,
                }),
                retain: None,
                delete: None,
                attributes,
            },
            DeltaOp::Retain { count, attributes } => RawDeltaOp {
                insert: None,
                retain: Some(count),
                delete: None,
                attributes,
            },
            DeltaOp::Delete { count } => RawDeltaOp {
                insert: None,
                retain: None,
                delete: Some(count),
                attributes: None,
            },
        }
    }
}

impl DeltaOp {
    pub fn len(&self) -> usize {
        match self {
            DeltaOp::Insert { insert, .. } => insert.len(),
            DeltaOp::Retain { count, .. } => *count,
            DeltaOp::Delete { count } => *count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn attributes(&self) -> Option<&AttributeMap> {
        match self {
            DeltaOp::Insert { attributes, .. } | DeltaOp::Retain { attributes, .. } => attributes.as_ref(),
            DeltaOp::Delete { .. } => None,
        }
    }
}

/// Ordered list of delta runs
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Delta {
    pub ops: Vec<DeltaOp>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DeltaRepr {
    Ops(Vec<DeltaOp>),
    Object { ops: Vec<DeltaOp> },
}

impl<'de> Deserialize<'de> for Delta {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ops = match DeltaRepr::deserialize(deserializer)? {
            DeltaRepr::Ops(ops) => ops,
            DeltaRepr::Object { ops } => ops,
        };
        let mut delta = Delta::new();
        for op in ops {
            delta.push(op);
        }
        Ok(delta)
    }
}

impl Delta {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn insert(mut self, text: impl Into<String>) -> Self {
        self.push(DeltaOp::Insert {
            insert: Insertable::Text(text.into()),
            attributes: None,
        });
        self
    }

    pub fn insert_with(mut self, text: impl Into<String>, attributes: AttributeMap) -> Self {
        self.push(DeltaOp::Insert {
            insert: Insertable::Text(text.into()),
            attributes: Some(attributes),
        });
        self
    }

    pub fn insert_embed(mut self, embed: Value) -> Self {
        self.push(DeltaOp::Insert {
            insert: Insertable::Embed(embed),
            attributes: None,
        });
        self
    }

    pub fn retain(mut self, count: usize) -> Self {
        self.push(DeltaOp::Retain { count, attributes: None });
        self
    }

    pub fn retain_with(mut self, count: usize, attributes: AttributeMap) -> Self {
        self.push(DeltaOp::Retain {
            count,
            attributes: Some(attributes),
        });
        self
    }

    pub fn delete(mut self, count: usize) -> Self {
        self.push(DeltaOp::Delete { count });
        self
    }

    /// Append a run, merging with the previous run where possible
    ///
    /// Inserts are always placed before an adjacent trailing delete.
    pub fn push(&mut self, op: DeltaOp) {
        if op.is_empty() {
            return;
        }
        let op = normalize_attributes(op);
        let mut index = self.ops.len();
        if let Some(last) = self.ops.last_mut() {
            if let (DeltaOp::Delete { count: last_count }, DeltaOp::Delete { count }) = (&mut *last, &op) {
                *last_count += count;
                return;
            }
            if matches!(last, DeltaOp::Delete { .. }) && matches!(op, DeltaOp::Insert { .. }) {
                index -= 1;
                if index == 0 {
                    self.ops.insert(0, op);
                    return;
                }
            }
        }
        if index > 0 {
            let last = &mut self.ops[index - 1];
            if last.attributes() == op.attributes() {
                match (last, &op) {
                    (
                        DeltaOp::Insert {
                            insert: Insertable::Text(last_text),
                            ..
                        },
                        DeltaOp::Insert {
                            insert: Insertable::Text(text),
                            ..
                        },
                    ) => {
                        last_text.push_str(text);
                        return;
                    }
                    (DeltaOp::Retain { count: last_count, .. }, DeltaOp::Retain { count, .. }) => {
                        *last_count += count;
                        return;
                    }
                    _ => {}
                }
            }
        }
        self.ops.insert(index, op);
    }

    /// Drop a trailing plain retain
    pub fn chop(mut self) -> Self {
        if let Some(DeltaOp::Retain { attributes: None, .. }) = self.ops.last() {
            self.ops.pop();
        }
        self
    }

    /// Total length of the runs
    pub fn len(&self) -> usize {
        self.ops.iter().map(DeltaOp::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Length of the document this delta expects to be applied to
    pub fn base_len(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                DeltaOp::Insert { .. } => 0,
                other => other.len(),
            })
            .sum()
    }

    /// True when the delta is a document (inserts only)
    pub fn is_document(&self) -> bool {
        self.ops.iter().all(|op| matches!(op, DeltaOp::Insert { .. }))
    }

    /// Concatenated text of a document delta; embeds are skipped
    pub fn text(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DeltaOp::Insert {
                    insert: Insertable::Text(text),
                    ..
                } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Compose `other` after `self`
    pub fn compose(&self, other: &Delta) -> Delta {
        let mut this_iter = OpIterator::new(&self.ops);
        let mut other_iter = OpIterator::new(&other.ops);
        let mut delta = Delta::new();

        if let Some(DeltaOp::Retain {
            count: first_retain,
            attributes: None,
        }) = other_iter.peek()
        {
            let first_retain = *first_retain;
            let mut first_left = first_retain;
            while this_iter.peek_kind() == OpKind::Insert && this_iter.peek_len() <= first_left {
                first_left -= this_iter.peek_len();
                delta.ops.push(this_iter.next(usize::MAX));
            }
            if first_retain - first_left > 0 {
                other_iter.next(first_retain - first_left);
            }
        }

        while this_iter.has_next() || other_iter.has_next() {
            if other_iter.peek_kind() == OpKind::Insert {
                delta.push(other_iter.next(usize::MAX));
            } else if this_iter.peek_kind() == OpKind::Delete {
                delta.push(this_iter.next(usize::MAX));
            } else {
                let length = this_iter.peek_len().min(other_iter.peek_len());
                let this_op = this_iter.next(length);
                let other_op = other_iter.next(length);
                match (this_op, other_op) {
                    (this_op, DeltaOp::Retain { attributes: other_attrs, .. }) => {
                        let keep_null = matches!(this_op, DeltaOp::Retain { .. });
                        match this_op {
                            DeltaOp::Retain { attributes, .. } => {
                                let attributes = compose_attributes(attributes.as_ref(), other_attrs.as_ref(), keep_null);
                                delta.push(DeltaOp::Retain { count: length, attributes });
                            }
                            DeltaOp::Insert { insert, attributes } => {
                                let attributes = compose_attributes(attributes.as_ref(), other_attrs.as_ref(), keep_null);
                                delta.push(DeltaOp::Insert { insert, attributes });
                            }
                            DeltaOp::Delete { .. } => {}
                        }
                    }
                    (DeltaOp::Retain { .. }, DeltaOp::Delete { count }) => {
                        delta.push(DeltaOp::Delete { count });
                    }
                    // insert then delete cancels out
                    _ => {}
                }
            }
        }
        delta.chop()
    }

    /// Transform `other` against `self`
    ///
    /// `priority` true means `self` is considered to have happened first, so
    /// its inserts win ties at the same position.
    pub fn transform(&self, other: &Delta, priority: bool) -> Delta {
        let mut this_iter = OpIterator::new(&self.ops);
        let mut other_iter = OpIterator::new(&other.ops);
        let mut delta = Delta::new();
        while this_iter.has_next() || other_iter.has_next() {
            if this_iter.peek_kind() == OpKind::Insert && (priority || other_iter.peek_kind() != OpKind::Insert) {
                let len = this_iter.next(usize::MAX).len();
                delta.push(DeltaOp::Retain { count: len, attributes: None });
            } else if other_iter.peek_kind() == OpKind::Insert {
                delta.push(other_iter.next(usize::MAX));
            } else {
                let length = this_iter.peek_len().min(other_iter.peek_len());
                let this_op = this_iter.next(length);
                let other_op = other_iter.next(length);
                match (this_op, other_op) {
                    // our delete makes theirs redundant or removes their retain
                    (DeltaOp::Delete { .. }, _) => {}
                    (_, DeltaOp::Delete { count }) => delta.push(DeltaOp::Delete { count }),
                    (this_op, other_op) => {
                        let attributes = transform_attributes(this_op.attributes(), other_op.attributes(), priority);
                        delta.push(DeltaOp::Retain { count: length, attributes });
                    }
                }
            }
        }
        delta.chop()
    }

    /// Apply an edit to this document delta
    pub fn apply(&self, op: &Delta) -> SharedResult<Delta> {
        if !self.is_document() {
            return Err(SharedError::invalid_op("rich-text snapshot contains non-insert runs"));
        }
        let doc_len = self.len();
        let base_len = op.base_len();
        if base_len > doc_len {
            return Err(SharedError::invalid_op(format!(
                "rich-text op spans {} characters but the document has {}",
                base_len, doc_len
            )));
        }
        Ok(self.compose(op))
    }
}

/// Transform `op` against `other` for the OT type contract
///
/// `Side::Left` means `op` wins insert ties.
pub fn transform(op: &Delta, other: &Delta, side: Side) -> Delta {
    other.transform(op, side == Side::Right)
}

fn normalize_attributes(op: DeltaOp) -> DeltaOp {
    match op {
        DeltaOp::Insert { insert, attributes } => DeltaOp::Insert {
            insert,
            attributes: attributes.filter(|a| !a.is_empty()),
        },
        DeltaOp::Retain { count, attributes } => DeltaOp::Retain {
            count,
            attributes: attributes.filter(|a| !a.is_empty()),
        },
        other => other,
    }
}

fn compose_attributes(a: Option<&AttributeMap>, b: Option<&AttributeMap>, keep_null: bool) -> Option<AttributeMap> {
    let mut attributes: AttributeMap = b
        .map(|b| {
            b.iter()
                .filter(|(_, v)| keep_null || !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();
    if let Some(a) = a {
        for (key, value) in a {
            if b.map(|b| !b.contains_key(key)).unwrap_or(true) {
                attributes.insert(key.clone(), value.clone());
            }
        }
    }
    if attributes.is_empty() {
        None
    } else {
        Some(attributes)
    }
}

fn transform_attributes(a: Option<&AttributeMap>, b: Option<&AttributeMap>, priority: bool) -> Option<AttributeMap> {
    let a = match a {
        Some(a) => a,
        None => return b.cloned(),
    };
    let b = b?;
    if !priority {
        return Some(b.clone());
    }
    let attributes: AttributeMap = b
        .iter()
        .filter(|(k, _)| !a.contains_key(*k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if attributes.is_empty() {
        None
    } else {
        Some(attributes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Insert,
    Retain,
    Delete,
}

struct OpIterator<'a> {
    ops: &'a [DeltaOp],
    index: usize,
    offset: usize,
}

impl<'a> OpIterator<'a> {
    fn new(ops: &'a [DeltaOp]) -> Self {
        Self { ops, index: 0, offset: 0 }
    }

    fn has_next(&self) -> bool {
        self.peek_len() < usize::MAX
    }

    fn peek(&self) -> Option<&'a DeltaOp> {
        self.ops.get(self.index)
    }

    fn peek_len(&self) -> usize {
        match self.ops.get(self.index) {
            Some(op) => op.len() - self.offset,
            None => usize::MAX,
        }
    }

    fn peek_kind(&self) -> OpKind {
        match self.ops.get(self.index) {
            Some(DeltaOp::Insert { .. }) => OpKind::Insert,
            Some(DeltaOp::Delete { .. }) => OpKind::Delete,
            Some(DeltaOp::Retain { .. }) | None => OpKind::Retain,
        }
    }

    fn next(&mut self, length: usize) -> DeltaOp {
        let op = match self.ops.get(self.index) {
            Some(op) => op,
            None => {
                return DeltaOp::Retain {
                    count: usize::MAX,
                    attributes: None,
                }
            }
        };
        let offset = self.offset;
        let op_len = op.len();
        let length = if length >= op_len - offset {
            self.index += 1;
            self.offset = 0;
            op_len - offset
        } else {
            self.offset += length;
            length
        };
        match op {
            DeltaOp::Delete { .. } => DeltaOp::Delete { count: length },
            DeltaOp::Retain { attributes, .. } => DeltaOp::Retain {
                count: length,
                attributes: attributes.clone(),
            },
            DeltaOp::Insert {
                insert: Insertable::Text(text),
                attributes,
            } => DeltaOp::Insert {
                insert: Insertable::Text(text.chars().skip(offset).take(length).collect()),
                attributes: attributes.clone(),
            },
            DeltaOp::Insert {
                insert: Insertable::Embed(embed),
                attributes,
            } => DeltaOp::Insert {
                insert: Insertable::Embed(embed.clone()),
                attributes: attributes.clone(),
            },
        }
    }
}
