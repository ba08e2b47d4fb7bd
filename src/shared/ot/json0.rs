/**
 * JSON0 Operations
 *
 * A JSON0 operation is an ordered list of path-scoped components. On the wire
 * a component is an object whose shape is decided by which optional fields
 * are present (`li`, `ld`, `lm`, `oi`, `od`, `na`, `t`/`o`). Those shapes are
 * classified once into `ComponentKind` when the operation is parsed, and
 * everything downstream matches on the enum.
 *
 * `transform` follows the usual JSON0 rules: list indices shift around
 * concurrent inserts, deletes and moves; an edit under a deleted element is
 * dropped; insert ties at one list index or one object key are broken by
 * side (left wins).
 */

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

use crate::shared::error::{SharedError, SharedResult};
use crate::shared::ot::rich_text::{self, Delta};
use crate::shared::ot::Side;
use crate::shared::path_template::{Path, PathKey};

/// Name of the only embedded subtype supported
pub const RICH_TEXT_SUBTYPE: &str = "rich-text";
const RICH_TEXT_SUBTYPE_URI: &str = "http://sharejs.org/types/rich-text/v1";

/// Embedded operation on a value at the component's path
#[derive(Debug, Clone, PartialEq)]
pub enum SubtypeOp {
    RichText(Delta),
}

impl SubtypeOp {
    fn name(&self) -> &'static str {
        match self {
            SubtypeOp::RichText(_) => RICH_TEXT_SUBTYPE,
        }
    }

    fn is_noop(&self) -> bool {
        match self {
            SubtypeOp::RichText(delta) => delta.is_empty(),
        }
    }

    fn transform(&self, other: &SubtypeOp, side: Side) -> SubtypeOp {
        match (self, other) {
            (SubtypeOp::RichText(op), SubtypeOp::RichText(other)) => {
                SubtypeOp::RichText(rich_text::transform(op, other, side))
            }
        }
    }

    fn apply(&self, target: &mut Value) -> SharedResult<()> {
        match self {
            SubtypeOp::RichText(op) => {
                let doc: Delta = serde_json::from_value(target.clone())?;
                let result = doc.apply(op)?;
                *target = serde_json::to_value(result)?;
                Ok(())
            }
        }
    }
}

/// What a component does at its path
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentKind {
    ListInsert(Value),
    ListDelete(Value),
    ListReplace { before: Value, after: Value },
    ListMove(usize),
    ObjectInsert(Value),
    ObjectDelete(Value),
    ObjectReplace { before: Value, after: Value },
    NumberAdd(Number),
    Subtype(SubtypeOp),
}

/// One path-scoped edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawComponent", into = "RawComponent")]
pub struct Component {
    pub path: Path,
    pub kind: ComponentKind,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

#[derive(Default, Serialize, Deserialize)]
struct RawComponent {
    p: Path,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    li: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    ld: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lm: Option<usize>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    oi: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    od: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    na: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    o: Option<Value>,
}

impl TryFrom<RawComponent> for Component {
    type Error = SharedError;

    fn try_from(raw: RawComponent) -> Result<Self, Self::Error> {
        let RawComponent { p, li, ld, lm, oi, od, na, t, o } = raw;
        let groups = [li.is_some() || ld.is_some(), lm.is_some(), oi.is_some() || od.is_some(), na.is_some(), t.is_some()];
        if groups.iter().filter(|g| **g).count() != 1 {
            return Err(SharedError::invalid_op(format!(
                "component at {:?} must carry exactly one kind of edit",
                p
            )));
        }

        let kind = match (li, ld, lm, oi, od, na, t) {
            (Some(after), Some(before), ..) => ComponentKind::ListReplace { before, after },
            (Some(value), None, ..) => ComponentKind::ListInsert(value),
            (None, Some(value), ..) => ComponentKind::ListDelete(value),
            (_, _, Some(to), ..) => ComponentKind::ListMove(to),
            (_, _, _, Some(after), Some(before), ..) => ComponentKind::ObjectReplace { before, after },
            (_, _, _, Some(value), None, ..) => ComponentKind::ObjectInsert(value),
            (_, _, _, None, Some(value), ..) => ComponentKind::ObjectDelete(value),
            (_, _, _, _, _, Some(amount), _) => ComponentKind::NumberAdd(amount),
            (_, _, _, _, _, _, Some(name)) => {
                let op = o.ok_or_else(|| SharedError::invalid_op("subtype component without 'o'"))?;
                if name == RICH_TEXT_SUBTYPE || name == RICH_TEXT_SUBTYPE_URI {
                    ComponentKind::Subtype(SubtypeOp::RichText(serde_json::from_value(op)?))
                } else {
                    return Err(SharedError::invalid_op(format!("unknown subtype '{}'", name)));
                }
            }
            _ => return Err(SharedError::invalid_op("empty component")),
        };

        let component = Component { path: p, kind };
        component.check_path()?;
        Ok(component)
    }
}

impl From<Component> for RawComponent {
    fn from(component: Component) -> Self {
        let mut raw = RawComponent {
            p: component.path,
            ..RawComponent::default()
        };
        match component.kind {
            ComponentKind::ListInsert(value) => raw.li = Some(value),
            ComponentKind::ListDelete(value) => raw.ld = Some(value),
            ComponentKind::ListReplace { before, after } => {
                raw.ld = Some(before);
                raw.li = Some(after);
            }
            ComponentKind::ListMove(to) => raw.lm = Some(to),
            ComponentKind::ObjectInsert(value) => raw.oi = Some(value),
            ComponentKind::ObjectDelete(value) => raw.od = Some(value),
            ComponentKind::ObjectReplace { before, after } => {
                raw.od = Some(before);
                raw.oi = Some(after);
            }
            ComponentKind::NumberAdd(amount) => raw.na = Some(amount),
            ComponentKind::Subtype(op) => {
                raw.t = Some(op.name().to_string());
                raw.o = Some(match op {
                    SubtypeOp::RichText(delta) => serde_json::to_value(delta.ops).unwrap_or(Value::Null),
                });
            }
        }
        raw
    }
}

impl Component {
    pub fn new(path: Path, kind: ComponentKind) -> Self {
        Self { path, kind }
    }

    fn check_path(&self) -> SharedResult<()> {
        let last = self.path.last();
        let ok = match &self.kind {
            ComponentKind::ListInsert(_)
            | ComponentKind::ListDelete(_)
            | ComponentKind::ListReplace { .. }
            | ComponentKind::ListMove(_) => matches!(last, Some(PathKey::Index(_))),
            ComponentKind::ObjectInsert(_) | ComponentKind::ObjectDelete(_) | ComponentKind::ObjectReplace { .. } => {
                matches!(last, Some(PathKey::Key(_)))
            }
            ComponentKind::NumberAdd(_) | ComponentKind::Subtype(_) => true,
        };
        if ok {
            Ok(())
        } else {
            Err(SharedError::invalid_op(format!("path {:?} does not fit the component kind", self.path)))
        }
    }

    /// Value this component inserts or replaces with, if any
    pub fn inserted(&self) -> Option<&Value> {
        match &self.kind {
            ComponentKind::ListInsert(v) | ComponentKind::ObjectInsert(v) => Some(v),
            ComponentKind::ListReplace { after, .. } | ComponentKind::ObjectReplace { after, .. } => Some(after),
            _ => None,
        }
    }

    /// Value this component removes or replaces, if any
    pub fn deleted(&self) -> Option<&Value> {
        match &self.kind {
            ComponentKind::ListDelete(v) | ComponentKind::ObjectDelete(v) => Some(v),
            ComponentKind::ListReplace { before, .. } | ComponentKind::ObjectReplace { before, .. } => Some(before),
            _ => None,
        }
    }

    /// Path length counting the implicit operand of `na` and subtype edits
    fn operand_len(&self) -> usize {
        match self.kind {
            ComponentKind::NumberAdd(_) | ComponentKind::Subtype(_) => self.path.len() + 1,
            _ => self.path.len(),
        }
    }

    fn is_noop(&self) -> bool {
        match &self.kind {
            ComponentKind::ListMove(to) => self.path.last() == Some(&PathKey::Index(*to)),
            ComponentKind::Subtype(op) => op.is_noop(),
            _ => false,
        }
    }
}

/// Parse a wire operation (array of components)
pub fn parse(value: Value) -> SharedResult<Vec<Component>> {
    Ok(serde_json::from_value(value)?)
}

/// Apply components to a copy of `data`
pub fn apply(data: &Value, components: &[Component]) -> SharedResult<Value> {
    let mut result = data.clone();
    for component in components {
        apply_component(&mut result, component)?;
    }
    Ok(result)
}

fn walk_mut<'a>(mut value: &'a mut Value, path: &[PathKey]) -> SharedResult<&'a mut Value> {
    for key in path {
        value = match (value, key) {
            (Value::Object(map), PathKey::Key(k)) => map
                .get_mut(k)
                .ok_or_else(|| SharedError::invalid_op(format!("missing key '{}'", k)))?,
            (Value::Array(list), PathKey::Index(i)) => list
                .get_mut(*i)
                .ok_or_else(|| SharedError::invalid_op(format!("index {} out of bounds", i)))?,
            (_, key) => return Err(SharedError::invalid_op(format!("cannot descend into '{}'", key))),
        };
    }
    Ok(value)
}

/// Read-only counterpart of path navigation; `None` when the path does not resolve
pub fn get<'a>(mut value: &'a Value, path: &[PathKey]) -> Option<&'a Value> {
    for key in path {
        value = match (value, key) {
            (Value::Object(map), PathKey::Key(k)) => map.get(k)?,
            (Value::Array(list), PathKey::Index(i)) => list.get(*i)?,
            _ => return None,
        };
    }
    Some(value)
}

fn apply_component(doc: &mut Value, component: &Component) -> SharedResult<()> {
    match &component.kind {
        ComponentKind::NumberAdd(amount) => {
            let target = walk_mut(doc, &component.path)?;
            *target = Value::Number(add_numbers(target, amount)?);
            return Ok(());
        }
        ComponentKind::Subtype(op) => {
            let target = walk_mut(doc, &component.path)?;
            return op.apply(target);
        }
        _ => {}
    }

    let (last, parent_path) = component
        .path
        .split_last()
        .ok_or_else(|| SharedError::invalid_op("component path is empty"))?;
    let parent = walk_mut(doc, parent_path)?;

    match (&component.kind, parent, last) {
        (ComponentKind::ListInsert(value), Value::Array(list), PathKey::Index(i)) => {
            if *i > list.len() {
                return Err(SharedError::invalid_op(format!("insert index {} beyond list end", i)));
            }
            list.insert(*i, value.clone());
        }
        (ComponentKind::ListDelete(_), Value::Array(list), PathKey::Index(i)) => {
            if *i >= list.len() {
                return Err(SharedError::invalid_op(format!("delete index {} out of bounds", i)));
            }
            list.remove(*i);
        }
        (ComponentKind::ListReplace { after, .. }, Value::Array(list), PathKey::Index(i)) => {
            let slot = list
                .get_mut(*i)
                .ok_or_else(|| SharedError::invalid_op(format!("replace index {} out of bounds", i)))?;
            *slot = after.clone();
        }
        (ComponentKind::ListMove(to), Value::Array(list), PathKey::Index(from)) => {
            if *from >= list.len() || *to >= list.len() {
                return Err(SharedError::invalid_op(format!("move {} -> {} out of bounds", from, to)));
            }
            let item = list.remove(*from);
            list.insert(*to, item);
        }
        (ComponentKind::ObjectInsert(value), Value::Object(map), PathKey::Key(k))
        | (ComponentKind::ObjectReplace { after: value, .. }, Value::Object(map), PathKey::Key(k)) => {
            map.insert(k.clone(), value.clone());
        }
        (ComponentKind::ObjectDelete(_), Value::Object(map), PathKey::Key(k)) => {
            map.remove(k);
        }
        (kind, _, key) => {
            return Err(SharedError::invalid_op(format!(
                "cannot apply {:?} at '{}': container has the wrong type",
                kind, key
            )))
        }
    }
    Ok(())
}

fn add_numbers(target: &Value, amount: &Number) -> SharedResult<Number> {
    let current = match target {
        Value::Number(n) => n,
        _ => return Err(SharedError::invalid_op("number-add target is not a number")),
    };
    if let (Some(a), Some(b)) = (current.as_i64(), amount.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Number::from(sum));
        }
    }
    let sum = current.as_f64().unwrap_or(0.0) + amount.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).ok_or_else(|| SharedError::invalid_op("number-add produced a non-finite value"))
}

/// Length of `a`'s parent path when it prefixes `b`'s parent path
fn common_length(a: &Component, b: &Component) -> Option<usize> {
    let a_parent = a.operand_len().checked_sub(1)?;
    let b_parent = b.operand_len().checked_sub(1)?;
    for i in 0..a_parent {
        if i >= b_parent || a.path.get(i) != b.path.get(i) {
            return None;
        }
    }
    Some(a_parent)
}

fn index_at(path: &[PathKey], at: usize) -> Option<usize> {
    path.get(at).and_then(PathKey::as_index)
}

fn set_index(path: &mut [PathKey], at: usize, index: usize) {
    if let Some(slot) = path.get_mut(at) {
        *slot = PathKey::Index(index);
    }
}

fn push(dest: &mut Vec<Component>, component: Component) {
    if !component.is_noop() {
        dest.push(component);
    }
}

/// Transform one component against another, appending the result to `dest`
fn transform_component(dest: &mut Vec<Component>, c: &Component, other: &Component, side: Side) -> SharedResult<()> {
    let mut c = c.clone();
    let common = common_length(other, &c);
    let common2 = common_length(&c, other);
    let c_len = c.operand_len();
    let other_len = other.operand_len();

    // keep deleted payloads in sync with edits made inside them
    if let Some(common2) = common2 {
        if other_len > c_len && c.path.get(common2) == other.path.get(common2) {
            let inner = Component::new(other.path[c_len.min(other.path.len())..].to_vec(), other.kind.clone());
            match &mut c.kind {
                ComponentKind::ListDelete(value)
                | ComponentKind::ListReplace { before: value, .. }
                | ComponentKind::ObjectDelete(value)
                | ComponentKind::ObjectReplace { before: value, .. } => apply_component(value, &inner)?,
                _ => {}
            }
        }
    }

    let common = match common {
        Some(common) => common,
        None => {
            push(dest, c);
            return Ok(());
        }
    };
    let common_operand = c_len == other_len;
    let c_key = c.path.get(common).cloned();
    let other_key = other.path.get(common).cloned();
    let c_index = index_at(&c.path, common);
    let other_index = index_at(&other.path, common);

    match &other.kind {
        ComponentKind::Subtype(other_op) => {
            if let ComponentKind::Subtype(op) = &c.kind {
                if c.path == other.path {
                    c.kind = ComponentKind::Subtype(op.transform(other_op, side));
                }
            }
        }
        ComponentKind::NumberAdd(_) => {}
        ComponentKind::ListReplace { after: other_after, .. } => {
            if c_key.is_some() && c_key == other_key {
                if !common_operand {
                    // edit beneath a replaced element
                    return Ok(());
                }
                match &c.kind {
                    ComponentKind::ListReplace { after, .. } if side == Side::Left => {
                        c.kind = ComponentKind::ListReplace {
                            before: other_after.clone(),
                            after: after.clone(),
                        };
                    }
                    ComponentKind::ListReplace { .. } | ComponentKind::ListDelete(_) => return Ok(()),
                    _ => {}
                }
            }
        }
        ComponentKind::ListInsert(_) => {
            if let (Some(oi), Some(ci)) = (other_index, c_index) {
                if matches!(c.kind, ComponentKind::ListInsert(_)) && common_operand && ci == oi {
                    if side == Side::Right {
                        set_index(&mut c.path, common, ci + 1);
                    }
                } else if oi <= ci {
                    set_index(&mut c.path, common, ci + 1);
                }
                if let ComponentKind::ListMove(to) = &mut c.kind {
                    if common_operand && oi <= *to {
                        *to += 1;
                    }
                }
            }
        }
        ComponentKind::ListDelete(_) => {
            if let (Some(oi), Some(ci)) = (other_index, c_index) {
                if let ComponentKind::ListMove(to) = &mut c.kind {
                    if common_operand {
                        if oi == ci {
                            // the element we move is gone
                            return Ok(());
                        }
                        if oi < *to || (oi == *to && ci < *to) {
                            *to -= 1;
                        }
                    }
                }
                if oi < ci {
                    set_index(&mut c.path, common, ci - 1);
                } else if oi == ci {
                    if other_len < c_len {
                        // edit beneath a deleted element
                        return Ok(());
                    }
                    match &c.kind {
                        ComponentKind::ListReplace { after, .. } => {
                            c.kind = ComponentKind::ListInsert(after.clone());
                        }
                        ComponentKind::ListDelete(_) => return Ok(()),
                        _ => {}
                    }
                }
            }
        }
        ComponentKind::ListMove(other_to) => {
            if let (Some(other_from), Some(p)) = (other_index, c_index) {
                let other_to = *other_to;
                let c_is_insert = matches!(c.kind, ComponentKind::ListInsert(_));
                match &mut c.kind {
                    ComponentKind::ListMove(to) if c_len == other_len => {
                        if other_from != other_to {
                            let from = p as isize;
                            let to_orig = *to as isize;
                            let (of, ot) = (other_from as isize, other_to as isize);
                            let mut new_from = from;
                            let mut new_to = to_orig;
                            if from == of {
                                if side == Side::Left {
                                    new_from = ot;
                                    if from == to_orig {
                                        new_to = ot;
                                    }
                                } else {
                                    return Ok(());
                                }
                            } else {
                                if from > of {
                                    new_from -= 1;
                                }
                                if from > ot {
                                    new_from += 1;
                                } else if from == ot && of > ot {
                                    new_from += 1;
                                    if from == to_orig {
                                        new_to += 1;
                                    }
                                }

                                if to_orig > of {
                                    new_to -= 1;
                                } else if to_orig == of && to_orig > from {
                                    new_to -= 1;
                                }
                                if to_orig > ot {
                                    new_to += 1;
                                } else if to_orig == ot {
                                    let same_direction = (ot > of && to_orig > from) || (ot < of && to_orig < from);
                                    if same_direction {
                                        if side == Side::Right {
                                            new_to += 1;
                                        }
                                    } else if to_orig > from {
                                        new_to += 1;
                                    } else if to_orig == of {
                                        new_to -= 1;
                                    }
                                }
                            }
                            *to = new_to.max(0) as usize;
                            set_index(&mut c.path, common, new_from.max(0) as usize);
                        }
                    }
                    _ if c_is_insert && common_operand => {
                        let mut new_p = p;
                        if p > other_from {
                            new_p -= 1;
                        }
                        if p > other_to {
                            new_p += 1;
                        }
                        set_index(&mut c.path, common, new_p);
                    }
                    _ => {
                        if p == other_from {
                            set_index(&mut c.path, common, other_to);
                        } else {
                            let mut new_p = p;
                            if p > other_from {
                                new_p -= 1;
                            }
                            if p > other_to || (p == other_to && other_from > other_to) {
                                new_p += 1;
                            }
                            set_index(&mut c.path, common, new_p);
                        }
                    }
                }
            }
        }
        ComponentKind::ObjectReplace { after: other_after, .. } => {
            if c_key.is_some() && c_key == other_key {
                match c.inserted().cloned() {
                    Some(after)
                        if common_operand
                            && matches!(c.kind, ComponentKind::ObjectInsert(_) | ComponentKind::ObjectReplace { .. }) =>
                    {
                        if side == Side::Right {
                            return Ok(());
                        }
                        c.kind = ComponentKind::ObjectReplace {
                            before: other_after.clone(),
                            after,
                        };
                    }
                    _ => return Ok(()),
                }
            }
        }
        ComponentKind::ObjectInsert(other_value) => {
            if common_operand && c_key.is_some() && c_key == other_key {
                if let Some(after) = c.inserted().cloned() {
                    if matches!(c.kind, ComponentKind::ObjectInsert(_) | ComponentKind::ObjectReplace { .. }) {
                        if side == Side::Right {
                            return Ok(());
                        }
                        c.kind = ComponentKind::ObjectReplace {
                            before: other_value.clone(),
                            after,
                        };
                    }
                }
            }
        }
        ComponentKind::ObjectDelete(_) => {
            if c_key.is_some() && c_key == other_key {
                if !common_operand {
                    return Ok(());
                }
                match &c.kind {
                    ComponentKind::ObjectReplace { after, .. } => {
                        c.kind = ComponentKind::ObjectInsert(after.clone());
                    }
                    ComponentKind::ObjectInsert(_) => {}
                    _ => return Ok(()),
                }
            }
        }
    }

    push(dest, c);
    Ok(())
}

/// Transform `left` and `right` against each other
///
/// Returns `(left', right')` such that applying `left` then `right'` equals
/// applying `right` then `left'`.
pub fn transform_x(left: Vec<Component>, right: Vec<Component>) -> SharedResult<(Vec<Component>, Vec<Component>)> {
    let mut left = left;
    if right.is_empty() {
        return Ok((left, right));
    }
    let mut new_right = Vec::new();
    for right_component in right {
        let mut current = Some(right_component);
        let mut new_left = Vec::new();
        let mut k = 0;
        while k < left.len() {
            let rc = match current.take() {
                Some(rc) => rc,
                None => break,
            };
            let mut next = Vec::new();
            transform_component(&mut new_left, &left[k], &rc, Side::Left)?;
            transform_component(&mut next, &rc, &left[k], Side::Right)?;
            k += 1;
            match next.len() {
                1 => current = next.pop(),
                0 => {
                    new_left.extend(left[k..].iter().cloned());
                    break;
                }
                _ => {
                    let (l, r) = transform_x(left[k..].to_vec(), next)?;
                    new_left.extend(l);
                    new_right.extend(r);
                    break;
                }
            }
        }
        if let Some(rc) = current {
            push(&mut new_right, rc);
        }
        left = new_left;
    }
    Ok((left, new_right))
}

/// Transform `op` so it applies after `other`
pub fn transform(op: &[Component], other: &[Component], side: Side) -> SharedResult<Vec<Component>> {
    if other.is_empty() {
        return Ok(op.to_vec());
    }
    if op.len() == 1 && other.len() == 1 {
        let mut dest = Vec::new();
        transform_component(&mut dest, &op[0], &other[0], side)?;
        return Ok(dest);
    }
    match side {
        Side::Left => Ok(transform_x(op.to_vec(), other.to_vec())?.0),
        Side::Right => Ok(transform_x(other.to_vec(), op.to_vec())?.1),
    }
}
