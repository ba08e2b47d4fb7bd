/**
 * Read-Model Projections
 *
 * A projection exposes the documents of another collection through a
 * whitelist of top-level fields. Snapshots and ops are filtered on the
 * server, so fields outside the whitelist are never serialized to the
 * reader whatever the client asks for.
 */

use serde_json::{Map, Value};

use crate::shared::document::{CommittedOp, OpPayload, Snapshot};
use crate::shared::ot::{json0::Component, Delta, DocOp};
use crate::shared::path_template::PathKey;

fn project_value(data: &Value, fields: &[String]) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| fields.iter().any(|f| f == *key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect::<Map<String, Value>>(),
        ),
        _ => Value::Object(Map::new()),
    }
}

fn visible(component: &Component, fields: &[String]) -> bool {
    match component.path.first() {
        Some(PathKey::Key(key)) => fields.iter().any(|f| f == key),
        _ => false,
    }
}

/// Filter a snapshot's data down to the whitelisted fields
pub fn project_snapshot(snapshot: &Snapshot, fields: &[String]) -> Snapshot {
    Snapshot {
        data: snapshot.data.as_ref().map(|data| project_value(data, fields)),
        ..snapshot.clone()
    }
}

/// Filter a committed op down to the components touching whitelisted fields
///
/// The op keeps its version even when nothing survives, so readers still
/// advance.
pub fn project_op(op: &CommittedOp, fields: &[String]) -> CommittedOp {
    let payload = match &op.payload {
        OpPayload::Create { ot_type, data } => OpPayload::Create {
            ot_type: *ot_type,
            data: project_value(data, fields),
        },
        OpPayload::Edit(DocOp::Json0(components)) => OpPayload::Edit(DocOp::Json0(
            components.iter().filter(|c| visible(c, fields)).cloned().collect(),
        )),
        OpPayload::Edit(DocOp::RichText(_)) => OpPayload::Edit(DocOp::RichText(Delta::default())),
        OpPayload::Delete => OpPayload::Delete,
    };
    CommittedOp {
        payload,
        ..op.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::document::OpMetadata;
    use crate::shared::ot::OtType;
    use serde_json::json;

    fn fields() -> Vec<String> {
        vec!["name".to_string(), "avatar".to_string()]
    }

    #[test]
    fn test_snapshot_keeps_only_whitelist() {
        let snapshot = Snapshot {
            id: "u1".to_string(),
            version: 3,
            ot_type: Some(OtType::Json0),
            data: Some(json!({"name": "Ada", "avatar": "a.png", "email": "ada@example.com"})),
        };
        let projected = project_snapshot(&snapshot, &fields());
        assert_eq!(projected.data, Some(json!({"name": "Ada", "avatar": "a.png"})));
        assert_eq!(projected.version, 3);
    }

    #[test]
    fn test_op_drops_hidden_components() {
        let op = CommittedOp {
            src: "c1".to_string(),
            seq: 1,
            version: 3,
            payload: OpPayload::Edit(
                OtType::Json0
                    .parse_op(json!([
                        {"p": ["email"], "od": "a", "oi": "b"},
                        {"p": ["name"], "od": "Ada", "oi": "Ada L."}
                    ]))
                    .unwrap(),
            ),
            metadata: OpMetadata::now(None),
        };
        let projected = project_op(&op, &fields());
        match projected.payload {
            OpPayload::Edit(DocOp::Json0(components)) => {
                assert_eq!(components.len(), 1);
                assert_eq!(components[0].path, vec![PathKey::Key("name".to_string())]);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
