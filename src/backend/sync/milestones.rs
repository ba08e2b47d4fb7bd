/**
 * Past-Version Snapshots
 *
 * Rebuilds a document at an earlier version from the nearest stored
 * milestone at or below it (or from the empty version 0) plus the op log.
 */

use crate::backend::error::{BackendError, BackendResult};
use crate::backend::store::DocStore;
use crate::shared::document::{DocKey, Snapshot};

pub async fn snapshot_at(store: &dyn DocStore, key: &DocKey, version: u64) -> BackendResult<Snapshot> {
    let current = store.get_snapshot(key).await?;
    if version == current.version {
        return Ok(current);
    }
    if version > current.version {
        return Err(BackendError::protocol(format!(
            "{} is at version {}, cannot read version {}",
            key, current.version, version
        )));
    }

    let mut snapshot = store
        .get_milestone(key, version)
        .await?
        .unwrap_or_else(|| Snapshot::empty(key.id.clone()));

    let ops = store.get_ops(key, snapshot.version, Some(version)).await?;
    for op in &ops {
        snapshot = snapshot.apply(&op.payload)?;
    }

    if snapshot.version != version {
        return Err(BackendError::infrastructure(format!(
            "op log of {} has a gap before version {}",
            key, version
        )));
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::store::{CommitOptions, MemoryStore};
    use crate::shared::document::{CommittedOp, OpMetadata, OpPayload};
    use crate::shared::ot::OtType;
    use serde_json::json;

    async fn commit(store: &MemoryStore, key: &DocKey, current: &Snapshot, payload: OpPayload, milestone: bool) -> Snapshot {
        let next = current.apply(&payload).unwrap();
        let op = CommittedOp {
            src: "s".to_string(),
            seq: current.version + 1,
            version: current.version,
            payload,
            metadata: OpMetadata::now(None),
        };
        store
            .commit(key, &op, &next, CommitOptions { save_milestone: milestone })
            .await
            .unwrap();
        next
    }

    fn insert(text: &str) -> OpPayload {
        OpPayload::Edit(OtType::RichText.parse_op(json!([{"insert": text}])).unwrap())
    }

    #[tokio::test]
    async fn test_rebuilds_from_milestone_and_ops() {
        let store = MemoryStore::new();
        let key = DocKey::new("texts", "t1");
        let create = OpPayload::Create {
            ot_type: OtType::RichText,
            data: json!({"ops": []}),
        };
        let v1 = commit(&store, &key, &Snapshot::empty("t1"), create, false).await;
        let v2 = commit(&store, &key, &v1, insert("a"), true).await;
        let v3 = commit(&store, &key, &v2, insert("b"), false).await;
        let _v4 = commit(&store, &key, &v3, insert("c"), false).await;

        let past = snapshot_at(&store, &key, 3).await.unwrap();
        assert_eq!(past, v3);
        assert_eq!(past.data, Some(json!({"ops": [{"insert": "ba"}]})));

        let first = snapshot_at(&store, &key, 1).await.unwrap();
        assert_eq!(first, v1);

        let never = snapshot_at(&store, &key, 0).await.unwrap();
        assert!(!never.exists());

        assert!(snapshot_at(&store, &key, 9).await.is_err());
    }
}
