/**
 * PostgreSQL Store
 *
 * `PgStore` persists snapshots, the operation log, milestones and schema
 * versions in four tables (see `migrations/0001_docsync.sql`). Document
 * data and op payloads are JSONB.
 *
 * # Commit
 *
 * A commit is one transaction: the snapshot row is updated only where its
 * version still equals the op's base version (or inserted when the base is
 * 0), the op row is appended, and the milestone is written when asked.
 * Zero affected rows means another writer won and the commit fails with
 * `StoreError::VersionConflict`.
 */

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};

use crate::backend::store::{CommitOptions, DocFilter, DocQuery, DocStore, StoreError, StoreResult};
use crate::shared::document::{CommittedOp, DocKey, OpMetadata, OpPayload, RawOp, Snapshot};
use crate::shared::ot::OtType;
use crate::shared::path_template::PathKey;

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    doc_id: String,
    version: i64,
    doc_type: Option<String>,
    data: Option<Value>,
}

impl SnapshotRow {
    fn into_snapshot(self) -> StoreResult<Snapshot> {
        Ok(Snapshot {
            id: self.doc_id,
            version: to_version(self.version)?,
            ot_type: self.doc_type.as_deref().map(parse_type).transpose()?,
            data: self.data,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OpRow {
    version: i64,
    src: String,
    seq: i64,
    doc_type: Option<String>,
    payload: Value,
    metadata: Value,
}

impl OpRow {
    fn into_op(self) -> StoreResult<CommittedOp> {
        let doc_type = self.doc_type.as_deref().map(parse_type).transpose()?;
        let raw: RawOp = serde_json::from_value(self.payload).map_err(|e| StoreError::corrupt(e.to_string()))?;
        let payload = raw
            .into_payload(doc_type)
            .map_err(|e| StoreError::corrupt(e.to_string()))?;
        let metadata: OpMetadata =
            serde_json::from_value(self.metadata).map_err(|e| StoreError::corrupt(e.to_string()))?;
        Ok(CommittedOp {
            src: self.src,
            seq: to_version(self.seq)?,
            version: to_version(self.version)?,
            payload,
            metadata,
        })
    }
}

fn parse_type(name: &str) -> StoreResult<OtType> {
    serde_json::from_value(Value::String(name.to_string()))
        .map_err(|_| StoreError::corrupt(format!("unknown document type '{}'", name)))
}

fn to_version(value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::corrupt(format!("negative version {}", value)))
}

fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn path_text(path: &[PathKey]) -> Vec<String> {
    path.iter()
        .map(|key| match key {
            PathKey::Index(index) => index.to_string(),
            PathKey::Key(key) => key.clone(),
        })
        .collect()
}

fn op_kind(payload: &OpPayload) -> &'static str {
    match payload {
        OpPayload::Create { .. } => "create",
        OpPayload::Edit(_) => "edit",
        OpPayload::Delete => "delete",
    }
}

/// Document store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::unavailable(format!("Failed to run migrations: {}", e)))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DocStore for PgStore {
    async fn get_snapshot(&self, key: &DocKey) -> StoreResult<Snapshot> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT doc_id, version, doc_type, data
            FROM docsync_snapshots
            WHERE collection = $1 AND doc_id = $2
            "#,
        )
        .bind(&key.collection)
        .bind(&key.id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_snapshot(),
            None => Ok(Snapshot::empty(key.id.clone())),
        }
    }

    async fn get_ops(&self, key: &DocKey, from: u64, to: Option<u64>) -> StoreResult<Vec<CommittedOp>> {
        let rows = sqlx::query_as::<_, OpRow>(
            r#"
            SELECT version, src, seq, doc_type, payload, metadata
            FROM docsync_ops
            WHERE collection = $1 AND doc_id = $2 AND version >= $3 AND ($4::BIGINT IS NULL OR version < $4)
            ORDER BY version ASC
            "#,
        )
        .bind(&key.collection)
        .bind(&key.id)
        .bind(to_db(from))
        .bind(to.map(to_db))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OpRow::into_op).collect()
    }

    async fn commit(
        &self,
        key: &DocKey,
        op: &CommittedOp,
        snapshot: &Snapshot,
        options: CommitOptions,
    ) -> StoreResult<()> {
        let conflict = || StoreError::VersionConflict {
            key: key.to_string(),
            expected: op.version,
        };
        if snapshot.version != op.version + 1 {
            return Err(conflict());
        }

        let doc_type = snapshot.ot_type.map(|t| t.name());
        let op_type = match &op.payload {
            OpPayload::Create { ot_type, .. } => Some(ot_type.name()),
            OpPayload::Edit(edit) => Some(edit.ot_type().name()),
            OpPayload::Delete => None,
        };
        let raw = RawOp::try_from(&op.payload).map_err(|e| StoreError::corrupt(e.to_string()))?;
        let payload = serde_json::to_value(raw).map_err(|e| StoreError::corrupt(e.to_string()))?;
        let metadata = serde_json::to_value(&op.metadata).map_err(|e| StoreError::corrupt(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        let result = if op.version == 0 {
            sqlx::query(
                r#"
                INSERT INTO docsync_snapshots (collection, doc_id, version, doc_type, data, updated_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                ON CONFLICT (collection, doc_id) DO NOTHING
                "#,
            )
            .bind(&key.collection)
            .bind(&key.id)
            .bind(to_db(snapshot.version))
            .bind(doc_type)
            .bind(&snapshot.data)
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE docsync_snapshots
                SET version = $3, doc_type = $4, data = $5, updated_at = NOW()
                WHERE collection = $1 AND doc_id = $2 AND version = $6
                "#,
            )
            .bind(&key.collection)
            .bind(&key.id)
            .bind(to_db(snapshot.version))
            .bind(doc_type)
            .bind(&snapshot.data)
            .bind(to_db(op.version))
            .execute(&mut *tx)
            .await?
        };

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(conflict());
        }

        sqlx::query(
            r#"
            INSERT INTO docsync_ops (collection, doc_id, version, src, seq, kind, doc_type, payload, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&key.collection)
        .bind(&key.id)
        .bind(to_db(op.version))
        .bind(&op.src)
        .bind(to_db(op.seq))
        .bind(op_kind(&op.payload))
        .bind(op_type)
        .bind(payload)
        .bind(metadata)
        .execute(&mut *tx)
        .await?;

        if options.save_milestone {
            sqlx::query(
                r#"
                INSERT INTO docsync_milestones (collection, doc_id, version, doc_type, data)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (collection, doc_id, version) DO NOTHING
                "#,
            )
            .bind(&key.collection)
            .bind(&key.id)
            .bind(to_db(snapshot.version))
            .bind(doc_type)
            .bind(&snapshot.data)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_milestone(&self, key: &DocKey, version: u64) -> StoreResult<Option<Snapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT doc_id, version, doc_type, data
            FROM docsync_milestones
            WHERE collection = $1 AND doc_id = $2 AND version <= $3
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(&key.collection)
        .bind(&key.id)
        .bind(to_db(version))
        .fetch_optional(&self.pool)
        .await?;

        row.map(SnapshotRow::into_snapshot).transpose()
    }

    async fn query(&self, collection: &str, query: &DocQuery) -> StoreResult<Vec<Snapshot>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT doc_id, version, doc_type, data FROM docsync_snapshots WHERE doc_type IS NOT NULL AND collection = ",
        );
        builder.push_bind(collection.to_string());

        for filter in &query.filters {
            match filter {
                DocFilter::Exists(path) => {
                    builder.push(" AND data #> ");
                    builder.push_bind(path_text(path));
                    builder.push(" IS NOT NULL");
                }
                DocFilter::Eq(path, value) => {
                    builder.push(" AND data #> ");
                    builder.push_bind(path_text(path));
                    builder.push(" = ");
                    builder.push_bind(value.clone());
                }
            }
        }

        builder.push(" ORDER BY doc_id ASC OFFSET ");
        builder.push_bind(i64::try_from(query.skip).unwrap_or(i64::MAX));
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = builder
            .build_query_as::<SnapshotRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    async fn get_schema_version(&self, collection: &str) -> StoreResult<u32> {
        let version = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT version FROM docsync_schema_versions WHERE collection = $1
            "#,
        )
        .bind(collection)
        .fetch_optional(&self.pool)
        .await?;

        Ok(version.map(|v| u32::try_from(v).unwrap_or(0)).unwrap_or(0))
    }

    async fn set_schema_version(&self, collection: &str, version: u32) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO docsync_schema_versions (collection, version, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (collection) DO UPDATE SET version = EXCLUDED.version, updated_at = NOW()
            "#,
        )
        .bind(collection)
        .bind(i32::try_from(version).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
