/**
 * Schema Migrations
 *
 * Each collection may carry an ordered list of migrations numbered 1..n.
 * `migrate_if_necessary` compares the stored schema version of every such
 * collection with its latest migration, runs the pending ones over every
 * document through a trusted internal connection, and records progress
 * after each migration. Ops written by a migration are tagged with its
 * version; a stale client op rebased over one is passed through the
 * migration's `migrate_op` instead of OT transform.
 */

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::error::BackendResult;
use crate::backend::store::DocQuery;
use crate::backend::sync::{SubmitRequest, SyncBackend};
use crate::shared::document::{DocKey, OpPayload, Snapshot};
use crate::shared::error::{SharedError, SharedResult};
use crate::shared::ot::DocOp;

/// Documents read per page while migrating
const PAGE_SIZE: usize = 100;

pub trait Migration: Send + Sync {
    /// Schema version this migration produces
    fn version(&self) -> u32;

    /// Op bringing one document to this version, or `None` when it already conforms
    fn migrate_doc(&self, snapshot: &Snapshot) -> SharedResult<Option<DocOp>>;

    /// Rewrite an op composed against the previous schema
    fn migrate_op(&self, _op: &mut DocOp) -> SharedResult<()> {
        Ok(())
    }
}

/// Ordered migrations of one collection
#[derive(Clone, Default)]
pub struct MigrationRegistry {
    migrations: Vec<Arc<dyn Migration>>,
}

impl MigrationRegistry {
    /// Migrations must number exactly 1..n
    pub fn new(mut migrations: Vec<Arc<dyn Migration>>) -> SharedResult<Self> {
        migrations.sort_by_key(|m| m.version());
        for (index, migration) in migrations.iter().enumerate() {
            let expected = index as u32 + 1;
            if migration.version() != expected {
                return Err(SharedError::config(format!(
                    "Migration versions must be contiguous from 1: expected {}, found {}",
                    expected,
                    migration.version()
                )));
            }
        }
        Ok(Self { migrations })
    }

    pub fn latest(&self) -> u32 {
        self.migrations.len() as u32
    }

    pub fn get(&self, version: u32) -> Option<&Arc<dyn Migration>> {
        version
            .checked_sub(1)
            .and_then(|index| self.migrations.get(index as usize))
    }

    /// Migrations newer than `current`, in order
    pub fn pending(&self, current: u32) -> impl Iterator<Item = &Arc<dyn Migration>> {
        self.migrations.iter().skip(current as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRegistry").field("latest", &self.latest()).finish()
    }
}

/// Bring every collection with migrations up to its latest schema version
pub async fn migrate_if_necessary(backend: &SyncBackend) -> BackendResult<()> {
    let store = backend.store();
    let registries: HashMap<String, MigrationRegistry> = backend.migrations().clone();

    for (collection, registry) in &registries {
        let current = store.get_schema_version(collection).await?;
        if current >= registry.latest() {
            tracing::debug!("Collection {} is at schema version {}", collection, current);
            continue;
        }

        let connection = backend.connect(None);
        for migration in registry.pending(current) {
            let version = migration.version();
            tracing::info!("Migrating collection {} to schema version {}", collection, version);

            let mut migrated = 0usize;
            let mut skip = 0usize;
            loop {
                let page = store.query(collection, &DocQuery::all().page(skip, PAGE_SIZE)).await?;
                let fetched = page.len();

                for snapshot in page {
                    let Some(op) = migration.migrate_doc(&snapshot)? else {
                        continue;
                    };
                    if op.is_noop() {
                        continue;
                    }
                    backend
                        .submit(
                            connection.session(),
                            SubmitRequest {
                                key: DocKey::new(collection.clone(), snapshot.id.clone()),
                                base: snapshot.version,
                                src: connection.client_id().to_string(),
                                seq: connection.next_seq(),
                                payload: OpPayload::Edit(op),
                                migration: Some(version),
                            },
                        )
                        .await?;
                    migrated += 1;
                }

                if fetched < PAGE_SIZE {
                    break;
                }
                skip += fetched;
            }

            store.set_schema_version(collection, version).await?;
            tracing::info!(
                "Collection {} migrated to schema version {} ({} documents changed)",
                collection,
                version,
                migrated
            );
        }
    }

    Ok(())
}
