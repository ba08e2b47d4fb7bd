/**
 * Server Configuration
 *
 * This module turns the `store` section of the configuration into a
 * `DocStore`.
 *
 * # Store Selection
 *
 * - `store.database_url` (or `DATABASE_URL`) set: `PgStore`, with the
 *   bundled migrations applied on connect. A connection failure stops
 *   startup.
 * - Unset: `MemoryStore`. Documents live as long as the process.
 */

use std::sync::Arc;

use crate::backend::error::BackendResult;
use crate::backend::store::{DocStore, MemoryStore, PgStore};
use crate::shared::SyncConfig;

/// Build the document store described by `config`
///
/// # Errors
///
/// Returns an infrastructure error when the database is configured but
/// unreachable, or its migrations fail.
pub async fn load_store(config: &SyncConfig) -> BackendResult<Arc<dyn DocStore>> {
    match &config.store.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let store = PgStore::connect(url, config.store.max_connections)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to open the document database: {}", e);
                    e
                })?;
            tracing::info!("Document database ready");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("No database configured. Documents are kept in memory only.");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::document::DocKey;

    #[tokio::test]
    async fn test_memory_store_without_database() {
        let config = SyncConfig::default();
        let store = load_store(&config).await.unwrap();
        let snapshot = store.get_snapshot(&DocKey::new("texts", "t1")).await.unwrap();
        assert_eq!(snapshot.version, 0);
    }
}
