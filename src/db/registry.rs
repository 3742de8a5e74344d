//! Alias registry for created pools.
//!
//! Pools created with a `pool_alias` are cached here so that later
//! registrations can reuse them by name instead of opening a new pool.

use crate::db::pool::{PoolHandle, PoolStatus};
use crate::error::{DbError, DbResult};
use crate::models::PoolConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct PoolRegistry {
    pools: Arc<RwLock<HashMap<String, PoolHandle>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool, caching it under its alias when one is configured.
    pub async fn create_pool(&self, config: PoolConfig) -> DbResult<PoolHandle> {
        let Some(alias) = config.pool_alias.clone() else {
            return PoolHandle::create(&config).await;
        };

        // Early check for an existing alias
        if self.get_pool(&alias).await.is_some() {
            return Err(duplicate_alias(&alias));
        }

        let handle = PoolHandle::create(&config).await?;

        // Re-check after async work to prevent TOCTOU race.
        // If duplicate detected, close the new pool outside the lock.
        let duplicate = {
            let mut pools = self.pools.write().await;
            let taken = pools
                .get(&alias)
                .is_some_and(|existing| existing.status() != PoolStatus::Closed);
            if !taken {
                pools.insert(alias.clone(), handle.clone());
            }
            taken
        };

        if duplicate {
            if let Err(e) = handle.close(None).await {
                warn!(alias = %alias, error = %e, "Failed to close duplicate pool");
            }
            return Err(duplicate_alias(&alias));
        }

        info!(alias = %alias, "Pool cached under alias");
        Ok(handle)
    }

    /// Look up a pool by alias. Closed pools are evicted and not returned.
    pub async fn get_pool(&self, alias: &str) -> Option<PoolHandle> {
        let handle = self.pools.read().await.get(alias).cloned()?;
        if handle.status() != PoolStatus::Closed {
            return Some(handle);
        }

        let mut pools = self.pools.write().await;
        if pools.get(alias).is_some_and(|h| h.same_pool(&handle)) {
            pools.remove(alias);
            debug!(alias = %alias, "Evicted closed pool");
        }
        None
    }

    /// Aliases of all cached pools, sorted.
    pub async fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.pools.read().await.keys().cloned().collect();
        aliases.sort();
        aliases
    }
}

fn duplicate_alias(alias: &str) -> DbError {
    DbError::pool_creation(
        format!("pool alias '{alias}' already exists"),
        "Reuse the existing pool by alias or choose another alias",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_alias() {
        let registry = PoolRegistry::new();
        assert!(registry.get_pool("nonexistent").await.is_none());
        assert!(registry.aliases().await.is_empty());
    }

    #[tokio::test]
    async fn test_alias_is_cached_and_unique() {
        let registry = PoolRegistry::new();
        let config = PoolConfig::new("sqlite::memory:").with_alias("reports");

        let created = registry.create_pool(config.clone()).await.unwrap();
        let found = registry.get_pool("reports").await.unwrap();
        assert!(created.same_pool(&found));
        assert_eq!(found.alias(), Some("reports"));
        assert_eq!(registry.aliases().await, vec!["reports".to_string()]);

        let err = registry.create_pool(config).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_closed_pool_is_evicted() {
        let registry = PoolRegistry::new();
        let created = registry
            .create_pool(PoolConfig::new("sqlite::memory:").with_alias("tmp"))
            .await
            .unwrap();
        created.close(None).await.unwrap();

        assert!(registry.get_pool("tmp").await.is_none());
        assert!(registry.aliases().await.is_empty());
    }

    #[tokio::test]
    async fn test_unaliased_pool_is_not_cached() {
        let registry = PoolRegistry::new();
        let created = registry
            .create_pool(PoolConfig::new("sqlite::memory:"))
            .await
            .unwrap();
        assert!(registry.aliases().await.is_empty());
        created.close(None).await.unwrap();
    }
}
