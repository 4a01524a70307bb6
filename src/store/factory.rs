//! Store factory for creating store instances

use std::sync::Arc;
use tracing::info;

use super::backends::{FileStore, MemoryStore};
use super::config::{BackendType, StoreConfig};
use super::error::StoreResult;
use super::traits::DocumentStore;

/// Factory for creating store instances
pub struct StoreFactory;

impl StoreFactory {
    /// Create a store bound to `database` from explicit configuration
    pub async fn from_config(
        config: &StoreConfig,
        database: &str,
    ) -> StoreResult<Arc<dyn DocumentStore>> {
        info!(backend = ?config.backend, database, "Opening document store");
        match config.backend {
            BackendType::File => {
                let store = FileStore::open(&config.base_dir, database).await?;
                Ok(Arc::new(store))
            }
            BackendType::Memory => Ok(Arc::new(MemoryStore::new(database))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_factory_builds_each_backend() {
        let temp_dir = TempDir::new().unwrap();
        for backend in [BackendType::File, BackendType::Memory] {
            let config = StoreConfig {
                backend,
                base_dir: temp_dir.path().to_path_buf(),
            };
            let store = StoreFactory::from_config(&config, "oulad").await.unwrap();
            assert_eq!(store.database(), "oulad");
            assert_eq!(store.count_estimate("courses").await.unwrap(), 0);
        }
    }
}
