//! In-memory store backend

use async_trait::async_trait;
use futures::stream;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::register_index;
use crate::store::{
    error::StoreResult,
    pipeline::{evaluate, foreign_collections, Stage},
    traits::DocumentStore,
    types::{Document, DocumentStream, Filter, IndexSpec, Projection},
};

#[derive(Debug, Default)]
struct MemCollection {
    docs: Vec<Document>,
    indexes: BTreeMap<String, IndexSpec>,
}

/// In-memory store backend; data lives as long as the value
#[derive(Clone)]
pub struct MemoryStore {
    database: String,
    collections: Arc<RwLock<HashMap<String, MemCollection>>>,
}

impl MemoryStore {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Index definitions of a collection, sorted by name
    pub async fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.indexes.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of a collection's documents in insertion order
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.docs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn database(&self) -> &str {
        &self.database
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<()> {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .docs
            .extend(documents);
        Ok(())
    }

    async fn count_estimate(&self, collection: &str) -> StoreResult<u64> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map_or(0, |c| c.docs.len() as u64))
    }

    async fn find(
        &self,
        collection: &str,
        filter: Filter,
        projection: Projection,
    ) -> StoreResult<DocumentStream> {
        let matched: Vec<StoreResult<Document>> = self
            .collections
            .read()
            .await
            .get(collection)
            .map(|c| {
                c.docs
                    .iter()
                    .filter(|d| filter.matches(d))
                    .map(|d| Ok(projection.apply(d)))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Box::pin(stream::iter(matched)))
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Stage>,
    ) -> StoreResult<DocumentStream> {
        let collections = self.collections.read().await;
        let source = collections
            .get(collection)
            .map(|c| c.docs.clone())
            .unwrap_or_default();
        let foreign: HashMap<String, Vec<Document>> = foreign_collections(&pipeline)
            .into_iter()
            .map(|name| {
                let docs = collections
                    .get(name)
                    .map(|c| c.docs.clone())
                    .unwrap_or_default();
                (name.to_string(), docs)
            })
            .collect();
        drop(collections);

        let out = evaluate(source, &pipeline, &foreign)?;
        Ok(Box::pin(stream::iter(out.into_iter().map(Ok))))
    }

    async fn create_index_if_absent(
        &self,
        collection: &str,
        index: IndexSpec,
    ) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        register_index(&mut entry.indexes, collection, index)?;
        Ok(())
    }

    async fn list_collection_names(&self) -> StoreResult<BTreeSet<String>> {
        Ok(self.collections.read().await.keys().cloned().collect())
    }
}
