//! Core trait definition for document store backends

use async_trait::async_trait;
use std::collections::BTreeSet;

use super::error::StoreResult;
use super::pipeline::Stage;
use super::types::{Document, DocumentStream, Filter, IndexSpec, Projection};

/// A document database scoped to one logical database
///
/// Implementations must be shareable across workers; callers hold them as
/// `Arc<dyn DocumentStore>` and issue concurrent calls.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the database this store is bound to
    fn database(&self) -> &str;

    /// Insert documents in order as a single call
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<()>;

    /// Approximate number of documents in a collection
    async fn count_estimate(&self, collection: &str) -> StoreResult<u64>;

    /// Lazily read documents matching a filter
    async fn find(
        &self,
        collection: &str,
        filter: Filter,
        projection: Projection,
    ) -> StoreResult<DocumentStream>;

    /// Run an aggregation pipeline
    async fn aggregate(&self, collection: &str, pipeline: Vec<Stage>)
        -> StoreResult<DocumentStream>;

    /// Create a named index unless one with that name already exists
    async fn create_index_if_absent(&self, collection: &str, index: IndexSpec)
        -> StoreResult<()>;

    /// Names of every collection holding data or indexes
    async fn list_collection_names(&self) -> StoreResult<BTreeSet<String>>;
}
