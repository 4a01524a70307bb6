//! Scripted store double with fault injection and instrumentation

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::store::{
    Document, DocumentStore, DocumentStream, Filter, IndexSpec, Projection, Stage, StoreError,
    StoreResult,
};

type InsertPredicate = Box<dyn Fn(&[Document]) -> bool + Send + Sync>;

/// Wraps a real store and misbehaves on cue
///
/// Counts can fail a fixed number of times (or forever) per collection,
/// inserts can fail for batches matching a predicate, finds and aggregates
/// can fail outright or yield a trailing stream error. Insert concurrency is
/// measured so tests can assert the in-flight cap.
pub struct ScriptedStore<S> {
    inner: S,
    insert_latency: Option<Duration>,
    insert_failure: Option<InsertPredicate>,
    count_failures: Mutex<HashMap<String, u32>>,
    find_failures: HashSet<String>,
    aggregate_failures: HashSet<String>,
    broken_aggregate_streams: HashSet<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    insert_calls: Mutex<Vec<Vec<Document>>>,
    count_attempts: Mutex<HashMap<String, Vec<Instant>>>,
    aggregate_calls: AtomicUsize,
}

impl<S: DocumentStore> ScriptedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            insert_latency: None,
            insert_failure: None,
            count_failures: Mutex::new(HashMap::new()),
            find_failures: HashSet::new(),
            aggregate_failures: HashSet::new(),
            broken_aggregate_streams: HashSet::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            insert_calls: Mutex::new(Vec::new()),
            count_attempts: Mutex::new(HashMap::new()),
            aggregate_calls: AtomicUsize::new(0),
        }
    }

    /// Hold every insert call open for `latency`
    pub fn with_insert_latency(mut self, latency: Duration) -> Self {
        self.insert_latency = Some(latency);
        self
    }

    /// Fail the next `times` count attempts on `collection`
    pub fn fail_count(self, collection: &str, times: u32) -> Self {
        lock(&self.count_failures).insert(collection.to_string(), times);
        self
    }

    /// Fail every count attempt on `collection`
    pub fn always_fail_count(self, collection: &str) -> Self {
        self.fail_count(collection, u32::MAX)
    }

    /// Fail insert calls whose batch satisfies `predicate`
    pub fn fail_inserts_where<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&[Document]) -> bool + Send + Sync + 'static,
    {
        self.insert_failure = Some(Box::new(predicate));
        self
    }

    pub fn fail_find(mut self, collection: &str) -> Self {
        self.find_failures.insert(collection.to_string());
        self
    }

    pub fn fail_aggregate(mut self, collection: &str) -> Self {
        self.aggregate_failures.insert(collection.to_string());
        self
    }

    /// Let aggregates on `collection` start, then end their stream with an error
    pub fn break_aggregate_stream(mut self, collection: &str) -> Self {
        self.broken_aggregate_streams.insert(collection.to_string());
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Batches passed to `insert_many`, in call order
    pub fn insert_calls(&self) -> Vec<Vec<Document>> {
        lock(&self.insert_calls).clone()
    }

    /// Highest number of insert calls observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// When each count attempt on `collection` started
    pub fn count_attempts(&self, collection: &str) -> Vec<Instant> {
        lock(&self.count_attempts)
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn aggregate_calls(&self) -> usize {
        self.aggregate_calls.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for ScriptedStore<S> {
    fn database(&self) -> &str {
        self.inner.database()
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        lock(&self.insert_calls).push(documents.clone());

        if let Some(latency) = self.insert_latency {
            tokio::time::sleep(latency).await;
        } else {
            tokio::task::yield_now().await;
        }

        let rejected = self
            .insert_failure
            .as_ref()
            .is_some_and(|predicate| !documents.is_empty() && predicate(&documents));
        let result = if rejected {
            Err(StoreError::unavailable("scripted insert failure"))
        } else {
            self.inner.insert_many(collection, documents).await
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn count_estimate(&self, collection: &str) -> StoreResult<u64> {
        lock(&self.count_attempts)
            .entry(collection.to_string())
            .or_default()
            .push(Instant::now());

        let fail = {
            let mut failures = lock(&self.count_failures);
            match failures.get_mut(collection) {
                None => false,
                Some(remaining) if *remaining == 0 => false,
                Some(remaining) if *remaining == u32::MAX => true,
                Some(remaining) => {
                    *remaining -= 1;
                    true
                }
            }
        };
        if fail {
            return Err(StoreError::unavailable(format!(
                "scripted count failure on '{}'",
                collection
            )));
        }
        self.inner.count_estimate(collection).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Filter,
        projection: Projection,
    ) -> StoreResult<DocumentStream> {
        if self.find_failures.contains(collection) {
            return Err(StoreError::unavailable(format!(
                "scripted find failure on '{}'",
                collection
            )));
        }
        self.inner.find(collection, filter, projection).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Stage>,
    ) -> StoreResult<DocumentStream> {
        self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
        if self.aggregate_failures.contains(collection) {
            return Err(StoreError::unavailable(format!(
                "scripted aggregate failure on '{}'",
                collection
            )));
        }
        let results = self.inner.aggregate(collection, pipeline).await?;
        if self.broken_aggregate_streams.contains(collection) {
            let tail = stream::once(async { Err(StoreError::connection("cursor killed")) });
            return Ok(Box::pin(results.chain(tail)));
        }
        Ok(results)
    }

    async fn create_index_if_absent(
        &self,
        collection: &str,
        index: IndexSpec,
    ) -> StoreResult<()> {
        self.inner.create_index_if_absent(collection, index).await
    }

    async fn list_collection_names(&self) -> StoreResult<BTreeSet<String>> {
        self.inner.list_collection_names().await
    }
}
