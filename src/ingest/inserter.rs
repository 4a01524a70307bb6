//! Bounded-concurrency batch insertion
//!
//! Documents are split into contiguous batches and each batch becomes one
//! `insert_many` call on its own task. A counting semaphore caps how many of
//! those calls are in flight; a permit is taken before the task is spawned
//! and released when it finishes, whatever the outcome.
//!
//! Insertion is best-effort: a failed batch is logged and recorded in the
//! [`InsertReport`] but never cancels its siblings and never turns the call
//! into an `Err`. Only a phase that cannot start (zero batch size or
//! concurrency) is an error.

use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::ingest::chunker::{batch_count, batches};
use crate::store::{to_document, with_deadline, Document, DocumentStore, StoreResult};

/// One batch that did not make it into the store
#[derive(Debug)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub documents: usize,
    pub error: PipelineError,
}

/// Outcome of a best-effort insertion phase
#[derive(Debug, Default)]
pub struct InsertReport {
    pub collection: String,
    pub batches: usize,
    pub documents: usize,
    /// Records dropped before insertion because they could not be encoded
    pub skipped: usize,
    pub failures: Vec<BatchFailure>,
}

impl InsertReport {
    /// Documents whose batch was accepted by the store
    pub fn inserted(&self) -> usize {
        self.documents - self.failures.iter().map(|f| f.documents).sum::<usize>()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.skipped == 0
    }
}

/// Inserts batches into a store under a fixed concurrency cap
#[derive(Clone)]
pub struct BoundedInserter {
    store: Arc<dyn DocumentStore>,
    call_timeout: Duration,
}

impl BoundedInserter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            call_timeout: Duration::from_secs(30),
        }
    }

    /// Deadline for each insert-many call
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Serialize records and insert them; unencodable records are skipped
    pub async fn insert_records<T: Serialize>(
        &self,
        collection: &str,
        records: &[T],
        batch_size: usize,
        max_concurrency: usize,
    ) -> PipelineResult<InsertReport> {
        let mut skipped = 0;
        let mut documents = Vec::with_capacity(records.len());
        for record in records {
            match to_document(record) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    warn!(collection, "Skipping record that cannot be encoded: {}", e);
                    skipped += 1;
                }
            }
        }

        let mut report = self
            .insert_batches(collection, documents, batch_size, max_concurrency)
            .await?;
        report.skipped += skipped;
        Ok(report)
    }

    /// Insert `documents` in `ceil(len / batch_size)` batches, at most
    /// `max_concurrency` at a time, and wait for all of them
    pub async fn insert_batches(
        &self,
        collection: &str,
        documents: Vec<Document>,
        batch_size: usize,
        max_concurrency: usize,
    ) -> PipelineResult<InsertReport> {
        let size = NonZeroUsize::new(batch_size)
            .ok_or_else(|| PipelineError::config("batch size must be positive"))?;
        if max_concurrency == 0 {
            return Err(PipelineError::config("insert concurrency must be positive"));
        }

        let total = documents.len();
        let expected = batch_count(total, size);
        info!(
            collection,
            documents = total,
            batches = expected,
            max_concurrency,
            "Inserting batches"
        );

        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let mut handles: Vec<(usize, usize, JoinHandle<StoreResult<()>>)> =
            Vec::with_capacity(expected);

        for (index, batch) in batches(documents, size).enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::config(format!("insert permits closed: {}", e)))?;
            let store = self.store.clone();
            let collection = collection.to_string();
            let call_timeout = self.call_timeout;
            let len = batch.len();

            handles.push((
                index,
                len,
                tokio::spawn(async move {
                    let result =
                        with_deadline(call_timeout, store.insert_many(&collection, batch)).await;
                    drop(permit);
                    result
                }),
            ));
        }

        let mut report = InsertReport {
            collection: collection.to_string(),
            batches: handles.len(),
            documents: total,
            ..InsertReport::default()
        };

        for (batch_index, len, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(())) => {
                    debug!(collection, batch = batch_index, documents = len, "Batch inserted");
                    continue;
                }
                Ok(Err(e)) => PipelineError::Store(e),
                Err(e) => PipelineError::from(e),
            };
            error!(collection, batch = batch_index, documents = len, "Batch insert failed: {}", outcome);
            report.failures.push(BatchFailure {
                batch_index,
                documents: len,
                error: outcome,
            });
        }

        if report.failures.is_empty() {
            info!(collection, documents = total, "All batches inserted");
        } else {
            warn!(
                collection,
                failed = report.failures.len(),
                batches = report.batches,
                "Insertion finished with failed batches"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::ScriptedStore;
    use proptest::prelude::*;
    use serde_json::json;

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| json!({"seq": i}).as_object().cloned().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_inserts_every_document_in_ceil_batches() {
        let store = Arc::new(ScriptedStore::new(MemoryStore::new("oulad")));
        let inserter = BoundedInserter::new(store.clone());

        let report = inserter.insert_batches("courses", docs(23), 5, 3).await.unwrap();

        assert_eq!(report.batches, 5);
        assert_eq!(report.inserted(), 23);
        assert!(report.is_complete());
        let calls = store.insert_calls();
        assert_eq!(calls.len(), 5);
        let mut sizes: Vec<usize> = calls.iter().map(|c| c.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![3, 5, 5, 5, 5]);
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_fail_the_phase() {
        let store = Arc::new(
            ScriptedStore::new(MemoryStore::new("oulad"))
                .fail_inserts_where(|batch| batch[0]["seq"] == json!(5)),
        );
        let inserter = BoundedInserter::new(store.clone());

        let report = inserter.insert_batches("vle", docs(12), 5, 2).await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].batch_index, 1);
        assert_eq!(report.failures[0].documents, 5);
        assert_eq!(report.inserted(), 7);
        assert_eq!(store.inner().count_estimate("vle").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_zero_arguments_cannot_start() {
        let inserter = BoundedInserter::new(Arc::new(MemoryStore::new("oulad")));
        assert!(matches!(
            inserter.insert_batches("vle", docs(3), 0, 2).await,
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            inserter.insert_batches("vle", docs(3), 2, 0).await,
            Err(PipelineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let store = Arc::new(ScriptedStore::new(MemoryStore::new("oulad")));
        let report = BoundedInserter::new(store.clone())
            .insert_batches("vle", Vec::new(), 10, 2)
            .await
            .unwrap();
        assert_eq!(report.batches, 0);
        assert!(store.insert_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_batch_times_out_and_is_reported() {
        let store = Arc::new(
            ScriptedStore::new(MemoryStore::new("oulad"))
                .with_insert_latency(Duration::from_secs(45)),
        );
        let report = BoundedInserter::new(store)
            .with_call_timeout(Duration::from_secs(30))
            .insert_batches("vle", docs(4), 2, 2)
            .await
            .unwrap();
        assert_eq!(report.failures.len(), 2);
        assert!(report
            .failures
            .iter()
            .all(|f| f.error.timed_out() == Some(Duration::from_secs(30))));
    }

    fn seq_of(doc: &Document) -> usize {
        doc["seq"].as_u64().unwrap() as usize
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_batches_are_ordered_runs_covering_the_input(
            n in 0usize..400,
            b in 1usize..50,
            k in 1usize..6,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let store = Arc::new(ScriptedStore::new(MemoryStore::new("oulad")));
            let report = rt
                .block_on(BoundedInserter::new(store.clone()).insert_batches("vle", docs(n), b, k))
                .unwrap();

            prop_assert_eq!(report.inserted(), n);
            let mut calls = store.insert_calls();
            prop_assert_eq!(calls.len(), n.div_ceil(b));
            for call in &calls {
                prop_assert!(!call.is_empty() && call.len() <= b);
                let first = seq_of(&call[0]);
                prop_assert_eq!(first % b, 0);
                for (offset, doc) in call.iter().enumerate() {
                    prop_assert_eq!(seq_of(doc), first + offset);
                }
            }

            calls.sort_by_key(|call| seq_of(&call[0]));
            let all: Vec<usize> = calls.iter().flatten().map(seq_of).collect();
            prop_assert_eq!(all, (0..n).collect::<Vec<_>>());
        }
    }
}
