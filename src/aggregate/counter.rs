//! Estimated document counts with fixed-delay retries

use futures::FutureExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::aggregate::fanout::FanOutAggregator;
use crate::config::RetryPolicy;
use crate::error::{PipelineError, PipelineResult};
use crate::store::{with_deadline, DocumentStore};

/// Counts collections, retrying transient store failures
#[derive(Clone)]
pub struct RetryingCounter {
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl RetryingCounter {
    pub fn new(store: Arc<dyn DocumentStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            call_timeout: Duration::from_secs(60),
        }
    }

    /// Deadline for each individual count attempt
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Estimated count of `collection`
    ///
    /// Makes up to `max_attempts` attempts with `delay` between them. Only
    /// retryable store errors are retried; anything else returns at once.
    pub async fn count(&self, collection: &str) -> PipelineResult<u64> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match with_deadline(self.call_timeout, self.store.count_estimate(collection)).await {
                Ok(count) => {
                    debug!(collection, attempt, count, "Counted collection");
                    return Ok(count);
                }
                Err(e) if !e.is_retryable() => return Err(PipelineError::Store(e)),
                Err(e) if attempt >= max_attempts => {
                    return Err(PipelineError::RetriesExhausted {
                        operation: "count",
                        collection: collection.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!(
                        collection,
                        attempt,
                        max_attempts,
                        "Count failed, retrying in {:?}: {}",
                        self.policy.delay,
                        e
                    );
                    sleep(self.policy.delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Count every collection in parallel
    ///
    /// Either every count succeeds and the full map is returned, or the
    /// first failure is returned and no counts are.
    pub async fn count_all<I, S>(&self, collections: I) -> PipelineResult<BTreeMap<String, u64>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = collections.into_iter().map(Into::into).collect();
        let counter = self.clone();

        FanOutAggregator::new("count_all")
            .run(
                names,
                move |name: String| {
                    let counter = counter.clone();
                    async move {
                        let count = counter.count(&name).await?;
                        PipelineResult::Ok((name, count))
                    }
                    .boxed()
                },
                |counts: &mut BTreeMap<String, u64>, (name, count)| {
                    counts.insert(name, count);
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{doc, ScriptedStore};
    use serde_json::json;
    use tokio::time::Instant;

    async fn seeded(collections: &[(&str, usize)]) -> MemoryStore {
        let store = MemoryStore::new("oulad");
        for (name, n) in collections {
            let docs = (0..*n).map(|i| doc(json!({"i": i}))).collect();
            store.insert_many(name, docs).await.unwrap();
        }
        store
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_two_failures() {
        let store = Arc::new(
            ScriptedStore::new(seeded(&[("studentVle", 3)]).await).fail_count("studentVle", 2),
        );
        let counter = RetryingCounter::new(store.clone(), RetryPolicy::default());

        let started = Instant::now();
        assert_eq!(counter.count("studentVle").await.unwrap(), 3);

        let attempts = store.count_attempts("studentVle");
        assert_eq!(attempts.len(), 3);
        for pair in attempts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(2));
        }
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let store =
            Arc::new(ScriptedStore::new(MemoryStore::new("oulad")).always_fail_count("vle"));
        let counter = RetryingCounter::new(store.clone(), RetryPolicy::default());

        match counter.count("vle").await {
            Err(PipelineError::RetriesExhausted { attempts, collection, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(collection, "vle");
            }
            other => panic!("Expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(store.count_attempts("vle").len(), 3);
    }

    #[tokio::test]
    async fn test_count_all_returns_complete_map() {
        let store = Arc::new(seeded(&[("a", 2), ("b", 5), ("c", 0)]).await);
        let counts = RetryingCounter::new(store, RetryPolicy::default())
            .count_all(["a", "b", "c"])
            .await
            .unwrap();
        assert_eq!(counts.len(), 3);
        assert_eq!(counts["a"], 2);
        assert_eq!(counts["b"], 5);
        assert_eq!(counts["c"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_all_reports_no_partial_map() {
        let store = Arc::new(
            ScriptedStore::new(seeded(&[("a", 1), ("b", 1), ("c", 1)]).await).always_fail_count("b"),
        );
        let result = RetryingCounter::new(store.clone(), RetryPolicy::default())
            .count_all(["a", "b", "c"])
            .await;

        let err = result.unwrap_err();
        match err {
            PipelineError::Aggregate { phase, source } => {
                assert_eq!(phase, "count_all");
                assert!(matches!(
                    *source,
                    PipelineError::RetriesExhausted { ref collection, attempts: 3, .. } if collection == "b"
                ));
            }
            other => panic!("Expected aggregate error, got {:?}", other),
        }
        assert_eq!(store.count_attempts("a").len(), 1);
        assert_eq!(store.count_attempts("c").len(), 1);
    }
}
