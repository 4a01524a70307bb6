//! Fan-out/fan-in over parallel workers
//!
//! One task is spawned per work item. Each task folds its result into a
//! shared accumulator under a single lock, or records its error there if no
//! earlier error was seen. Every task runs to completion; nothing is
//! cancelled when a sibling fails. After the join barrier the phase yields
//! either the full accumulator or the first error, never both.

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};

struct PhaseState<A> {
    accumulator: A,
    first_error: Option<PipelineError>,
}

impl<A> PhaseState<A> {
    fn record_error(&mut self, phase: &str, error: PipelineError) {
        if self.first_error.is_none() {
            warn!(phase, "Worker failed, phase will report: {}", error);
            self.first_error = Some(error);
        } else {
            debug!(phase, "Discarding later worker error: {}", error);
        }
    }
}

/// Runs a named fan-out phase
#[derive(Debug, Clone)]
pub struct FanOutAggregator {
    phase: String,
    max_workers: Option<usize>,
}

impl FanOutAggregator {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            max_workers: None,
        }
    }

    /// Cap how many workers run at once; unbounded by default
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers.max(1));
        self
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// Run `executor` once per item and fold every result with `merge`
    ///
    /// `merge` runs while the accumulator lock is held and must not block.
    /// A worker error or panic surfaces as [`PipelineError::Aggregate`]
    /// naming this phase; results gathered so far are dropped.
    pub async fn run<I, R, A, F, M>(&self, items: Vec<I>, executor: F, merge: M) -> PipelineResult<A>
    where
        I: Send + 'static,
        R: Send + 'static,
        A: Default + Send + 'static,
        F: Fn(I) -> BoxFuture<'static, PipelineResult<R>> + Send + Sync + 'static,
        M: Fn(&mut A, R) + Send + Sync + 'static,
    {
        let workers = items.len();
        info!(phase = %self.phase, workers, "Starting fan-out phase");

        let state = Arc::new(Mutex::new(PhaseState {
            accumulator: A::default(),
            first_error: None,
        }));
        let executor = Arc::new(executor);
        let merge = Arc::new(merge);
        let semaphore = self.max_workers.map(|n| Arc::new(Semaphore::new(n)));
        let mut tasks = JoinSet::new();

        for item in items {
            let permit = match &semaphore {
                Some(semaphore) => Some(semaphore.clone().acquire_owned().await.map_err(|e| {
                    PipelineError::aggregate(&self.phase, PipelineError::config(e))
                })?),
                None => None,
            };
            let state = state.clone();
            let executor = executor.clone();
            let merge = merge.clone();
            let phase = self.phase.clone();

            tasks.spawn(async move {
                let result = executor(item).await;
                let mut state = state.lock().await;
                match result {
                    Ok(value) if state.first_error.is_none() => merge(&mut state.accumulator, value),
                    Ok(_) => {}
                    Err(e) => state.record_error(&phase, e),
                }
                drop(state);
                drop(permit);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                state.lock().await.record_error(&self.phase, PipelineError::from(e));
            }
        }

        let mut state = state.lock().await;
        match state.first_error.take() {
            Some(error) => Err(PipelineError::aggregate(&self.phase, error)),
            None => {
                debug!(phase = %self.phase, "Fan-out phase complete");
                Ok(std::mem::take(&mut state.accumulator))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_collects_every_result() {
        let out: BTreeMap<u32, u32> = FanOutAggregator::new("squares")
            .run(
                (1..=5).collect(),
                |n: u32| async move { Ok((n, n * n)) }.boxed(),
                |acc: &mut BTreeMap<u32, u32>, (k, v)| {
                    acc.insert(k, v);
                },
            )
            .await
            .unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out[&4], 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_error_wins_and_siblings_finish() {
        let finished = Arc::new(AtomicUsize::new(0));
        let seen = finished.clone();

        let result: PipelineResult<Vec<u64>> = FanOutAggregator::new("lookup")
            .run(
                vec![1u64, 2, 3, 4],
                move |n| {
                    let seen = seen.clone();
                    async move {
                        tokio::time::sleep(Duration::from_secs(n)).await;
                        seen.fetch_add(1, Ordering::SeqCst);
                        match n {
                            2 => Err(PipelineError::config("two")),
                            3 => Err(PipelineError::config("three")),
                            _ => Ok(n),
                        }
                    }
                    .boxed()
                },
                |acc: &mut Vec<u64>, n| acc.push(n),
            )
            .await;

        assert_eq!(finished.load(Ordering::SeqCst), 4);
        match result {
            Err(PipelineError::Aggregate { phase, source }) => {
                assert_eq!(phase, "lookup");
                assert!(matches!(*source, PipelineError::Config(ref m) if m == "two"));
            }
            other => panic!("Expected aggregate error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_fails_the_phase() {
        let result: PipelineResult<Vec<u32>> = FanOutAggregator::new("panics")
            .run(
                vec![1u32, 2],
                |n| {
                    async move {
                        if n == 2 {
                            panic!("worker blew up");
                        }
                        Ok(n)
                    }
                    .boxed()
                },
                |acc: &mut Vec<u32>, n| acc.push(n),
            )
            .await;
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Aggregate { ref source, .. } if matches!(**source, PipelineError::WorkerPanicked(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_input_yields_empty_accumulator() {
        let out: Vec<u32> = FanOutAggregator::new("nothing")
            .run(Vec::<u32>::new(), |n| async move { Ok(n) }.boxed(), |acc: &mut Vec<u32>, n| acc.push(n))
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_cap_is_respected() {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (l, p) = (live.clone(), peak.clone());

        let out: Vec<u32> = FanOutAggregator::new("capped")
            .with_max_workers(3)
            .run(
                (0..12).collect(),
                move |n: u32| {
                    let (live, peak) = (l.clone(), p.clone());
                    async move {
                        let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        live.fetch_sub(1, Ordering::SeqCst);
                        Ok(n)
                    }
                    .boxed()
                },
                |acc: &mut Vec<u32>, n| acc.push(n),
            )
            .await
            .unwrap();

        assert_eq!(out.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
