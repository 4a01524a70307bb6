//! Analytics over stored predictions
//!
//! Three reports are derived from `prediction_assessments`: the fixed-range
//! score distribution, the mean predicted score per assessment type, and
//! the number of distinct students per assessment. Grouped work runs as
//! fan-out phases, so each report is either complete or a single error.

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::aggregate::FanOutAggregator;
use crate::analytics::models::{
    bucket_scores, AssessmentStudentCount, AssessmentTypeAverage, ScoreBucket,
};
use crate::config::{PipelineConfig, Timeouts};
use crate::error::{PipelineError, PipelineResult};
use crate::ingest::chunker::batches;
use crate::predict::coerce::{coerce_float, required};
use crate::predict::PREDICTION_ASSESSMENTS;
use crate::store::{
    with_deadline, Accumulator, Document, DocumentStore, DocumentStream, Filter, IndexSpec,
    ProjectExpr, Projection, SortOrder, Stage, StoreError, StoreResult,
};

const ASSESSMENTS: &str = "assessments";

/// Computes the prediction reports against one store
#[derive(Clone)]
pub struct AnalyticsEngine {
    store: Arc<dyn DocumentStore>,
    batch_size: usize,
    student_count_workers: usize,
    output_queue_capacity: usize,
    timeouts: Timeouts,
    average_indexes: Arc<OnceCell<()>>,
}

impl AnalyticsEngine {
    pub fn new(store: Arc<dyn DocumentStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            batch_size: config.batch_size,
            student_count_workers: config.student_count_workers,
            output_queue_capacity: config.output_queue_capacity,
            timeouts: config.timeouts.clone(),
            average_indexes: Arc::new(OnceCell::new()),
        }
    }

    /// Count predicted scores per fixed range in one pass
    ///
    /// Documents without a numeric `predicted_score` are skipped.
    pub async fn score_distribution(&self) -> PipelineResult<Vec<ScoreBucket>> {
        let store = self.store.clone();
        let scores = with_deadline(self.timeouts.analytics, async move {
            let mut cursor = store
                .find(
                    PREDICTION_ASSESSMENTS,
                    Filter::All,
                    Projection::include(["predicted_score"]),
                )
                .await?;
            let mut scores = Vec::new();
            while let Some(doc) = cursor.next().await {
                let doc = doc?;
                match required(&doc, "predicted_score")
                    .and_then(|v| coerce_float("predicted_score", v))
                {
                    Ok(score) => scores.push(score),
                    Err(e) => warn!("Skipping prediction in distribution: {}", e),
                }
            }
            StoreResult::Ok(scores)
        })
        .await?;

        let buckets = bucket_scores(scores);
        debug!(?buckets, "Score distribution computed");
        Ok(buckets)
    }

    /// Mean predicted score per assessment type, highest first
    pub async fn average_by_assessment_type(&self) -> PipelineResult<Vec<AssessmentTypeAverage>> {
        self.ensure_average_indexes().await?;

        let types = self.distinct_assessment_types().await?;
        info!(types = types.len(), "Averaging predicted scores by assessment type");

        let chunk_size = NonZeroUsize::new(self.batch_size)
            .ok_or_else(|| PipelineError::config("batch size must be positive"))?;
        let chunks: Vec<Vec<String>> = batches(types, chunk_size).collect();

        let engine = self.clone();
        let mut averages: Vec<AssessmentTypeAverage> =
            FanOutAggregator::new("average_by_assessment_type")
                .run(
                    chunks,
                    move |chunk| engine.clone().average_chunk(chunk),
                    |all: &mut Vec<AssessmentTypeAverage>, part| all.extend(part),
                )
                .await?;

        averages.sort_by(|a, b| b.average_score.total_cmp(&a.average_score));
        Ok(averages)
    }

    /// Distinct students per assessment
    ///
    /// One grouping pipeline feeds a shared cursor; a pool of workers drains
    /// it, decodes rows and pushes them through a bounded queue that this
    /// call collects. Undecodable rows are skipped.
    pub async fn student_count_by_assessment(&self) -> PipelineResult<Vec<AssessmentStudentCount>> {
        with_deadline(
            self.timeouts.lookup,
            self.store.create_index_if_absent(
                PREDICTION_ASSESSMENTS,
                IndexSpec::ascending("index_assessment_student", ["assessment_id", "student_id"]),
            ),
        )
        .await?;

        let pipeline = vec![
            Stage::Group {
                key: Some("assessment_id".to_string()),
                accumulators: vec![(
                    "student_count".to_string(),
                    Accumulator::AddToSet("student_id".to_string()),
                )],
            },
            Stage::Project(vec![
                ("assessment_id".to_string(), ProjectExpr::Field("_id".to_string())),
                ("student_count".to_string(), ProjectExpr::Size("student_count".to_string())),
            ]),
        ];
        let cursor = with_deadline(
            self.timeouts.analytics,
            self.store.aggregate(PREDICTION_ASSESSMENTS, pipeline),
        )
        .await?;
        let cursor = Arc::new(Mutex::new(cursor));

        let workers = self.student_count_workers.max(1);
        let (tx, mut rx) = mpsc::channel(self.output_queue_capacity.max(1));
        let read_timeout = self.timeouts.analytics;

        let aggregator = FanOutAggregator::new("student_count_by_assessment");
        let drain = aggregator.run(
            (0..workers).collect(),
            move |worker: usize| {
                drain_cursor(worker, cursor.clone(), tx.clone(), read_timeout).boxed()
            },
            |rows: &mut usize, n| *rows += n,
        );
        let collect = async {
            let mut counts = Vec::new();
            while let Some(count) = rx.recv().await {
                counts.push(count);
            }
            counts
        };

        let (drained, mut counts) = tokio::join!(drain, collect);
        let rows: usize = drained?;
        debug!(rows, "Student counts drained");

        counts.sort_by_key(|c: &AssessmentStudentCount| c.assessment_id);
        Ok(counts)
    }

    async fn ensure_average_indexes(&self) -> PipelineResult<()> {
        self.average_indexes
            .get_or_try_init(|| async {
                let lookup = self.timeouts.lookup;
                with_deadline(
                    lookup,
                    self.store.create_index_if_absent(
                        PREDICTION_ASSESSMENTS,
                        IndexSpec::ascending("index_assessment_id", ["assessment_id"]),
                    ),
                )
                .await?;
                with_deadline(
                    lookup,
                    self.store.create_index_if_absent(
                        ASSESSMENTS,
                        IndexSpec::ascending("index_assessmenttype", ["assessment_type"]),
                    ),
                )
                .await?;
                info!("Average-by-type indexes in place");
                PipelineResult::Ok(())
            })
            .await?;
        Ok(())
    }

    async fn distinct_assessment_types(&self) -> PipelineResult<Vec<String>> {
        let pipeline = vec![Stage::Group {
            key: Some("assessment_type".to_string()),
            accumulators: Vec::new(),
        }];
        let rows = self
            .collect(ASSESSMENTS, pipeline, self.timeouts.lookup)
            .await?;

        rows.into_iter()
            .map(|row| match row.get("_id") {
                Some(Value::String(t)) => Ok(t.clone()),
                other => Err(PipelineError::Store(StoreError::serialization(format!(
                    "unexpected assessment type {:?}",
                    other
                )))),
            })
            .collect()
    }

    fn average_chunk(
        self,
        types: Vec<String>,
    ) -> BoxFuture<'static, PipelineResult<Vec<AssessmentTypeAverage>>> {
        async move {
            let ids = self.assessment_ids_for(types).await?;
            if ids.is_empty() {
                return Ok(Vec::new());
            }

            let pipeline = vec![
                Stage::Match(Filter::is_in("assessment_id", ids)),
                Stage::Lookup {
                    from: ASSESSMENTS.to_string(),
                    local_field: "assessment_id".to_string(),
                    foreign_field: "id_assessment".to_string(),
                    as_field: "assessment_info".to_string(),
                },
                Stage::Unwind("assessment_info".to_string()),
                Stage::Group {
                    key: Some("assessment_info.assessment_type".to_string()),
                    accumulators: vec![(
                        "average_score".to_string(),
                        Accumulator::Avg("predicted_score".to_string()),
                    )],
                },
                Stage::Sort {
                    field: "average_score".to_string(),
                    order: SortOrder::Descending,
                },
                Stage::Project(vec![
                    ("assessment_type".to_string(), ProjectExpr::Field("_id".to_string())),
                    ("average_score".to_string(), ProjectExpr::Field("average_score".to_string())),
                ]),
            ];
            let rows = self
                .collect(PREDICTION_ASSESSMENTS, pipeline, self.timeouts.analytics)
                .await?;
            Ok(decode_rows(rows))
        }
        .boxed()
    }

    async fn assessment_ids_for(&self, types: Vec<String>) -> PipelineResult<Vec<Value>> {
        let store = self.store.clone();
        let filter = Filter::is_in("assessment_type", types.into_iter().map(Value::from).collect());
        let ids = with_deadline(self.timeouts.lookup, async move {
            let mut cursor = store
                .find(ASSESSMENTS, filter, Projection::include(["id_assessment"]))
                .await?;
            let mut ids = Vec::new();
            while let Some(doc) = cursor.next().await {
                match doc?.remove("id_assessment") {
                    Some(id) => ids.push(id),
                    None => warn!("Assessment without id_assessment ignored"),
                }
            }
            StoreResult::Ok(ids)
        })
        .await?;
        Ok(ids)
    }

    async fn collect(
        &self,
        collection: &str,
        pipeline: Vec<Stage>,
        limit: Duration,
    ) -> PipelineResult<Vec<Document>> {
        let store = self.store.clone();
        let rows = with_deadline(limit, async move {
            let cursor = store.aggregate(collection, pipeline).await?;
            cursor.collect::<Vec<_>>().await.into_iter().collect::<StoreResult<Vec<_>>>()
        })
        .await?;
        Ok(rows)
    }
}

/// Pull rows off the shared cursor until it is exhausted
///
/// Returns the number of rows this worker forwarded.
async fn drain_cursor(
    worker: usize,
    cursor: Arc<Mutex<DocumentStream>>,
    queue: mpsc::Sender<AssessmentStudentCount>,
    read_timeout: Duration,
) -> PipelineResult<usize> {
    let mut forwarded = 0;
    loop {
        let next = with_deadline(read_timeout, async {
            StoreResult::Ok(cursor.lock().await.next().await)
        })
        .await?;
        let doc = match next {
            None => break,
            Some(doc) => doc?,
        };
        match serde_json::from_value::<AssessmentStudentCount>(Value::Object(doc)) {
            Ok(count) => {
                if queue.send(count).await.is_err() {
                    break;
                }
                forwarded += 1;
            }
            Err(e) => warn!(worker, "Skipping undecodable student count: {}", e),
        }
    }
    debug!(worker, forwarded, "Worker finished");
    Ok(forwarded)
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Document>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(Value::Object(row)) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Skipping undecodable result row: {}", e);
                None
            }
        })
        .collect()
}
