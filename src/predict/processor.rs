//! Prediction batch processing
//!
//! Scans a source collection, coerces the fields each prediction needs,
//! scores them and stores the predictions through the bounded inserter.
//! A document whose fields are missing or malformed is logged and skipped;
//! it never stops the run.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{CoercionError, PipelineResult};
use crate::ingest::BoundedInserter;
use crate::predict::coerce::{coerce_float, coerce_integer, required};
use crate::predict::scorer::{score_assessment, score_vle_interaction};
use crate::store::{with_deadline, Document, DocumentStore, Filter, Projection, StoreResult};

pub const PREDICTION_ASSESSMENTS: &str = "prediction_assessments";
pub const PREDICTION_VLE: &str = "prediction_vle";

/// A stored prediction; written once, never updated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub student_id: i64,
    /// Only set for assessment-score predictions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment_id: Option<i64>,
    pub predicted_score: f64,
    pub produced_at: DateTime<Utc>,
}

impl PredictionRecord {
    /// Assessment-score prediction from a `studentAssessment` document
    pub fn from_assessment(doc: &Document) -> Result<Self, CoercionError> {
        let student_id = coerce_integer("id_student", required(doc, "id_student")?)?;
        let assessment_id = coerce_integer("id_assessment", required(doc, "id_assessment")?)?;
        let score = coerce_float("score", required(doc, "score")?)?;

        Ok(Self {
            student_id,
            assessment_id: Some(assessment_id),
            predicted_score: score_assessment(score),
            produced_at: Utc::now(),
        })
    }

    /// Engagement prediction from a `studentVle` document
    ///
    /// The resource type is the activity type of the interaction's site;
    /// sites missing from `site_types` score with the default weight.
    pub fn from_interaction(
        doc: &Document,
        site_types: &HashMap<i64, String>,
    ) -> Result<Self, CoercionError> {
        let student_id = coerce_integer("id_student", required(doc, "id_student")?)?;
        let clicks = coerce_integer("sum_click", required(doc, "sum_click")?)?;
        let resource_type = doc
            .get("id_site")
            .and_then(|v| coerce_integer("id_site", v).ok())
            .and_then(|site| site_types.get(&site))
            .map(String::as_str)
            .unwrap_or_default();

        Ok(Self {
            student_id,
            assessment_id: None,
            predicted_score: score_vle_interaction(resource_type, clicks),
            produced_at: Utc::now(),
        })
    }
}

/// Produces and stores predictions for the two supported sources
#[derive(Clone)]
pub struct PredictionProcessor {
    store: Arc<dyn DocumentStore>,
    inserter: BoundedInserter,
    batch_size: usize,
    insert_concurrency: usize,
    scan_timeout: Duration,
}

impl PredictionProcessor {
    pub fn new(store: Arc<dyn DocumentStore>, config: &PipelineConfig) -> Self {
        Self {
            inserter: BoundedInserter::new(store.clone()).with_call_timeout(config.timeouts.insert),
            store,
            batch_size: config.batch_size,
            insert_concurrency: config.insert_concurrency,
            scan_timeout: config.timeouts.scan,
        }
    }

    /// Score every `studentAssessment` document into `prediction_assessments`
    pub async fn process_assessment_predictions(&self) -> PipelineResult<Vec<PredictionRecord>> {
        let docs = self
            .scan(
                "studentAssessment",
                Projection::include(["id_student", "id_assessment", "score"]),
            )
            .await?;
        let predictions = convert("studentAssessment", &docs, PredictionRecord::from_assessment);
        self.store_predictions(PREDICTION_ASSESSMENTS, &predictions).await?;
        Ok(predictions)
    }

    /// Score every `studentVle` interaction into `prediction_vle`
    pub async fn process_vle_predictions(&self) -> PipelineResult<Vec<PredictionRecord>> {
        let site_types = self.site_types().await?;
        let docs = self
            .scan(
                "studentVle",
                Projection::include(["id_student", "id_site", "sum_click"]),
            )
            .await?;
        let predictions = convert("studentVle", &docs, |doc| {
            PredictionRecord::from_interaction(doc, &site_types)
        });
        self.store_predictions(PREDICTION_VLE, &predictions).await?;
        Ok(predictions)
    }

    async fn site_types(&self) -> PipelineResult<HashMap<i64, String>> {
        let sites = self
            .scan("vle", Projection::include(["id_site", "activity_type"]))
            .await?;
        let mut types = HashMap::with_capacity(sites.len());
        for site in &sites {
            let id = site.get("id_site").map(|v| coerce_integer("id_site", v));
            match (id, site.get("activity_type").and_then(|v| v.as_str())) {
                (Some(Ok(id)), Some(activity)) => {
                    types.insert(id, activity.to_string());
                }
                _ => warn!(collection = "vle", "Ignoring site without usable id or activity type"),
            }
        }
        Ok(types)
    }

    /// Read a whole collection under the scan deadline
    async fn scan(&self, collection: &str, projection: Projection) -> PipelineResult<Vec<Document>> {
        let store = self.store.clone();
        let docs = with_deadline(self.scan_timeout, async move {
            let mut cursor = store.find(collection, Filter::All, projection).await?;
            let mut docs = Vec::new();
            while let Some(doc) = cursor.next().await {
                docs.push(doc?);
            }
            StoreResult::Ok(docs)
        })
        .await?;
        Ok(docs)
    }

    async fn store_predictions(
        &self,
        collection: &str,
        predictions: &[PredictionRecord],
    ) -> PipelineResult<()> {
        let report = self
            .inserter
            .insert_records(collection, predictions, self.batch_size, self.insert_concurrency)
            .await?;
        info!(
            collection,
            predictions = predictions.len(),
            inserted = report.inserted(),
            failed_batches = report.failures.len(),
            "Stored predictions"
        );
        Ok(())
    }
}

fn convert<F>(collection: &str, docs: &[Document], mut to_prediction: F) -> Vec<PredictionRecord>
where
    F: FnMut(&Document) -> Result<PredictionRecord, CoercionError>,
{
    let mut skipped = 0usize;
    let predictions: Vec<PredictionRecord> = docs
        .iter()
        .filter_map(|doc| match to_prediction(doc) {
            Ok(prediction) => Some(prediction),
            Err(e) => {
                warn!(collection, "Skipping document: {}", e);
                skipped += 1;
                None
            }
        })
        .collect();

    if predictions.is_empty() {
        info!(collection, skipped, "No predictions produced");
    } else {
        info!(collection, produced = predictions.len(), skipped, "Predictions produced");
    }
    predictions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{doc, ScriptedStore};
    use serde_json::json;

    fn config() -> PipelineConfig {
        PipelineConfig {
            batch_size: 2,
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_assessment_predictions_skip_dirty_documents() {
        let store = MemoryStore::new("oulad");
        store
            .insert_many(
                "studentAssessment",
                vec![
                    doc(json!({"id_assessment": 1752, "id_student": 11391, "score": 78.0})),
                    doc(json!({"id_assessment": 1752, "id_student": "28400", "score": 70})),
                    doc(json!({"id_assessment": 1752, "id_student": 31604, "score": "n/a"})),
                    doc(json!({"id_student": 32885, "score": 69.0})),
                    doc(json!({"id_assessment": 1753.0, "id_student": 38053, "score": 0.0})),
                ],
            )
            .await
            .unwrap();
        let store = Arc::new(store);

        let predictions = PredictionProcessor::new(store.clone(), &config())
            .process_assessment_predictions()
            .await
            .unwrap();

        assert_eq!(predictions.len(), 3);
        assert_eq!(predictions[0].student_id, 11391);
        assert_eq!(predictions[0].predicted_score, score_assessment(78.0));
        assert_eq!(predictions[1].student_id, 28400);
        assert_eq!(predictions[2].assessment_id, Some(1753));
        assert_eq!(predictions[2].predicted_score, 0.0);
        assert_eq!(store.count_estimate(PREDICTION_ASSESSMENTS).await.unwrap(), 3);

        let stored = store.documents(PREDICTION_ASSESSMENTS).await;
        assert!(stored[0].contains_key("produced_at"));
        assert_eq!(stored[0]["assessment_id"], json!(1752));
    }

    #[tokio::test]
    async fn test_vle_predictions_weight_by_site_activity() {
        let store = MemoryStore::new("oulad");
        store
            .insert_many(
                "vle",
                vec![
                    doc(json!({"id_site": 1, "activity_type": "quiz"})),
                    doc(json!({"id_site": 2, "activity_type": "forum"})),
                ],
            )
            .await
            .unwrap();
        store
            .insert_many(
                "studentVle",
                vec![
                    doc(json!({"id_student": 7, "id_site": 1, "sum_click": 10})),
                    doc(json!({"id_student": 7, "id_site": 99, "sum_click": 10})),
                    doc(json!({"id_student": 8, "id_site": 2})),
                ],
            )
            .await
            .unwrap();
        let store = Arc::new(store);

        let predictions = PredictionProcessor::new(store.clone(), &config())
            .process_vle_predictions()
            .await
            .unwrap();

        let scores: Vec<f64> = predictions.iter().map(|p| p.predicted_score).collect();
        assert_eq!(scores, vec![15.0, 10.0]);
        assert!(predictions.iter().all(|p| p.assessment_id.is_none()));

        let stored = store.documents(PREDICTION_VLE).await;
        assert_eq!(stored.len(), 2);
        assert!(!stored[0].contains_key("assessment_id"));
    }

    #[tokio::test]
    async fn test_scan_failure_is_returned() {
        let store = Arc::new(ScriptedStore::new(MemoryStore::new("oulad")).fail_find("studentAssessment"));
        let result = PredictionProcessor::new(store, &config())
            .process_assessment_predictions()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_source_produces_nothing() {
        let store = Arc::new(ScriptedStore::new(MemoryStore::new("oulad")));
        let predictions = PredictionProcessor::new(store.clone(), &config())
            .process_vle_predictions()
            .await
            .unwrap();
        assert!(predictions.is_empty());
        assert!(store.insert_calls().is_empty());
    }
}
