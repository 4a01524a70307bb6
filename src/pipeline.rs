//! Entry point tying ingestion, counting, predictions and analytics together
//!
//! A [`Pipeline`] owns its store handle, configuration and a tracing span.
//! Every operation runs inside that span, so log lines from concurrent
//! workers carry the database they belong to.

use futures::TryStreamExt;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, Instrument, Span};

use crate::aggregate::RetryingCounter;
use crate::analytics::{AnalyticsEngine, AssessmentStudentCount, AssessmentTypeAverage, ScoreBucket};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ingest::{
    list_data_files, BoundedInserter, CsvLoader, DataFile, InsertReport, LoadReport, TypedRecord,
};
use crate::predict::{PredictionProcessor, PredictionRecord};
use crate::store::{
    with_deadline, Document, DocumentStore, Filter, Projection, StoreError, StoreFactory,
};

pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    config: PipelineConfig,
    counter: RetryingCounter,
    predictions: PredictionProcessor,
    analytics: AnalyticsEngine,
    logger: Span,
}

impl Pipeline {
    /// Validate `config` and wire every component to `store`
    pub fn new(store: Arc<dyn DocumentStore>, config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;

        let counter = RetryingCounter::new(store.clone(), config.count_retry.clone())
            .with_call_timeout(config.timeouts.count);
        let predictions = PredictionProcessor::new(store.clone(), &config);
        let analytics = AnalyticsEngine::new(store.clone(), &config);
        let logger = tracing::info_span!("pipeline", database = %store.database());

        Ok(Self {
            store,
            config,
            counter,
            predictions,
            analytics,
            logger,
        })
    }

    /// Build the configured store backend, then the pipeline over it
    pub async fn from_config(config: PipelineConfig) -> PipelineResult<Self> {
        let store = StoreFactory::from_config(&config.store, &config.database).await?;
        Self::new(store, config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    /// Insert typed records into `collection`, best-effort per batch
    pub async fn ingest_batches(
        &self,
        collection: &str,
        records: &[TypedRecord],
        batch_size: usize,
        max_concurrency: usize,
    ) -> PipelineResult<InsertReport> {
        BoundedInserter::new(self.store.clone())
            .with_call_timeout(self.config.timeouts.insert)
            .insert_records(collection, records, batch_size, max_concurrency)
            .instrument(self.logger.clone())
            .await
    }

    /// Load the OULAD CSV files from `dir`, or the configured data directory
    pub async fn load_directory(&self, dir: Option<&Path>) -> PipelineResult<LoadReport> {
        let dir = dir.unwrap_or(self.config.data_dir.as_path());
        let loader = CsvLoader::new(self.store.clone(), &self.config)?;
        Ok(loader
            .load_directory(dir)
            .instrument(self.logger.clone())
            .await)
    }

    pub fn list_data_files(&self, dir: Option<&Path>) -> PipelineResult<Vec<DataFile>> {
        let _entered = self.logger.enter();
        list_data_files(dir.unwrap_or(self.config.data_dir.as_path()))
    }

    /// Every document of an existing collection
    pub async fn fetch_collection(&self, collection: &str) -> PipelineResult<Vec<Document>> {
        let store = self.store.clone();
        let lookup = self.config.timeouts.lookup;
        let scan = self.config.timeouts.scan;

        async move {
            let names = with_deadline(lookup, store.list_collection_names()).await?;
            if !names.contains(collection) {
                return Err(PipelineError::from(StoreError::not_found(format!(
                    "collection '{}'",
                    collection
                ))));
            }
            let docs = with_deadline(scan, async {
                store
                    .find(collection, Filter::All, Projection::all())
                    .await?
                    .try_collect::<Vec<_>>()
                    .await
            })
            .await?;
            info!(collection, documents = docs.len(), "Fetched collection");
            PipelineResult::Ok(docs)
        }
        .instrument(self.logger.clone())
        .await
    }

    /// Estimated counts for every named collection, or the first failure
    pub async fn count_all<I, S>(&self, collections: I) -> PipelineResult<BTreeMap<String, u64>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.counter
            .count_all(collections)
            .instrument(self.logger.clone())
            .await
    }

    pub async fn process_assessment_predictions(&self) -> PipelineResult<Vec<PredictionRecord>> {
        self.predictions
            .process_assessment_predictions()
            .instrument(self.logger.clone())
            .await
    }

    pub async fn process_vle_predictions(&self) -> PipelineResult<Vec<PredictionRecord>> {
        self.predictions
            .process_vle_predictions()
            .instrument(self.logger.clone())
            .await
    }

    pub async fn score_distribution(&self) -> PipelineResult<Vec<ScoreBucket>> {
        self.analytics
            .score_distribution()
            .instrument(self.logger.clone())
            .await
    }

    pub async fn average_by_assessment_type(&self) -> PipelineResult<Vec<AssessmentTypeAverage>> {
        self.analytics
            .average_by_assessment_type()
            .instrument(self.logger.clone())
            .await
    }

    pub async fn student_count_by_assessment(&self) -> PipelineResult<Vec<AssessmentStudentCount>> {
        self.analytics
            .student_count_by_assessment()
            .instrument(self.logger.clone())
            .await
    }
}
