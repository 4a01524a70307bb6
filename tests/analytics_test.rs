//! End-to-end tests: CSV load, predictions and the three reports

use oulad_analytics::config::PipelineConfig;
use oulad_analytics::store::{DocumentStore, MemoryStore};
use oulad_analytics::testing::ScriptedStore;
use oulad_analytics::{Pipeline, PipelineError};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_dataset(dir: &Path) {
    fs::write(
        dir.join("assessments.csv"),
        "code_module,code_presentation,id_assessment,assessment_type,date,weight\n\
         AAA,2013J,1752,TMA,19,10\n\
         AAA,2013J,1753,TMA,54,20\n\
         AAA,2013J,1757,Exam,,100\n\
         BBB,2013J,14991,CMA,54,0\n",
    )
    .unwrap();
    fs::write(
        dir.join("studentAssessment.csv"),
        "id_assessment,id_student,date_submitted,is_banked,score\n\
         1752,11391,18,0,78\n\
         1752,28400,22,0,70\n\
         1753,11391,53,0,90\n\
         1757,28400,240,0,50\n",
    )
    .unwrap();
    fs::write(
        dir.join("vle.csv"),
        "id_site,code_module,code_presentation,activity_type,week_from,week_to\n\
         546652,AAA,2013J,forum,,\n\
         546614,AAA,2013J,quiz,,\n",
    )
    .unwrap();
    fs::write(
        dir.join("studentVle.csv"),
        "code_module,code_presentation,id_student,id_site,date,sum_click\n\
         AAA,2013J,28400,546652,-10,10\n\
         AAA,2013J,28400,546614,-10,4\n\
         AAA,2013J,11391,999999,-5,3\n",
    )
    .unwrap();
}

fn config(data_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        batch_size: 2,
        insert_concurrency: 3,
        student_count_workers: 3,
        output_queue_capacity: 2,
        data_dir: data_dir.to_path_buf(),
        ..PipelineConfig::default()
    }
}

async fn loaded_pipeline(dir: &TempDir) -> Pipeline {
    write_dataset(dir.path());
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new("oulad")), config(dir.path())).unwrap();
    let report = pipeline.load_directory(None).await.unwrap();
    assert_eq!(report.records(), 13);
    pipeline
}

#[tokio::test]
async fn test_assessment_predictions_feed_every_report() {
    let dir = TempDir::new().unwrap();
    let pipeline = loaded_pipeline(&dir).await;

    let predictions = pipeline.process_assessment_predictions().await.unwrap();
    assert_eq!(predictions.len(), 4);
    assert!(predictions.iter().all(|p| p.assessment_id.is_some()));

    let distribution = pipeline.score_distribution().await.unwrap();
    let counts: Vec<(&str, u64)> = distribution
        .iter()
        .map(|b| (b.label.as_str(), b.count))
        .collect();
    assert_eq!(
        counts,
        vec![
            ("Menos de 60", 1),
            ("60 a 70", 0),
            ("70 a 80", 1),
            ("80 a 90", 1),
            ("Más de 90", 1),
        ]
    );

    let averages = pipeline.average_by_assessment_type().await.unwrap();
    assert_eq!(averages.len(), 2);
    assert_eq!(averages[0].assessment_type, "TMA");
    assert!((averages[0].average_score - (78.0 + 70.0 + 90.0) * 1.05 / 3.0).abs() < 1e-9);
    assert_eq!(averages[1].assessment_type, "Exam");
    assert!((averages[1].average_score - 52.5).abs() < 1e-9);

    let students = pipeline.student_count_by_assessment().await.unwrap();
    let students: Vec<(i64, u64)> = students
        .iter()
        .map(|c| (c.assessment_id, c.student_count))
        .collect();
    assert_eq!(students, vec![(1752, 2), (1753, 1), (1757, 1)]);
}

#[tokio::test]
async fn test_vle_predictions_weight_by_site_activity() {
    let dir = TempDir::new().unwrap();
    let pipeline = loaded_pipeline(&dir).await;

    let mut predictions = pipeline.process_vle_predictions().await.unwrap();
    predictions.sort_by(|a, b| a.predicted_score.total_cmp(&b.predicted_score));
    let scores: Vec<f64> = predictions.iter().map(|p| p.predicted_score).collect();

    // unknown site uses the default weight
    assert_eq!(scores, vec![3.0, 6.0, 12.0]);
    assert!(predictions.iter().all(|p| p.assessment_id.is_none()));

    let stored = pipeline.fetch_collection("prediction_vle").await.unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|d| !d.contains_key("assessment_id")));
}

#[tokio::test]
async fn test_reports_over_empty_store() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new("oulad")), config(dir.path())).unwrap();

    let distribution = pipeline.score_distribution().await.unwrap();
    assert_eq!(distribution.len(), 5);
    assert!(distribution.iter().all(|b| b.count == 0));

    assert!(pipeline.average_by_assessment_type().await.unwrap().is_empty());
    assert!(pipeline.student_count_by_assessment().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_counting_loaded_collections() {
    let dir = TempDir::new().unwrap();
    let pipeline = loaded_pipeline(&dir).await;

    let counts = pipeline
        .count_all(["assessments", "studentAssessment", "vle", "studentVle"])
        .await
        .unwrap();
    assert_eq!(counts["assessments"], 4);
    assert_eq!(counts["studentAssessment"], 4);
    assert_eq!(counts["vle"], 2);
    assert_eq!(counts["studentVle"], 3);
}

#[tokio::test]
async fn test_broken_student_count_stream_fails_the_report() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path());

    let memory = MemoryStore::new("oulad");
    let store = Arc::new(ScriptedStore::new(memory).break_aggregate_stream("prediction_assessments"));
    let pipeline = Pipeline::new(store.clone(), config(dir.path())).unwrap();
    pipeline.load_directory(None).await.unwrap();
    pipeline.process_assessment_predictions().await.unwrap();

    let err = pipeline.student_count_by_assessment().await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Aggregate { ref phase, .. } if phase == "student_count_by_assessment"
    ));
    assert_eq!(store.inner().database(), "oulad");
}
