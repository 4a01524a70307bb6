//! Analytics result types and the fixed score ranges

use serde::{Deserialize, Serialize};

/// Number of predictions whose score fell in one fixed range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBucket {
    #[serde(rename = "range")]
    pub label: String,
    #[serde(rename = "student_count")]
    pub count: u64,
}

/// Mean predicted score of one assessment type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentTypeAverage {
    pub assessment_type: String,
    pub average_score: f64,
}

/// Distinct students holding a prediction for one assessment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentStudentCount {
    pub assessment_id: i64,
    pub student_count: u64,
}

/// A closed score interval `[lower, upper]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub lower: f64,
    pub upper: f64,
    pub label: &'static str,
}

impl ScoreRange {
    pub fn contains(&self, score: f64) -> bool {
        score >= self.lower && score <= self.upper
    }
}

/// Distribution ranges in classification order
pub const SCORE_RANGES: [ScoreRange; 5] = [
    ScoreRange { lower: 0.0, upper: 59.0, label: "Menos de 60" },
    ScoreRange { lower: 60.0, upper: 69.0, label: "60 a 70" },
    ScoreRange { lower: 70.0, upper: 79.0, label: "70 a 80" },
    ScoreRange { lower: 80.0, upper: 89.0, label: "80 a 90" },
    ScoreRange { lower: 90.0, upper: 100.0, label: "Más de 90" },
];

/// Index of the first range containing `score`
///
/// Scores between ranges (59.5) or outside all of them (104.9) match none.
pub fn classify(score: f64) -> Option<usize> {
    SCORE_RANGES.iter().position(|r| r.contains(score))
}

/// Count scores per range; every range is reported, empty ones with zero
pub fn bucket_scores<I>(scores: I) -> Vec<ScoreBucket>
where
    I: IntoIterator<Item = f64>,
{
    let mut counts = [0u64; SCORE_RANGES.len()];
    for score in scores {
        if let Some(i) = classify(score) {
            counts[i] += 1;
        }
    }
    SCORE_RANGES
        .iter()
        .zip(counts)
        .map(|(range, count)| ScoreBucket {
            label: range.label.to_string(),
            count,
        })
        .collect()
}
