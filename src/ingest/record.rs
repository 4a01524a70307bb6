//! Raw and typed record shapes for the seven OULAD tables

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// One input row: ordered text fields with no inherent type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord(Vec<String>);

impl RawRecord {
    pub fn new(fields: Vec<String>) -> Self {
        Self(fields)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Field text, or the empty string when the row is short
    pub fn text(&self, index: usize) -> &str {
        self.0.get(index).map(String::as_str).unwrap_or("")
    }

    /// Permissive integer parse: anything unparseable reads as zero
    pub fn int(&self, index: usize) -> i64 {
        self.text(index).trim().parse().unwrap_or(0)
    }

    /// Permissive float parse: anything unparseable reads as zero
    pub fn float(&self, index: usize) -> f64 {
        self.text(index)
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|x| x.is_finite())
            .unwrap_or(0.0)
    }
}

impl<S: Into<String>> FromIterator<S> for RawRecord {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Fields that are not valid UTF-8 are decoded lossily
impl From<&csv::ByteRecord> for RawRecord {
    fn from(record: &csv::ByteRecord) -> Self {
        record
            .iter()
            .map(|field| String::from_utf8_lossy(field).into_owned())
            .collect()
    }
}

/// The collections that have a record schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    Courses,
    Assessments,
    Vle,
    StudentInfo,
    StudentRegistration,
    StudentAssessment,
    StudentVle,
}

impl CollectionKind {
    /// Every kind, in the order the loader ingests them
    pub const ALL: [CollectionKind; 7] = [
        CollectionKind::Courses,
        CollectionKind::Assessments,
        CollectionKind::StudentInfo,
        CollectionKind::Vle,
        CollectionKind::StudentAssessment,
        CollectionKind::StudentVle,
        CollectionKind::StudentRegistration,
    ];

    /// Store collection name
    pub fn name(self) -> &'static str {
        match self {
            CollectionKind::Courses => "courses",
            CollectionKind::Assessments => "assessments",
            CollectionKind::Vle => "vle",
            CollectionKind::StudentInfo => "studentInfo",
            CollectionKind::StudentRegistration => "studentRegistration",
            CollectionKind::StudentAssessment => "studentAssessment",
            CollectionKind::StudentVle => "studentVle",
        }
    }

    /// CSV file the collection is loaded from
    pub fn file_name(self) -> String {
        format!("{}.csv", self.name())
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CollectionKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectionKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| PipelineError::Schema {
                collection: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub code_module: String,
    pub code_presentation: String,
    pub length: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id_assessment: i64,
    pub code_module: String,
    pub code_presentation: String,
    pub assessment_type: String,
    pub date: i64,
    pub weight: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VleSite {
    pub id_site: i64,
    pub code_module: String,
    pub code_presentation: String,
    pub activity_type: String,
    pub week_from: i64,
    pub week_to: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentInfo {
    pub id_student: i64,
    pub code_module: String,
    pub code_presentation: String,
    pub gender: String,
    pub region: String,
    pub highest_education: String,
    /// Deprivation band as published, e.g. `"20-30%"`
    pub imd_band: String,
    pub age_band: String,
    pub num_of_prev_attempts: i64,
    pub studied_credits: i64,
    pub disability: String,
    pub final_result: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRegistration {
    pub code_module: String,
    pub code_presentation: String,
    pub id_student: i64,
    pub date_registration: i64,
    pub date_unregistration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAssessment {
    pub id_assessment: i64,
    pub id_student: i64,
    pub date_submitted: i64,
    pub is_banked: i64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentVleInteraction {
    pub code_module: String,
    pub code_presentation: String,
    pub id_student: i64,
    pub id_site: i64,
    pub date: i64,
    pub sum_click: i64,
}

/// A parsed row of one of the seven tables; serializes flat, without a tag
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TypedRecord {
    Course(Course),
    Assessment(Assessment),
    VleSite(VleSite),
    StudentInfo(StudentInfo),
    StudentRegistration(StudentRegistration),
    StudentAssessment(StudentAssessment),
    StudentVleInteraction(StudentVleInteraction),
}

impl TypedRecord {
    pub fn kind(&self) -> CollectionKind {
        match self {
            TypedRecord::Course(_) => CollectionKind::Courses,
            TypedRecord::Assessment(_) => CollectionKind::Assessments,
            TypedRecord::VleSite(_) => CollectionKind::Vle,
            TypedRecord::StudentInfo(_) => CollectionKind::StudentInfo,
            TypedRecord::StudentRegistration(_) => CollectionKind::StudentRegistration,
            TypedRecord::StudentAssessment(_) => CollectionKind::StudentAssessment,
            TypedRecord::StudentVleInteraction(_) => CollectionKind::StudentVle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permissive_parsing_degrades_to_zero() {
        let raw: RawRecord = ["12", "", "n/a", " 7 ", "78.5", "NaN"].into_iter().collect();
        assert_eq!(raw.int(0), 12);
        assert_eq!(raw.int(1), 0);
        assert_eq!(raw.int(2), 0);
        assert_eq!(raw.int(3), 7);
        assert_eq!(raw.float(4), 78.5);
        assert_eq!(raw.float(5), 0.0);
        assert_eq!(raw.int(40), 0);
        assert_eq!(raw.text(40), "");
    }

    #[test]
    fn test_collection_names_round_trip() {
        for kind in CollectionKind::ALL {
            assert_eq!(kind.name().parse::<CollectionKind>().unwrap(), kind);
        }
        assert_eq!(CollectionKind::StudentVle.file_name(), "studentVle.csv");
    }

    #[test]
    fn test_unknown_collection_is_schema_error() {
        let err = "prediction_vle".parse::<CollectionKind>().unwrap_err();
        assert!(matches!(err, PipelineError::Schema { collection } if collection == "prediction_vle"));
    }

    #[test]
    fn test_typed_record_serializes_flat() {
        let record = TypedRecord::Course(Course {
            code_module: "AAA".into(),
            code_presentation: "2013J".into(),
            length: 268,
        });
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            serde_json::json!({"code_module": "AAA", "code_presentation": "2013J", "length": 268})
        );
        assert_eq!(record.kind(), CollectionKind::Courses);
    }
}
