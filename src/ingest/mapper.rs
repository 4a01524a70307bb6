//! Raw row to typed record mapping
//!
//! Fields are read by fixed position. Numeric fields that fail to parse read
//! as zero instead of rejecting the row, so a dirty cell never costs the
//! rest of the record.

use crate::error::PipelineResult;
use crate::ingest::record::*;

/// Map one raw row to the record shape of `collection`
pub fn map_record(collection: &str, raw: &RawRecord) -> PipelineResult<TypedRecord> {
    let kind: CollectionKind = collection.parse()?;
    Ok(map_kind(kind, raw))
}

/// Map one raw row for an already-resolved collection kind
pub fn map_kind(kind: CollectionKind, raw: &RawRecord) -> TypedRecord {
    match kind {
        CollectionKind::Courses => TypedRecord::Course(Course {
            code_module: raw.text(0).to_string(),
            code_presentation: raw.text(1).to_string(),
            length: raw.int(2),
        }),
        CollectionKind::Assessments => TypedRecord::Assessment(Assessment {
            code_module: raw.text(0).to_string(),
            code_presentation: raw.text(1).to_string(),
            id_assessment: raw.int(2),
            assessment_type: raw.text(3).to_string(),
            date: raw.int(4),
            weight: raw.int(5),
        }),
        CollectionKind::Vle => TypedRecord::VleSite(VleSite {
            id_site: raw.int(0),
            code_module: raw.text(1).to_string(),
            code_presentation: raw.text(2).to_string(),
            activity_type: raw.text(3).to_string(),
            week_from: raw.int(4),
            week_to: raw.int(5),
        }),
        CollectionKind::StudentInfo => TypedRecord::StudentInfo(StudentInfo {
            code_module: raw.text(0).to_string(),
            code_presentation: raw.text(1).to_string(),
            id_student: raw.int(2),
            gender: raw.text(3).to_string(),
            region: raw.text(4).to_string(),
            highest_education: raw.text(5).to_string(),
            imd_band: raw.text(6).to_string(),
            age_band: raw.text(7).to_string(),
            num_of_prev_attempts: raw.int(8),
            studied_credits: raw.int(9),
            disability: raw.text(10).to_string(),
            final_result: raw.text(11).to_string(),
        }),
        CollectionKind::StudentRegistration => {
            TypedRecord::StudentRegistration(StudentRegistration {
                code_module: raw.text(0).to_string(),
                code_presentation: raw.text(1).to_string(),
                id_student: raw.int(2),
                date_registration: raw.int(3),
                date_unregistration: raw.int(4),
            })
        }
        CollectionKind::StudentAssessment => TypedRecord::StudentAssessment(StudentAssessment {
            id_assessment: raw.int(0),
            id_student: raw.int(1),
            date_submitted: raw.int(2),
            is_banked: raw.int(3),
            score: raw.float(4),
        }),
        CollectionKind::StudentVle => {
            TypedRecord::StudentVleInteraction(StudentVleInteraction {
                code_module: raw.text(0).to_string(),
                code_presentation: raw.text(1).to_string(),
                id_student: raw.int(2),
                id_site: raw.int(3),
                date: raw.int(4),
                sum_click: raw.int(5),
            })
        }
    }
}
