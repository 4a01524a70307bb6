//! Fixed predicted-score heuristics
//!
//! These are an external contract: the uplift factor and the weight table
//! must not change.

/// Multiplier applied to a current assessment score
pub const ASSESSMENT_UPLIFT: f64 = 1.05;

/// Weight used for any resource type not in the table
pub const DEFAULT_INTERACTION_WEIGHT: f64 = 1.0;

/// Predicted score for a student's current assessment score
pub fn score_assessment(current_score: f64) -> f64 {
    current_score * ASSESSMENT_UPLIFT
}

/// Click weight for a VLE resource type
pub fn interaction_weight(resource_type: &str) -> f64 {
    match resource_type {
        "forum" => 1.2,
        "quiz" => 1.5,
        "resource" => 1.0,
        "assignment" => 1.8,
        _ => DEFAULT_INTERACTION_WEIGHT,
    }
}

/// Predicted score for `clicks` on a resource of `resource_type`
pub fn score_vle_interaction(resource_type: &str, clicks: i64) -> f64 {
    clicks as f64 * interaction_weight(resource_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_vle_weights() {
        assert_eq!(score_vle_interaction("quiz", 10), 15.0);
        assert_eq!(score_vle_interaction("unknown_type", 10), 10.0);
        assert_eq!(score_vle_interaction("", 10), 10.0);
        assert_eq!(score_vle_interaction("assignment", 5), 5.0 * 1.8);
        assert_eq!(score_vle_interaction("forum", 0), 0.0);
    }

    #[test]
    fn test_zero_score_stays_zero() {
        assert_eq!(score_assessment(0.0), 0.0);
    }

    proptest! {
        #[test]
        fn prop_assessment_uplift_is_exact(s in 0.0f64..1000.0) {
            prop_assert_eq!(score_assessment(s), s * 1.05);
            prop_assert_eq!(score_assessment(s), score_assessment(s));
        }
    }
}
