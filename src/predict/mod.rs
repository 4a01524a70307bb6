//! Predicted scores derived from stored student activity

pub mod coerce;
pub mod processor;
pub mod scorer;

pub use coerce::{coerce_float, coerce_integer};
pub use processor::{PredictionProcessor, PredictionRecord, PREDICTION_ASSESSMENTS, PREDICTION_VLE};
pub use scorer::{interaction_weight, score_assessment, score_vle_interaction};
