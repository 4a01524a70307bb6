//! Prediction analytics
//!
//! Score distribution, grouped averages and distinct-student counts over the
//! stored assessment predictions.

pub mod engine;
pub mod models;

pub use engine::AnalyticsEngine;
pub use models::*;
