//! # oulad-analytics
//!
//! Batch ingestion and aggregation over the Open University Learning
//! Analytics Dataset.
//!
//! ## Usage
//!
//! ```bash
//! oulad load --data-dir ./data
//! oulad predict assessments
//! oulad report distribution
//! ```
//!
//! ## Modules
//!
//! - `store` - Document store trait, pipeline model and the memory/file backends
//! - `ingest` - Record mapping, batching, bounded insertion and CSV loading
//! - `predict` - Field coercion, fixed scoring heuristics and prediction runs
//! - `aggregate` - Fan-out/fan-in phases and the retrying counter
//! - `analytics` - Score distribution, per-type averages and distinct-student counts
//! - `pipeline` - Facade wiring the above to one store and configuration
//! - `config` - TOML and environment configuration
//! - `testing` - Store doubles for tests
pub mod aggregate;
pub mod analytics;
pub mod config;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod predict;
pub mod store;

pub mod testing;

pub use error::{CoercionError, PipelineError, PipelineResult};
pub use pipeline::Pipeline;
