//! Document store abstraction
//!
//! The pipeline talks to its database only through [`DocumentStore`]. Two
//! backends ship with the crate: [`MemoryStore`] for tests and one-shot runs,
//! and [`FileStore`] which keeps collections on disk between runs.

pub mod backends;
pub mod config;
pub mod deadline;
pub mod error;
pub mod factory;
pub mod pipeline;
pub mod traits;
pub mod types;

pub use backends::{FileStore, MemoryStore};
pub use config::{BackendType, StoreConfig};
pub use deadline::with_deadline;
pub use error::{StoreError, StoreResult};
pub use factory::StoreFactory;
pub use pipeline::{Accumulator, Pipeline, ProjectExpr, Stage};
pub use traits::DocumentStore;
pub use types::{to_document, Document, DocumentStream, Filter, IndexSpec, Projection, SortOrder};
