//! Testing utilities and fixtures
//!
//! Store doubles and small document builders shared by unit tests and the
//! integration tests under `tests/`.

pub mod scripted;

pub use scripted::ScriptedStore;

use serde_json::Value;

use crate::store::Document;

/// Build a document from a `json!` object literal
///
/// Panics if `value` is not an object; only meant for tests.
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}
