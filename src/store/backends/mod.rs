//! Store backend implementations

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;

use super::error::{StoreError, StoreResult};
use super::types::IndexSpec;

/// Record an index definition; returns whether the catalogue changed
///
/// Re-registering an identical definition is a no-op. Reusing a name with
/// different keys is a conflict.
pub(crate) fn register_index(
    indexes: &mut BTreeMap<String, IndexSpec>,
    collection: &str,
    index: IndexSpec,
) -> StoreResult<bool> {
    match indexes.get(&index.name) {
        Some(existing) if existing.keys == index.keys => Ok(false),
        Some(_) => Err(StoreError::conflict(format!(
            "index '{}' on '{}' already exists with different keys",
            index.name, collection
        ))),
        None => {
            indexes.insert(index.name.clone(), index);
            Ok(true)
        }
    }
}
