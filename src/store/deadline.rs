//! Per-call deadlines for store operations

use std::future::Future;
use std::time::Duration;

use super::error::{StoreError, StoreResult};

/// Await a store call, failing with [`StoreError::Timeout`] once `limit` elapses
pub async fn with_deadline<T, F>(limit: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
