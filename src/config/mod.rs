//! Runtime configuration for ingestion and analytics.
//!
//! Configuration is layered with increasing precedence:
//!
//! 1. Hardcoded defaults
//! 2. A TOML file (`--config oulad.toml`)
//! 3. Environment variables (`OULAD_*`)
//!
//! ```toml
//! database = "oulad"
//! batch_size = 5000
//! insert_concurrency = 10
//!
//! [count_retry]
//! max_attempts = 3
//! delay = "2s"
//!
//! [timeouts]
//! analytics = "10m"
//!
//! [store]
//! backend = "file"
//! base_dir = "/var/lib/oulad"
//! ```
//!
//! Validation reports every invalid field at once rather than stopping at the
//! first one.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};
use crate::store::{BackendType, StoreConfig};

pub const ENV_DATABASE: &str = "OULAD_DATABASE";
pub const ENV_BATCH_SIZE: &str = "OULAD_BATCH_SIZE";
pub const ENV_INSERT_CONCURRENCY: &str = "OULAD_INSERT_CONCURRENCY";
pub const ENV_DATA_DIR: &str = "OULAD_DATA_DIR";
pub const ENV_STORE_BACKEND: &str = "OULAD_STORE_BACKEND";
pub const ENV_STORE_DIR: &str = "OULAD_STORE_DIR";

/// Top-level pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Logical database name
    pub database: String,

    /// Records per insertion batch; also the chunk size for analytics fan-out
    pub batch_size: usize,

    /// Maximum insert-many calls in flight at once
    pub insert_concurrency: usize,

    pub count_retry: RetryPolicy,

    pub timeouts: Timeouts,

    /// Workers draining the distinct-student aggregation stream
    pub student_count_workers: usize,

    /// Capacity of the bounded queue those workers fill
    pub output_queue_capacity: usize,

    /// Directory holding the OULAD CSV files
    pub data_dir: PathBuf,

    pub store: StoreConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database: "oulad".to_string(),
            batch_size: 5000,
            insert_concurrency: 10,
            count_retry: RetryPolicy::default(),
            timeouts: Timeouts::default(),
            student_count_workers: 10,
            output_queue_capacity: 1000,
            data_dir: PathBuf::from("data"),
            store: StoreConfig::default(),
        }
    }
}

/// Fixed-delay retry policy for estimated counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Deadlines applied to individual store calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Collection listing, index creation, id lookups
    #[serde(with = "humantime_serde")]
    pub lookup: Duration,

    /// One insert-many call
    #[serde(with = "humantime_serde")]
    pub insert: Duration,

    /// One count attempt
    #[serde(with = "humantime_serde")]
    pub count: Duration,

    /// Grouping pipelines and distributions
    #[serde(with = "humantime_serde")]
    pub analytics: Duration,

    /// Full-collection scans that produce predictions
    #[serde(with = "humantime_serde")]
    pub scan: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            lookup: Duration::from_secs(10),
            insert: Duration::from_secs(30),
            count: Duration::from_secs(60),
            analytics: Duration::from_secs(10 * 60),
            scan: Duration::from_secs(30 * 60),
        }
    }
}

impl PipelineConfig {
    /// Load from an optional TOML file, then apply `OULAD_*` environment overrides
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        toml::from_str(content).map_err(|e| PipelineError::config(format!("invalid TOML: {}", e)))
    }

    /// Apply overrides from an environment lookup (injectable for tests)
    pub fn apply_env_with<F>(&mut self, lookup: F) -> PipelineResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(database) = lookup(ENV_DATABASE) {
            self.database = database;
        }
        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            self.batch_size = parse_env(ENV_BATCH_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_INSERT_CONCURRENCY) {
            self.insert_concurrency = parse_env(ENV_INSERT_CONCURRENCY, &raw)?;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_STORE_BACKEND) {
            self.store.backend = raw.parse::<BackendType>().map_err(PipelineError::config)?;
        }
        if let Some(dir) = lookup(ENV_STORE_DIR) {
            self.store.base_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Check every field, reporting all problems together
    pub fn validate(&self) -> PipelineResult<()> {
        let mut problems = Vec::new();
        if self.database.trim().is_empty() {
            problems.push("database must not be empty".to_string());
        }
        if self.batch_size == 0 {
            problems.push("batch_size must be positive".to_string());
        }
        if self.insert_concurrency == 0 {
            problems.push("insert_concurrency must be positive".to_string());
        }
        if self.count_retry.max_attempts == 0 {
            problems.push("count_retry.max_attempts must be positive".to_string());
        }
        if self.student_count_workers == 0 {
            problems.push("student_count_workers must be positive".to_string());
        }
        if self.output_queue_capacity == 0 {
            problems.push("output_queue_capacity must be positive".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Config(problems.join("; ")))
        }
    }

    pub fn batch_size(&self) -> PipelineResult<NonZeroUsize> {
        NonZeroUsize::new(self.batch_size)
            .ok_or_else(|| PipelineError::config("batch_size must be positive"))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> PipelineResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| PipelineError::config(format!("{}={:?}: {}", key, raw, e)))
}
