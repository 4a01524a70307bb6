//! CSV ingestion of the OULAD tables
//!
//! Each of the seven files is read in windows of `batch_size *
//! insert_concurrency` rows, mapped to typed records and handed to the
//! bounded inserter. A file that cannot be opened or parsed is logged and
//! reported; loading carries on with the next file.

use serde::Serialize;
use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ingest::inserter::BoundedInserter;
use crate::ingest::mapper::map_kind;
use crate::ingest::record::{CollectionKind, RawRecord, TypedRecord};
use crate::store::DocumentStore;

/// Outcome of loading one CSV file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileLoad {
    pub collection: String,
    pub path: PathBuf,
    pub records: usize,
    pub inserted: usize,
    pub failed_batches: usize,
    pub skipped: usize,
    /// Set when the file could not be read to the end
    pub error: Option<String>,
}

impl FileLoad {
    fn new(kind: CollectionKind, path: &Path) -> Self {
        Self {
            collection: kind.name().to_string(),
            path: path.to_path_buf(),
            records: 0,
            inserted: 0,
            failed_batches: 0,
            skipped: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub files: Vec<FileLoad>,
}

impl LoadReport {
    pub fn records(&self) -> usize {
        self.files.iter().map(|f| f.records).sum()
    }

    pub fn failed_files(&self) -> impl Iterator<Item = &FileLoad> {
        self.files.iter().filter(|f| f.error.is_some())
    }
}

/// A CSV file found under the data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataFile {
    pub file_name: String,
    pub file_size: String,
}

pub struct CsvLoader {
    inserter: BoundedInserter,
    batch_size: NonZeroUsize,
    insert_concurrency: usize,
}

impl CsvLoader {
    pub fn new(store: Arc<dyn DocumentStore>, config: &PipelineConfig) -> PipelineResult<Self> {
        if config.insert_concurrency == 0 {
            return Err(PipelineError::config("insert concurrency must be positive"));
        }
        Ok(Self {
            inserter: BoundedInserter::new(store).with_call_timeout(config.timeouts.insert),
            batch_size: config.batch_size()?,
            insert_concurrency: config.insert_concurrency,
        })
    }

    /// Load every OULAD file found in `dir`
    pub async fn load_directory(&self, dir: &Path) -> LoadReport {
        info!(dir = %dir.display(), "Loading OULAD files");
        let mut report = LoadReport::default();

        for kind in CollectionKind::ALL {
            let path = dir.join(kind.file_name());
            let load = match self.load_file(kind, &path).await {
                Ok(load) => load,
                Err(e) => {
                    error!(file = %path.display(), "Failed to load file: {}", e);
                    FileLoad {
                        error: Some(e.to_string()),
                        ..FileLoad::new(kind, &path)
                    }
                }
            };
            report.files.push(load);
        }

        info!(
            records = report.records(),
            failed_files = report.failed_files().count(),
            "Loading complete"
        );
        report
    }

    /// Load one file into the collection of `kind`; the header row is skipped
    ///
    /// Cells that are not valid UTF-8 are read lossily. A read error partway
    /// through stops the file but keeps the counts of what was already
    /// stored, with `error` set.
    pub async fn load_file(&self, kind: CollectionKind, path: &Path) -> PipelineResult<FileLoad> {
        let file = tokio::fs::File::open(path).await?.into_std().await;
        let mut rows = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file)
            .into_byte_records();

        let window = self.batch_size.get().saturating_mul(self.insert_concurrency).max(1);
        let mut load = FileLoad::new(kind, path);

        loop {
            let (returned, records, read_error) =
                tokio::task::spawn_blocking(move || read_window(rows, kind, window)).await?;
            rows = returned;

            if !records.is_empty() {
                load.records += records.len();
                let report = self
                    .inserter
                    .insert_records(kind.name(), &records, self.batch_size.get(), self.insert_concurrency)
                    .await?;
                load.inserted += report.inserted();
                load.failed_batches += report.failures.len();
                load.skipped += report.skipped;
            }

            if let Some(e) = read_error {
                error!(collection = kind.name(), records = load.records, "Stopped reading file: {}", e);
                load.error = Some(PipelineError::from(e).to_string());
                break;
            }
            if records.len() < window {
                break;
            }
        }

        if load.failed_batches > 0 {
            warn!(collection = kind.name(), failed = load.failed_batches, "File loaded with failed batches");
        }
        info!(collection = kind.name(), records = load.records, "File loaded");
        Ok(load)
    }
}

type ByteRows = csv::ByteRecordsIntoIter<File>;

/// Read and map up to `window` rows; a read error ends the window early
fn read_window(
    mut rows: ByteRows,
    kind: CollectionKind,
    window: usize,
) -> (ByteRows, Vec<TypedRecord>, Option<csv::Error>) {
    let mut records = Vec::with_capacity(window);
    while records.len() < window {
        match rows.next() {
            Some(Ok(row)) => records.push(map_kind(kind, &RawRecord::from(&row))),
            Some(Err(e)) => return (rows, records, Some(e)),
            None => break,
        }
    }
    (rows, records, None)
}

/// CSV files under `dir`, searched recursively, with human-readable sizes
pub fn list_data_files(dir: &Path) -> PipelineResult<Vec<DataFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let is_csv = entry
            .path()
            .extension()
            .is_some_and(|ext| ext == "csv");
        if entry.file_type().is_file() && is_csv {
            let size = entry.metadata().map_err(std::io::Error::from)?.len();
            files.push(DataFile {
                file_name: entry.file_name().to_string_lossy().into_owned(),
                file_size: format_file_size(size),
            });
        }
    }
    info!(dir = %dir.display(), found = files.len(), "Listed data files");
    Ok(files)
}

/// `B` below one kibibyte, otherwise the largest of KB/MB/GB with two decimals
pub fn format_file_size(size: u64) -> String {
    const KB: u64 = 1 << 10;
    const MB: u64 = 1 << 20;
    const GB: u64 = 1 << 30;

    match size {
        s if s >= GB => format!("{:.2} GB", s as f64 / GB as f64),
        s if s >= MB => format!("{:.2} MB", s as f64 / MB as f64),
        s if s >= KB => format!("{:.2} KB", s as f64 / KB as f64),
        s => format!("{} B", s),
    }
}
