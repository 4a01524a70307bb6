//! File-based store backend
//!
//! Each collection is a JSON-lines file under `<base_dir>/<database>/`, and
//! index definitions live in `indexes.json` next to them. Pipelines are run
//! by loading the collections they touch and evaluating them in memory.

use async_trait::async_trait;
use futures::stream;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::register_index;
use crate::store::{
    error::{StoreError, StoreResult},
    pipeline::{evaluate, foreign_collections, Stage},
    traits::DocumentStore,
    types::{Document, DocumentStream, Filter, IndexSpec, Projection},
};

const INDEX_CATALOGUE: &str = "indexes.json";
const EXTENSION: &str = "jsonl";

type IndexCatalogue = BTreeMap<String, BTreeMap<String, IndexSpec>>;

/// File-based store backend
pub struct FileStore {
    database: String,
    dir: PathBuf,
    /// Serializes appends and catalogue rewrites
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) the database directory under `base_dir`
    pub async fn open(base_dir: impl AsRef<Path>, database: impl Into<String>) -> StoreResult<Self> {
        let database = database.into();
        let dir = base_dir.as_ref().join(&database);
        fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "Opened file store");
        Ok(Self {
            database,
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn collection_path(&self, collection: &str) -> StoreResult<PathBuf> {
        if collection.is_empty()
            || collection.contains(['/', '\\'])
            || collection.starts_with('.')
        {
            return Err(StoreError::not_found(format!(
                "invalid collection name '{}'",
                collection
            )));
        }
        Ok(self.dir.join(format!("{}.{}", collection, EXTENSION)))
    }

    async fn read_lines(&self, collection: &str) -> StoreResult<Vec<StoreResult<Document>>> {
        let path = self.collection_path(collection)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<Document>(line).map_err(StoreError::from))
            .collect())
    }

    /// All documents of a collection; corrupt lines are logged and skipped
    async fn load(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let mut docs = Vec::new();
        for (line, parsed) in self.read_lines(collection).await?.into_iter().enumerate() {
            match parsed {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!(collection, line = line + 1, "Skipping corrupt document: {}", e),
            }
        }
        Ok(docs)
    }

    async fn read_catalogue(&self) -> StoreResult<IndexCatalogue> {
        match fs::read(self.dir.join(INDEX_CATALOGUE)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(IndexCatalogue::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    fn database(&self) -> &str {
        &self.database
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<()> {
        let path = self.collection_path(collection)?;
        let mut buffer = Vec::new();
        for doc in &documents {
            serde_json::to_writer(&mut buffer, doc)?;
            buffer.push(b'\n');
        }

        let _guard = self.write_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }

    async fn count_estimate(&self, collection: &str) -> StoreResult<u64> {
        Ok(self.read_lines(collection).await?.len() as u64)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Filter,
        projection: Projection,
    ) -> StoreResult<DocumentStream> {
        let items: Vec<StoreResult<Document>> = self
            .read_lines(collection)
            .await?
            .into_iter()
            .filter(|parsed| match parsed {
                Ok(doc) => filter.matches(doc),
                Err(_) => true,
            })
            .map(|parsed| parsed.map(|doc| projection.apply(&doc)))
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Stage>,
    ) -> StoreResult<DocumentStream> {
        let source = self.load(collection).await?;
        let mut foreign = HashMap::new();
        for name in foreign_collections(&pipeline) {
            foreign.insert(name.to_string(), self.load(name).await?);
        }
        let out = evaluate(source, &pipeline, &foreign)?;
        Ok(Box::pin(stream::iter(out.into_iter().map(Ok))))
    }

    async fn create_index_if_absent(
        &self,
        collection: &str,
        index: IndexSpec,
    ) -> StoreResult<()> {
        self.collection_path(collection)?;
        let _guard = self.write_lock.lock().await;
        let mut catalogue = self.read_catalogue().await?;
        let indexes = catalogue.entry(collection.to_string()).or_default();
        if register_index(indexes, collection, index)? {
            let bytes = serde_json::to_vec_pretty(&catalogue)?;
            fs::write(self.dir.join(INDEX_CATALOGUE), bytes).await?;
        }
        Ok(())
    }

    async fn list_collection_names(&self) -> StoreResult<BTreeSet<String>> {
        let mut names: BTreeSet<String> = self.read_catalogue().await?.into_keys().collect();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some(EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.insert(stem.to_string());
                }
            }
        }
        Ok(names)
    }
}
