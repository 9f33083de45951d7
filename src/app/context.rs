use std::path::PathBuf;
use std::sync::Arc;

use crate::app::error::{Result, ShelfError};
use crate::config::Config;
use crate::content::ContentStore;
use crate::domain::CollectionMeta;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::queue::DownloadQueue;
use crate::store::{KvStore, SqliteKv};

pub struct AppContext {
    pub kv: Arc<dyn KvStore>,
    pub content: Arc<ContentStore>,
    pub fetcher: Arc<dyn Fetcher>,
    pub queue: DownloadQueue,
}

impl AppContext {
    pub fn new(config: &Config) -> Result<Self> {
        let db_path = match &config.storage.db_path {
            Some(p) => p.clone(),
            None => Self::default_db_path()?,
        };
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::new(&db_path)?);
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.remote)?);
        Ok(Self::with_parts(kv, fetcher, config.concurrency()))
    }

    pub fn in_memory(config: &Config) -> Result<Self> {
        let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::in_memory()?);
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.remote)?);
        Ok(Self::with_parts(kv, fetcher, config.concurrency()))
    }

    pub fn with_parts(kv: Arc<dyn KvStore>, fetcher: Arc<dyn Fetcher>, concurrency: usize) -> Self {
        let content = Arc::new(ContentStore::new(kv.clone()));
        let queue = DownloadQueue::new(kv.clone(), content.clone(), fetcher.clone(), concurrency);

        Self {
            kv,
            content,
            fetcher,
            queue,
        }
    }

    /// Fetches a collection's metadata without queueing anything and saves it.
    pub async fn refresh_collection(&self, collection_id: &str) -> Result<CollectionMeta> {
        let collection = self.fetcher.fetch_collection(collection_id).await?;
        self.content.save_collection_meta(&collection)
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| ShelfError::Config("Could not find data directory".into()))?;
        Ok(data_dir.join("shelf").join("shelf.db"))
    }
}
