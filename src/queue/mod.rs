//! Persistent download queue.
//!
//! Items move `pending -> downloading -> (removed)`. At most `concurrency`
//! items are downloading at once; pending items are claimed in queue order.
//! Every mutation is persisted under [`keys::QUEUE_SNAPSHOT`], published on a
//! watch channel, and delivered to subscribers. On load, items persisted as
//! `downloading` are reset to `pending`.
//!
//! Workers run as spawned Tokio tasks, so [`DownloadQueue::add`],
//! [`DownloadQueue::initialize`] and [`DownloadQueue::remove`] must be called
//! from within a Tokio runtime.

mod subscribers;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::app::{Result, ShelfError};
use crate::content::ContentStore;
use crate::domain::{Collection, ItemRef, QueueItem, QueueStatus};
use crate::fetcher::Fetcher;
use crate::store::{get_json, keys, to_json, KvStore};

pub use subscribers::{Listener, Subscription};
use subscribers::Subscribers;

#[derive(Default)]
struct QueueState {
    items: Vec<QueueItem>,
    active: usize,
    loaded: bool,
}

struct QueueInner {
    kv: Arc<dyn KvStore>,
    content: Arc<ContentStore>,
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
    state: Mutex<QueueState>,
    subscribers: Arc<Subscribers>,
    snapshots: watch::Sender<Vec<QueueItem>>,
}

/// Cheap to clone; all clones drive the same queue.
#[derive(Clone)]
pub struct DownloadQueue {
    inner: Arc<QueueInner>,
}

impl DownloadQueue {
    pub fn new(
        kv: Arc<dyn KvStore>,
        content: Arc<ContentStore>,
        fetcher: Arc<dyn Fetcher>,
        concurrency: usize,
    ) -> Self {
        let (snapshots, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(QueueInner {
                kv,
                content,
                fetcher,
                concurrency: concurrency.max(1),
                state: Mutex::new(QueueState::default()),
                subscribers: Arc::new(Subscribers::default()),
                snapshots,
            }),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Merges the persisted snapshot into memory once. Persisted items keep
    /// their position ahead of anything added before the load.
    fn ensure_loaded(&self, state: &mut QueueState) -> Result<bool> {
        if state.loaded {
            return Ok(false);
        }

        let persisted: Vec<QueueItem> =
            get_json(self.inner.kv.as_ref(), keys::QUEUE_SNAPSHOT)?.unwrap_or_default();

        let mut reset = 0;
        let mut merged = Vec::with_capacity(persisted.len() + state.items.len());
        for mut item in persisted {
            if state.items.iter().any(|existing| existing.id == item.id)
                || merged.iter().any(|existing: &QueueItem| existing.id == item.id)
            {
                continue;
            }
            if item.is_downloading() {
                item.status = QueueStatus::Pending;
                reset += 1;
            }
            merged.push(item);
        }
        let restored = merged.len();
        merged.append(&mut state.items);
        state.items = merged;
        state.loaded = true;
        self.sync_active(state);

        if restored > 0 {
            info!(restored, reset, "Restored download queue");
        }
        Ok(restored > 0)
    }

    /// Tells the content store which collections still have queued items.
    fn sync_active(&self, state: &QueueState) {
        let active: HashSet<String> = state
            .items
            .iter()
            .map(|item| item.collection_id.clone())
            .collect();
        self.inner.content.set_active_collections(active);
    }

    /// Persists and publishes the current items. Runs under the state lock so
    /// the stored snapshot and the watch channel follow mutation order.
    fn publish_locked(&self, state: &QueueState) -> Vec<QueueItem> {
        self.sync_active(state);
        let snapshot = state.items.clone();

        let persisted = to_json(&snapshot)
            .and_then(|bytes| self.inner.kv.set(keys::QUEUE_SNAPSHOT, &bytes));
        if let Err(e) = persisted {
            warn!(error = %e, "Failed to persist download queue");
        }

        self.inner.snapshots.send_replace(snapshot.clone());
        snapshot
    }

    /// Loads the persisted queue without starting any download. Items left
    /// `downloading` are reset to `pending`. A no-op after a successful load.
    pub fn load(&self) -> Result<()> {
        let snapshot = {
            let mut state = self.state();
            if self.ensure_loaded(&mut state)? {
                Some(self.publish_locked(&state))
            } else {
                None
            }
        };

        if let Some(snapshot) = snapshot {
            self.inner.subscribers.notify(&snapshot);
        }
        Ok(())
    }

    /// Loads the persisted queue and starts processing it.
    ///
    /// Calling it again after a successful load only re-runs processing.
    pub fn initialize(&self) -> Result<()> {
        self.load()?;
        self.process_queue();
        Ok(())
    }

    /// State with the persisted queue merged in. A failed load is logged and
    /// retried on the next call.
    fn loaded_state(&self) -> MutexGuard<'_, QueueState> {
        if let Err(e) = self.load() {
            warn!(error = %e, "Failed to load persisted download queue");
        }
        self.state()
    }

    /// Queues items of a collection for download and returns how many were
    /// newly queued. Items already queued under the same collection and
    /// number are skipped.
    ///
    /// The collection's metadata is saved first so it is listed before any
    /// item finishes; a failure there is logged and otherwise ignored.
    pub fn add(&self, collection: &Collection, items: &[ItemRef]) -> usize {
        let (added, snapshot) = {
            let mut state = self.state();
            if let Err(e) = self.ensure_loaded(&mut state) {
                warn!(error = %e, "Failed to load persisted download queue");
            }

            // Marked under the state lock so no concurrent publish clears it
            // before the new items are in.
            self.inner.content.mark_active(&collection.id);
            if let Err(e) = self.inner.content.save_collection_meta(collection) {
                warn!(collection = %collection.id, error = %e, "Failed to save collection metadata");
            }

            let mut added = 0;
            for item in items {
                let queued =
                    QueueItem::new(&collection.id, &collection.title, item.number, &item.title);
                if state.items.iter().any(|existing| existing.id == queued.id) {
                    debug!(item = %queued.id, "Already queued");
                    continue;
                }
                state.items.push(queued);
                added += 1;
            }

            if added == 0 {
                self.sync_active(&state);
                return 0;
            }
            debug!(collection = %collection.id, added, "Queued items");
            (added, self.publish_locked(&state))
        };

        self.inner.subscribers.notify(&snapshot);
        self.process_queue();
        added
    }

    /// Removes a pending item. Downloading items cannot be cancelled and are
    /// left to finish; returns whether an item was removed.
    pub fn remove(&self, item_id: &str) -> bool {
        let snapshot = {
            let mut state = self.state();
            if let Err(e) = self.ensure_loaded(&mut state) {
                warn!(error = %e, "Failed to load persisted download queue");
            }

            let Some(position) = state
                .items
                .iter()
                .position(|item| item.id == item_id && !item.is_downloading())
            else {
                return false;
            };
            state.items.remove(position);
            self.publish_locked(&state)
        };

        self.inner.subscribers.notify(&snapshot);
        self.process_queue();
        true
    }

    pub fn get_status(&self, collection_id: &str, item_number: u32) -> Option<QueueStatus> {
        let id = QueueItem::composite_id(collection_id, item_number);
        self.loaded_state()
            .items
            .iter()
            .find(|item| item.id == id)
            .map(|item| item.status)
    }

    pub fn is_collection_active(&self, collection_id: &str) -> bool {
        self.loaded_state()
            .items
            .iter()
            .any(|item| item.collection_id == collection_id)
    }

    pub fn count_for_collection(&self, collection_id: &str) -> usize {
        self.loaded_state()
            .items
            .iter()
            .filter(|item| item.collection_id == collection_id)
            .count()
    }

    pub fn snapshot(&self) -> Vec<QueueItem> {
        self.loaded_state().items.clone()
    }

    /// Registers a listener called with the full queue after every mutation,
    /// on the thread that performed it.
    ///
    /// Listeners run after the queue lock is released, so when workers finish
    /// on different threads a listener may see a newer snapshot before an
    /// older one. Use [`DownloadQueue::watch`] for the latest state.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[QueueItem]) + Send + Sync + 'static,
    {
        let id = self.inner.subscribers.add(Arc::new(listener));
        Subscription::new(id, &self.inner.subscribers)
    }

    /// Receiver of queue snapshots, updated on every mutation.
    pub fn watch(&self) -> watch::Receiver<Vec<QueueItem>> {
        self.inner.snapshots.subscribe()
    }

    /// Resolves once the queue holds no items.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.watch();
        let _ = rx.wait_for(|items| items.is_empty()).await;
    }

    /// Starts downloads for pending items while slots are free.
    fn process_queue(&self) {
        while let Some((item, snapshot)) = self.claim_next() {
            self.inner.subscribers.notify(&snapshot);
            self.spawn_download(item);
        }
    }

    fn claim_next(&self) -> Option<(QueueItem, Vec<QueueItem>)> {
        let mut state = self.state();
        if state.active >= self.inner.concurrency {
            return None;
        }

        let item = state
            .items
            .iter_mut()
            .find(|item| item.status == QueueStatus::Pending)?;
        item.status = QueueStatus::Downloading;
        let item = item.clone();
        state.active += 1;

        debug!(item = %item.id, active = state.active, "Starting download");
        Some((item, self.publish_locked(&state)))
    }

    fn spawn_download(&self, item: QueueItem) {
        let queue = self.clone();
        tokio::spawn(async move {
            let worker = queue.clone();
            let job = item.clone();
            let outcome = tokio::spawn(async move { worker.download(&job).await }).await;

            match outcome {
                Ok(Ok(true)) => info!(item = %item.id, title = %item.item_title, "Downloaded"),
                Ok(Ok(false)) => debug!(item = %item.id, "Already stored, skipped fetch"),
                Ok(Err(e)) => warn!(item = %item.id, error = %e, "Download failed"),
                Err(e) => error!(item = %item.id, "Download task join error: {}", e),
            }

            queue.finish(&item.id);
            queue.process_queue();
        });
    }

    /// Fetches and stores one item. Returns `false` when the content was
    /// already stored and no fetch was made.
    async fn download(&self, item: &QueueItem) -> Result<bool> {
        let content = &self.inner.content;
        if content.is_item_downloaded(&item.collection_id, item.item_number)? {
            return Ok(false);
        }

        let fetched = self
            .inner
            .fetcher
            .fetch_item_content(&item.collection_id, item.item_number)
            .await?;
        if fetched.number != item.item_number {
            return Err(ShelfError::FetchFailed {
                collection_id: item.collection_id.clone(),
                item_number: item.item_number,
                reason: format!("payload is for item {}", fetched.number),
            });
        }

        content.save_item(&item.collection_id, &fetched)?;
        Ok(true)
    }

    /// Drops a finished item, whatever the outcome, and frees its slot.
    fn finish(&self, item_id: &str) {
        let snapshot = {
            let mut state = self.state();
            state.active = state.active.saturating_sub(1);
            state
                .items
                .retain(|item| !(item.id == item_id && item.is_downloading()));
            self.publish_locked(&state)
        };

        self.inner.subscribers.notify(&snapshot);
    }
}
