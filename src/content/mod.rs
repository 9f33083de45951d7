//! Local index of downloaded collections and their items.
//!
//! Three kinds of records per collection live in the [`KvStore`]:
//! the metadata, an index of downloaded items sorted by number, and one
//! content blob per item. The index is the source of truth for what is
//! downloaded; a collection whose index empties is dropped entirely unless
//! downloads for it are still queued, in which case its metadata is kept.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::app::{Result, ShelfError};
use crate::domain::{
    Collection, CollectionDetails, CollectionMeta, CollectionSummary, IndexEntry, ItemContent,
};
use crate::store::{get_json, keys, to_json, KvStore};

pub struct ContentStore {
    kv: Arc<dyn KvStore>,
    // Serializes read-modify-write of a single collection's index. Entries
    // live only while some caller holds them.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    // Collections with queued downloads; their metadata survives removals.
    active: Mutex<HashSet<String>>,
}

impl ContentStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            locks: Mutex::new(HashMap::new()),
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Runs `f` while holding the collection's lock, then drops the lock
    /// entry if no other caller is waiting on it.
    fn with_collection_lock<T>(
        &self,
        collection_id: &str,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(collection_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let result = match lock.lock() {
            Ok(_guard) => f(),
            Err(e) => Err(ShelfError::StorageUnavailable(e.to_string())),
        };

        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Held by the map and by us only.
        if Arc::strong_count(&lock) == 2
            && locks
                .get(collection_id)
                .is_some_and(|entry| Arc::ptr_eq(entry, &lock))
        {
            locks.remove(collection_id);
        }

        result
    }

    /// Marks a collection as having queued downloads.
    pub fn mark_active(&self, collection_id: &str) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(collection_id.to_string());
    }

    /// Replaces the set of collections with queued downloads.
    pub fn set_active_collections(&self, collection_ids: HashSet<String>) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = collection_ids;
    }

    fn is_active(&self, collection_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(collection_id)
    }

    /// Deletes the metadata unless downloads for the collection are queued.
    fn drop_meta(&self, collection_id: &str) -> Result<bool> {
        if self.is_active(collection_id) {
            debug!(collection = %collection_id, "Downloads queued, kept metadata");
            return Ok(false);
        }
        self.kv.delete(&keys::meta(collection_id))?;
        Ok(true)
    }

    fn read_index(&self, collection_id: &str) -> Result<Option<Vec<IndexEntry>>> {
        get_json(self.kv.as_ref(), &keys::index(collection_id))
    }

    /// Upserts the collection's metadata, replacing any previous record.
    ///
    /// Any storage failure is reported as [`ShelfError::StorageUnavailable`];
    /// callers treat this save as advisory.
    pub fn save_collection_meta(&self, collection: &Collection) -> Result<CollectionMeta> {
        let meta = CollectionMeta::from_collection(collection, Utc::now());
        to_json(&meta)
            .and_then(|bytes| self.kv.set(&keys::meta(&collection.id), &bytes))
            .map_err(|e| ShelfError::StorageUnavailable(e.to_string()))?;

        debug!(
            collection = %collection.id,
            chapters = meta.chapters_count,
            "Saved collection metadata"
        );
        Ok(meta)
    }

    /// Stores an item's content and records it in the collection's index.
    ///
    /// Content and index are committed in one batch. An existing index entry
    /// with the same number is left as is.
    pub fn save_item(&self, collection_id: &str, item: &ItemContent) -> Result<()> {
        let content_key = keys::content(collection_id, item.number);
        let persist_failed = |e: ShelfError| ShelfError::PersistFailed {
            key: content_key.clone(),
            reason: e.to_string(),
        };

        self.with_collection_lock(collection_id, || {
            let mut index = self
                .read_index(collection_id)
                .map_err(persist_failed)?
                .unwrap_or_default();
            if !index.iter().any(|entry| entry.number == item.number) {
                index.push(IndexEntry::from(item));
                index.sort_by_key(|entry| entry.number);
            }

            let batch = vec![
                (content_key.clone(), to_json(item).map_err(persist_failed)?),
                (
                    keys::index(collection_id),
                    to_json(&index).map_err(persist_failed)?,
                ),
            ];
            self.kv.set_many(&batch).map_err(persist_failed)
        })?;

        debug!(collection = %collection_id, number = item.number, "Saved item");
        Ok(())
    }

    /// Deletes an item's content and index entry. Dropping the last entry
    /// also removes the index and, unless downloads for the collection are
    /// still queued, the collection metadata.
    pub fn remove_item(&self, collection_id: &str, item_number: u32) -> Result<()> {
        self.with_collection_lock(collection_id, || {
            self.kv.delete(&keys::content(collection_id, item_number))?;

            let Some(mut index) = self.read_index(collection_id)? else {
                return Ok(());
            };
            let before = index.len();
            index.retain(|entry| entry.number != item_number);

            if index.is_empty() {
                self.kv.delete(&keys::index(collection_id))?;
                if self.drop_meta(collection_id)? {
                    info!(collection = %collection_id, "Removed last item, dropped collection");
                }
            } else if index.len() != before {
                self.kv.set(&keys::index(collection_id), &to_json(&index)?)?;
            }

            Ok(())
        })
    }

    fn remove_collection(&self, collection_id: &str) -> Result<()> {
        self.with_collection_lock(collection_id, || {
            let index = self.read_index(collection_id)?.unwrap_or_default();
            let content_keys: Vec<String> = index
                .iter()
                .map(|entry| keys::content(collection_id, entry.number))
                .collect();

            self.kv.delete_many(&content_keys)?;
            self.kv.delete(&keys::index(collection_id))?;
            self.drop_meta(collection_id)?;

            info!(
                collection = %collection_id,
                items = content_keys.len(),
                "Removed collection"
            );
            Ok(())
        })
    }

    /// Removes every listed collection with all of its items. Metadata of a
    /// collection with queued downloads is kept.
    ///
    /// Every id is attempted even if an earlier one fails. An id with nothing
    /// stored counts as removed. Succeeds only if every id was fully removed;
    /// otherwise the error names the ids that were not.
    pub fn remove_collections_batch(&self, collection_ids: &[String]) -> Result<()> {
        let mut failed = Vec::new();

        for collection_id in collection_ids {
            if let Err(e) = self.remove_collection(collection_id) {
                warn!(collection = %collection_id, error = %e, "Failed to remove collection");
                failed.push(collection_id.clone());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ShelfError::PersistFailed {
                key: failed.join(","),
                reason: format!(
                    "{} of {} collections not removed",
                    failed.len(),
                    collection_ids.len()
                ),
            })
        }
    }

    /// Collections with at least one downloaded item, ordered by id.
    pub fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let mut summaries = Vec::new();

        for key in self.kv.list_keys(keys::META_PREFIX)? {
            let Some(collection_id) = keys::collection_from_meta(&key) else {
                continue;
            };

            let downloaded_count = self
                .read_index(collection_id)?
                .map(|index| index.len())
                .unwrap_or(0);
            if downloaded_count == 0 {
                continue;
            }

            if let Some(meta) = get_json::<CollectionMeta>(self.kv.as_ref(), &key)? {
                summaries.push(CollectionSummary {
                    meta,
                    downloaded_count,
                });
            }
        }

        Ok(summaries)
    }

    pub fn get_collection_details(&self, collection_id: &str) -> Result<Option<CollectionDetails>> {
        let Some(meta) = get_json::<CollectionMeta>(self.kv.as_ref(), &keys::meta(collection_id))?
        else {
            return Ok(None);
        };
        let items = self.read_index(collection_id)?.unwrap_or_default();

        Ok(Some(CollectionDetails { meta, items }))
    }

    pub fn get_item_content(
        &self,
        collection_id: &str,
        item_number: u32,
    ) -> Result<Option<ItemContent>> {
        get_json(self.kv.as_ref(), &keys::content(collection_id, item_number))
    }

    /// Checks the content key only, independent of the index.
    pub fn is_item_downloaded(&self, collection_id: &str, item_number: u32) -> Result<bool> {
        Ok(self
            .kv
            .get(&keys::content(collection_id, item_number))?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemRef;
    use crate::store::{MemoryKv, SqliteKv};

    fn store() -> ContentStore {
        ContentStore::new(Arc::new(MemoryKv::new()))
    }

    fn chapter(number: u32) -> ItemContent {
        ItemContent::new(
            format!("c-{}", number),
            number,
            format!("Chapter {}", number),
            format!("Text of chapter {}", number),
        )
    }

    /// Fails every write; reads see an empty store.
    struct ReadOnlyKv;

    impl KvStore for ReadOnlyKv {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
        fn set(&self, key: &str, _value: &[u8]) -> Result<()> {
            Err(ShelfError::Other(format!("read-only: {}", key)))
        }
        fn set_many(&self, _entries: &[(String, Vec<u8>)]) -> Result<()> {
            Err(ShelfError::Other("read-only".into()))
        }
        fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }
        fn delete_many(&self, _keys: &[String]) -> Result<()> {
            Ok(())
        }
        fn list_keys(&self, _prefix: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    /// Delegates to a [`MemoryKv`] but fails bulk deletes touching one
    /// collection's content.
    struct FailingDeleteKv {
        inner: MemoryKv,
        failing: String,
    }

    impl KvStore for FailingDeleteKv {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &[u8]) -> Result<()> {
            self.inner.set(key, value)
        }
        fn set_many(&self, entries: &[(String, Vec<u8>)]) -> Result<()> {
            self.inner.set_many(entries)
        }
        fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key)
        }
        fn delete_many(&self, batch: &[String]) -> Result<()> {
            let poisoned = keys::content(&self.failing, 1);
            if batch.iter().any(|key| *key == poisoned) {
                return Err(ShelfError::Other("disk error".into()));
            }
            self.inner.delete_many(batch)
        }
        fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.list_keys(prefix)
        }
    }

    fn lock_entries(store: &ContentStore) -> usize {
        store.locks.lock().unwrap().len()
    }

    #[test]
    fn test_save_meta_counts_from_item_list() {
        let store = store();
        let mut novel = Collection::new("n1", "Novel");
        novel.items = Some(vec![ItemRef::new(1, "One"), ItemRef::new(2, "Two")]);

        let meta = store.save_collection_meta(&novel).unwrap();
        assert_eq!(meta.chapters_count, 2);
    }

    #[test]
    fn test_saved_meta_without_items_is_not_listed() {
        let store = store();
        store
            .save_collection_meta(&Collection::new("n1", "Novel"))
            .unwrap();

        assert!(store.list_collections().unwrap().is_empty());
        assert!(store.get_collection_details("n1").unwrap().is_some());
    }

    #[test]
    fn test_save_meta_failure_is_storage_unavailable() {
        let store = ContentStore::new(Arc::new(ReadOnlyKv));
        let err = store
            .save_collection_meta(&Collection::new("n1", "Novel"))
            .unwrap_err();
        assert!(matches!(err, ShelfError::StorageUnavailable(_)));
    }

    #[test]
    fn test_save_item_failure_is_persist_failed() {
        let store = ContentStore::new(Arc::new(ReadOnlyKv));
        let err = store.save_item("n1", &chapter(1)).unwrap_err();
        assert!(matches!(err, ShelfError::PersistFailed { .. }));
    }

    #[test]
    fn test_round_trip_and_remove() {
        let store = store();
        let item = chapter(3);

        store.save_item("n1", &item).unwrap();
        assert_eq!(store.get_item_content("n1", 3).unwrap(), Some(item));
        assert!(store.is_item_downloaded("n1", 3).unwrap());

        store.remove_item("n1", 3).unwrap();
        assert_eq!(store.get_item_content("n1", 3).unwrap(), None);
        assert!(!store.is_item_downloaded("n1", 3).unwrap());
    }

    #[test]
    fn test_index_is_sorted_and_deduplicated() {
        let store = store();
        store
            .save_collection_meta(&Collection::new("n1", "Novel"))
            .unwrap();
        for number in [5, 2, 9, 2] {
            store.save_item("n1", &chapter(number)).unwrap();
        }

        let details = store.get_collection_details("n1").unwrap().unwrap();
        let numbers: Vec<u32> = details.items.iter().map(|e| e.number).collect();
        assert_eq!(numbers, vec![2, 5, 9]);
    }

    #[test]
    fn test_cascading_delete() {
        let store = store();
        store
            .save_collection_meta(&Collection::new("x", "X"))
            .unwrap();
        store.save_item("x", &chapter(1)).unwrap();
        store.save_item("x", &chapter(2)).unwrap();
        assert_eq!(store.list_collections().unwrap().len(), 1);

        store.remove_item("x", 1).unwrap();
        let listed = store.list_collections().unwrap();
        assert_eq!(listed[0].downloaded_count, 1);

        store.remove_item("x", 2).unwrap();
        assert!(store.list_collections().unwrap().is_empty());
        assert!(store.get_collection_details("x").unwrap().is_none());
    }

    #[test]
    fn test_remove_unknown_item_is_noop() {
        let store = store();
        store
            .save_collection_meta(&Collection::new("n1", "Novel"))
            .unwrap();

        store.remove_item("n1", 7).unwrap();
        store.remove_item("missing", 1).unwrap();
        assert!(store.get_collection_details("n1").unwrap().is_some());
    }

    #[test]
    fn test_batch_remove_with_missing_collection() {
        let store = store();
        store
            .save_collection_meta(&Collection::new("x", "X"))
            .unwrap();
        store.save_item("x", &chapter(1)).unwrap();
        store.save_item("x", &chapter(2)).unwrap();

        store
            .remove_collections_batch(&["x".to_string(), "y".to_string()])
            .unwrap();

        assert!(store.get_collection_details("x").unwrap().is_none());
        assert!(!store.is_item_downloaded("x", 1).unwrap());
        assert!(!store.is_item_downloaded("x", 2).unwrap());
        assert!(store.list_collections().unwrap().is_empty());
    }

    #[test]
    fn test_batch_remove_leaves_other_collections() {
        let store = store();
        for id in ["a", "b", "c"] {
            store.save_collection_meta(&Collection::new(id, id)).unwrap();
            store.save_item(id, &chapter(1)).unwrap();
        }

        store
            .remove_collections_batch(&["a".to_string(), "c".to_string()])
            .unwrap();

        let ids: Vec<String> = store
            .list_collections()
            .unwrap()
            .into_iter()
            .map(|s| s.meta.id)
            .collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_list_skips_meta_with_empty_index() {
        let kv = Arc::new(MemoryKv::new());
        let store = ContentStore::new(kv.clone());
        store
            .save_collection_meta(&Collection::new("n1", "Novel"))
            .unwrap();
        kv.set(&keys::index("n1"), b"[]").unwrap();

        assert!(store.list_collections().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_saves_to_one_collection() {
        let store = ContentStore::new(Arc::new(SqliteKv::in_memory().unwrap()));
        store
            .save_collection_meta(&Collection::new("n1", "Novel"))
            .unwrap();

        std::thread::scope(|scope| {
            for number in 1..=16 {
                let store = &store;
                scope.spawn(move || store.save_item("n1", &chapter(number)).unwrap());
            }
        });

        let details = store.get_collection_details("n1").unwrap().unwrap();
        let numbers: Vec<u32> = details.items.iter().map(|e| e.number).collect();
        assert_eq!(numbers, (1..=16).collect::<Vec<_>>());
    }

    #[test]
    fn test_active_collection_keeps_meta_when_emptied() {
        let store = store();
        store
            .save_collection_meta(&Collection::new("x", "X"))
            .unwrap();
        store.save_item("x", &chapter(1)).unwrap();
        store.mark_active("x");

        store.remove_item("x", 1).unwrap();
        let details = store.get_collection_details("x").unwrap().unwrap();
        assert!(details.items.is_empty());
        assert!(store.list_collections().unwrap().is_empty());

        store.save_item("x", &chapter(2)).unwrap();
        store.set_active_collections(HashSet::new());
        assert_eq!(store.list_collections().unwrap()[0].meta.title, "X");

        store.remove_item("x", 2).unwrap();
        assert!(store.get_collection_details("x").unwrap().is_none());
    }

    #[test]
    fn test_batch_remove_keeps_meta_of_active_collection() {
        let store = store();
        store
            .save_collection_meta(&Collection::new("x", "X"))
            .unwrap();
        store.save_item("x", &chapter(1)).unwrap();
        store.set_active_collections(HashSet::from(["x".to_string()]));

        store.remove_collections_batch(&["x".to_string()]).unwrap();

        assert!(!store.is_item_downloaded("x", 1).unwrap());
        let details = store.get_collection_details("x").unwrap().unwrap();
        assert!(details.items.is_empty());
    }

    #[test]
    fn test_batch_remove_reports_only_failed_ids() {
        let store = ContentStore::new(Arc::new(FailingDeleteKv {
            inner: MemoryKv::new(),
            failing: "b".into(),
        }));
        for id in ["a", "b", "c"] {
            store.save_collection_meta(&Collection::new(id, id)).unwrap();
            store.save_item(id, &chapter(1)).unwrap();
        }

        let err = store
            .remove_collections_batch(&["a".to_string(), "b".to_string(), "c".to_string()])
            .unwrap_err();

        match err {
            ShelfError::PersistFailed { key, .. } => assert_eq!(key, "b"),
            other => panic!("unexpected error: {}", other),
        }
        assert!(store.get_collection_details("a").unwrap().is_none());
        assert!(store.get_collection_details("c").unwrap().is_none());
        assert!(!store.is_item_downloaded("c", 1).unwrap());
        assert!(store.is_item_downloaded("b", 1).unwrap());
    }

    #[test]
    fn test_lock_entries_are_released() {
        let store = store();
        store.save_item("n1", &chapter(1)).unwrap();
        store.remove_item("missing", 4).unwrap();
        store
            .remove_collections_batch(&["n1".to_string(), "nope".to_string()])
            .unwrap();

        assert_eq!(lock_entries(&store), 0);
    }

    #[test]
    fn test_lock_entries_released_after_concurrent_saves() {
        let store = store();

        std::thread::scope(|scope| {
            for number in 1..=8 {
                let store = &store;
                scope.spawn(move || store.save_item("n1", &chapter(number)).unwrap());
            }
        });

        assert_eq!(lock_entries(&store), 0);
        let details_count = store.read_index("n1").unwrap().unwrap().len();
        assert_eq!(details_count, 8);
    }
}
