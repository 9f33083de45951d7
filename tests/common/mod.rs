#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use shelf::app::{AppContext, Result, ShelfError};
use shelf::domain::{Collection, ItemContent, ItemRef};
use shelf::fetcher::Fetcher;
use shelf::store::KvStore;

/// In-process remote source. Every collection has `chapters` items.
pub struct FakeFetcher {
    pub chapters: u32,
    pub delay: Duration,
    pub failing: HashSet<u32>,
    pub stalled: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(chapters: u32) -> Self {
        Self {
            chapters,
            delay: Duration::ZERO,
            failing: HashSet::new(),
            stalled: false,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch_collection(&self, collection_id: &str) -> Result<Collection> {
        let mut collection = Collection::new(collection_id, format!("Novel {}", collection_id));
        collection.author = Some("Anon".into());
        collection.items = Some(item_refs(1..=self.chapters));
        Ok(collection)
    }

    async fn fetch_item_content(
        &self,
        collection_id: &str,
        item_number: u32,
    ) -> Result<ItemContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.stalled {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&item_number) {
            return Err(ShelfError::FetchFailed {
                collection_id: collection_id.to_string(),
                item_number,
                reason: "404".into(),
            });
        }
        Ok(chapter(item_number))
    }
}

pub fn chapter(number: u32) -> ItemContent {
    ItemContent::new(
        format!("c-{}", number),
        number,
        format!("Chapter {}", number),
        format!("Text of chapter {}", number),
    )
}

pub fn item_refs(numbers: impl IntoIterator<Item = u32>) -> Vec<ItemRef> {
    numbers
        .into_iter()
        .map(|n| ItemRef::new(n, format!("Chapter {}", n)))
        .collect()
}

pub fn context(kv: Arc<dyn KvStore>, fetcher: Arc<FakeFetcher>, concurrency: usize) -> AppContext {
    AppContext::with_parts(kv, fetcher, concurrency)
}

pub async fn idle(ctx: &AppContext) {
    tokio::time::timeout(Duration::from_secs(10), ctx.queue.wait_until_idle())
        .await
        .expect("queue did not drain");
}
