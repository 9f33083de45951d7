pub mod http_fetcher;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::{Collection, ItemContent};

pub use http_fetcher::HttpFetcher;

/// Remote source of collections and their items.
///
/// Calls for different items may run concurrently. Timeouts and retries are
/// the implementation's business; any error is terminal for that call.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Metadata plus the remote item list.
    async fn fetch_collection(&self, collection_id: &str) -> Result<Collection>;

    async fn fetch_item_content(&self, collection_id: &str, item_number: u32)
        -> Result<ItemContent>;
}
