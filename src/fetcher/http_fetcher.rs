use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::app::{Result, ShelfError};
use crate::config::RemoteConfig;
use crate::domain::{Collection, ItemContent};
use crate::fetcher::Fetcher;

/// JSON over HTTP:
/// `GET {base}/collections/{id}` and `GET {base}/collections/{id}/items/{number}`.
pub struct HttpFetcher {
    client: Client,
    base_url: Url,
}

impl HttpFetcher {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(&config.base_url)?,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ShelfError::Config(format!("Unusable base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_collection(&self, collection_id: &str) -> Result<Collection> {
        let url = self.endpoint(&["collections", collection_id])?;
        let response = self.client.get(url).send().await?;
        response.error_for_status_ref()?;

        let collection: Collection = response.json().await?;
        Ok(collection)
    }

    async fn fetch_item_content(
        &self,
        collection_id: &str,
        item_number: u32,
    ) -> Result<ItemContent> {
        let number = item_number.to_string();
        let url = self.endpoint(&["collections", collection_id, "items", &number])?;
        let response = self.client.get(url).send().await?;
        response.error_for_status_ref()?;

        let item: ItemContent = response.json().await?;
        if item.number != item_number {
            return Err(ShelfError::FetchFailed {
                collection_id: collection_id.to_string(),
                item_number,
                reason: format!("payload is for item {}", item.number),
            });
        }

        Ok(item)
    }
}
