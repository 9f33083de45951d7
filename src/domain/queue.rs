use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Downloading,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Downloading => "downloading",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A pending or active download. Terminal items leave the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub collection_id: String,
    pub item_number: u32,
    pub item_title: String,
    pub collection_title: String,
    pub status: QueueStatus,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(
        collection_id: &str,
        collection_title: &str,
        item_number: u32,
        item_title: &str,
    ) -> Self {
        Self {
            id: Self::composite_id(collection_id, item_number),
            collection_id: collection_id.to_string(),
            item_number,
            item_title: item_title.to_string(),
            collection_title: collection_title.to_string(),
            status: QueueStatus::Pending,
            enqueued_at: Utc::now(),
        }
    }

    /// Queue identity of an item. The number is always the last segment, so
    /// collection ids containing `:` cannot produce collisions.
    pub fn composite_id(collection_id: &str, item_number: u32) -> String {
        format!("{}:{}", collection_id, item_number)
    }

    pub fn is_downloading(&self) -> bool {
        self.status == QueueStatus::Downloading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_is_pending() {
        let item = QueueItem::new("n1", "Novel", 3, "Three");
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.id, "n1:3");
    }

    #[test]
    fn test_composite_id_distinguishes_ambiguous_concatenations() {
        assert_ne!(
            QueueItem::composite_id("a1", 2),
            QueueItem::composite_id("a", 12)
        );
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&QueueStatus::Downloading).unwrap();
        assert_eq!(json, "\"downloading\"");
        assert_eq!(QueueStatus::Pending.to_string(), "pending");
    }
}
