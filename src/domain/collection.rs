use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{IndexEntry, ItemRef};

/// A collection (novel) as described by the remote source or a caller.
///
/// The declared item count comes from `chapters_count` when present, otherwise
/// from the length of `items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub chapters_count: Option<u32>,
    #[serde(default)]
    pub items: Option<Vec<ItemRef>>,
}

impl Collection {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            cover: None,
            author: None,
            category: None,
            description: None,
            status: None,
            tags: Vec::new(),
            chapters_count: None,
            items: None,
        }
    }

    pub fn declared_count(&self) -> u32 {
        self.chapters_count
            .or_else(|| self.items.as_ref().map(|items| items.len() as u32))
            .unwrap_or(0)
    }
}

/// Persisted metadata for a collection. Always written wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub id: String,
    pub title: String,
    pub cover: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub tags: Vec<String>,
    pub chapters_count: u32,
    pub saved_at: DateTime<Utc>,
}

impl CollectionMeta {
    pub fn from_collection(collection: &Collection, saved_at: DateTime<Utc>) -> Self {
        Self {
            id: collection.id.clone(),
            title: collection.title.clone(),
            cover: collection.cover.clone(),
            author: collection.author.clone(),
            category: collection.category.clone(),
            description: collection.description.clone(),
            status: collection.status.clone(),
            tags: collection.tags.clone(),
            chapters_count: collection.declared_count(),
            saved_at,
        }
    }
}

/// A listing row: metadata plus how many items are stored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    #[serde(flatten)]
    pub meta: CollectionMeta,
    pub downloaded_count: usize,
}

/// Metadata merged with the stored item index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDetails {
    #[serde(flatten)]
    pub meta: CollectionMeta,
    pub items: Vec<IndexEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(number: u32) -> ItemRef {
        ItemRef::new(number, format!("Chapter {}", number))
    }

    #[test]
    fn test_declared_count_prefers_explicit_count() {
        let mut collection = Collection::new("n1", "Novel");
        collection.chapters_count = Some(120);
        collection.items = Some(vec![item(1), item(2)]);
        assert_eq!(collection.declared_count(), 120);
    }

    #[test]
    fn test_declared_count_falls_back_to_item_list() {
        let mut collection = Collection::new("n1", "Novel");
        collection.items = Some(vec![item(1), item(2), item(3)]);
        assert_eq!(collection.declared_count(), 3);
    }

    #[test]
    fn test_declared_count_zero_when_unknown() {
        let collection = Collection::new("n1", "Novel");
        assert_eq!(collection.declared_count(), 0);
    }

    #[test]
    fn test_summary_serializes_flat() {
        let meta = CollectionMeta::from_collection(&Collection::new("n1", "Novel"), Utc::now());
        let summary = CollectionSummary {
            meta,
            downloaded_count: 4,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["id"], "n1");
        assert_eq!(value["downloaded_count"], 4);
    }

    #[test]
    fn test_collection_deserializes_with_missing_optionals() {
        let collection: Collection =
            serde_json::from_str(r#"{"id": "n1", "title": "Novel"}"#).unwrap();
        assert_eq!(collection, Collection::new("n1", "Novel"));
    }
}
