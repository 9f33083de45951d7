use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to a remote item (chapter), as listed by its collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub id: Option<String>,
}

impl ItemRef {
    pub fn new(number: u32, title: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            id: None,
        }
    }
}

/// One row of a collection's index of downloaded items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub number: u32,
    pub title: String,
    pub id: String,
}

impl From<&ItemContent> for IndexEntry {
    fn from(item: &ItemContent) -> Self {
        Self {
            number: item.number,
            title: item.title.clone(),
            id: item.id.clone(),
        }
    }
}

/// Full downloaded payload for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemContent {
    pub id: String,
    pub number: u32,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ItemContent {
    pub fn new(
        id: impl Into<String>,
        number: u32,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            number,
            title: title.into(),
            content: content.into(),
            updated_at: None,
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(Untitled)"
        } else {
            &self.title
        }
    }
}
