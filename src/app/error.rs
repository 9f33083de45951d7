use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShelfError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Failed to persist {key}: {reason}")]
    PersistFailed { key: String, reason: String },

    #[error("Fetch failed for {collection_id} #{item_number}: {reason}")]
    FetchFailed {
        collection_id: String,
        item_number: u32,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ShelfError>;
