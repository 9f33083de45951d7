//! Key layout. Each namespace has its own prefix, so a key from one
//! namespace can never equal a key from another.

pub const QUEUE_SNAPSHOT: &str = "queue:snapshot";

pub const META_PREFIX: &str = "meta:";
const INDEX_PREFIX: &str = "index:";
const CONTENT_PREFIX: &str = "content:";

pub fn meta(collection_id: &str) -> String {
    format!("{}{}", META_PREFIX, collection_id)
}

pub fn index(collection_id: &str) -> String {
    format!("{}{}", INDEX_PREFIX, collection_id)
}

pub fn content(collection_id: &str, item_number: u32) -> String {
    format!("{}{}:{}", CONTENT_PREFIX, collection_id, item_number)
}

/// Recovers the collection id from a metadata key.
pub fn collection_from_meta(key: &str) -> Option<&str> {
    key.strip_prefix(META_PREFIX)
}
