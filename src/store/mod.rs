pub mod keys;
pub mod memory;
pub mod sqlite;

use crate::app::Result;

pub use memory::MemoryKv;
pub use sqlite::SqliteKv;

/// Durable key-value storage shared by the content store and the queue.
///
/// Implementations must give read-your-writes consistency within a process.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    /// Writes every pair or none of them.
    fn set_many(&self, entries: &[(String, Vec<u8>)]) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn delete_many(&self, keys: &[String]) -> Result<()>;
    /// Keys starting with `prefix`, in ascending order.
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

pub(crate) fn get_json<T: serde::de::DeserializeOwned>(
    kv: &dyn KvStore,
    key: &str,
) -> Result<Option<T>> {
    match kv.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}
