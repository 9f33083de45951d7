pub mod collection;
pub mod item;
pub mod queue;

pub use collection::{Collection, CollectionDetails, CollectionMeta, CollectionSummary};
pub use item::{IndexEntry, ItemContent, ItemRef};
pub use queue::{QueueItem, QueueStatus};
