pub mod entry;
pub mod purpose;
pub mod store;

pub use entry::{CacheEntry, EntryHeader};
pub use purpose::{CachePurpose, EvictionPolicy};
pub use store::CacheStore;
