pub mod result_cache;
pub mod store;

pub use result_cache::{BulkWriter, ResultCache};
pub use store::{open_store, KvStore, MemoryStore, SledStore};
