//! History log: authoritative in-memory store plus the durable local cache

pub mod local_cache;
pub mod store;

pub use local_cache::LocalCache;
pub use store::HistoryStore;
