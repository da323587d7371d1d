//! Database layer: SQLite initialization and the key-value cache table

pub mod init;
pub mod kv;

pub use init::init_database;
