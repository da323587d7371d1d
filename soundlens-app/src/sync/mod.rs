//! Local-first synchronization with the remote history log

pub mod engine;
pub mod remote;

pub use engine::SyncEngine;
pub use remote::{HttpRemoteHistory, RemoteHistory, RemotePage};
