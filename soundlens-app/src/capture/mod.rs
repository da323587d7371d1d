//! Progressive audio capture and dispatch pipeline
//!
//! A capture session accumulates microphone samples continuously. At fixed
//! time slices the scheduler decides whether to dispatch the accumulated
//! buffer for recognition; at most one recognition request is in flight at
//! any time, and the first match wins.

pub mod amplitude;
pub mod input;
pub mod scheduler;
pub mod session;

pub use amplitude::AmplitudeMonitor;
pub use input::{AudioInput, CpalInput};
pub use scheduler::{ChunkScheduler, CheckpointPolicy, SliceDecision};
pub use session::CaptureEngine;
