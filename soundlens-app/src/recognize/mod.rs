//! Recognition provider integration
//!
//! The provider accepts a raw audio sample over a signed multipart POST and
//! answers with candidate track metadata or a "no result" status. The
//! `Recognizer` trait is the seam the capture pipeline dispatches through.

pub mod client;
pub mod types;

use async_trait::async_trait;
use soundlens_common::RecognitionOutcome;

pub use client::AcrCloudClient;

/// Seam between the capture pipeline and the recognition provider
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Identify a track from a raw audio sample
    ///
    /// The sample must be non-empty (an error, not an outcome, since an
    /// empty dispatch is a pipeline bug). Transport and parse failures are
    /// reported as `RecognitionOutcome::Failed`; the client never retries
    /// internally — the caller's next checkpoint is the retry.
    async fn identify(&self, sample: &[u8]) -> crate::error::Result<RecognitionOutcome>;
}
