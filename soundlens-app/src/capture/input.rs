//! Audio input using cpal
//!
//! The microphone stream lives on a dedicated thread (cpal streams are not
//! Send); captured sample batches flow to the async side over a channel.
//! The device, the stream and the thread are released together when the
//! session's cancellation token fires, on every exit path.

use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Source of captured audio sample batches
///
/// `open` acquires the input device and starts delivering mono f32 sample
/// batches on `tx` until `cancel` fires. Acquisition failure is reported to
/// the caller as `DeviceUnavailable`, never silently swallowed.
pub trait AudioInput: Send + Sync {
    fn open(
        &self,
        sample_rate: u32,
        tx: mpsc::UnboundedSender<Vec<f32>>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// Microphone input via the default cpal host
pub struct CpalInput;

impl CpalInput {
    pub fn new() -> Self {
        Self
    }

    /// List available audio input devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .input_devices()
            .map_err(|e| Error::DeviceUnavailable(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();
        debug!("Found {} input devices", devices.len());
        Ok(devices)
    }
}

impl Default for CpalInput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioInput for CpalInput {
    fn open(
        &self,
        sample_rate: u32,
        tx: mpsc::UnboundedSender<Vec<f32>>,
        cancel: CancellationToken,
    ) -> Result<()> {
        // The stream thread reports acquisition success/failure back through
        // this channel so open() can fail synchronously.
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        std::thread::Builder::new()
            .name("soundlens-capture".to_string())
            .spawn(move || {
                let stream = match build_input_stream(sample_rate, tx) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    warn!("Input stream failed to start: {}", e);
                }

                // Hold the stream alive until the session is cancelled;
                // dropping it releases the device.
                while !cancel.is_cancelled() {
                    std::thread::park_timeout(Duration::from_millis(50));
                }
                drop(stream);
                debug!("Capture thread released input device");
            })
            .map_err(|e| Error::Internal(format!("Failed to spawn capture thread: {}", e)))?;

        ready_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| Error::DeviceUnavailable("Device acquisition timed out".to_string()))?
    }
}

/// Build the cpal input stream, downmixing to mono f32
fn build_input_stream(
    sample_rate: u32,
    tx: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::DeviceUnavailable("No input device available".to_string()))?;

    let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
    debug!("Opening input device: {}", name);

    let channels = device
        .default_input_config()
        .map_err(|e| Error::DeviceUnavailable(format!("No input config: {}", e)))?
        .channels();

    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _| {
                let mono: Vec<f32> = if channels > 1 {
                    data.chunks(channels as usize)
                        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                        .collect()
                } else {
                    data.to_vec()
                };
                // Receiver gone means the session ended; nothing to do
                let _ = tx.send(mono);
            },
            move |err| {
                warn!("Input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| Error::DeviceUnavailable(format!("Failed to open input stream: {}", e)))?;

    Ok(stream)
}

/// Convert accumulated f32 samples to 16-bit little-endian PCM bytes for
/// the recognition provider
pub fn to_pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}
