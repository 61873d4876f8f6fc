//! Audio capture from microphone
//!
//! A [`Microphone`] hands out exclusive [`CaptureStream`]s. Each stream is
//! consumed either as a level meter (for visualization) or as a recording
//! that is finalized into an [`AudioBlob`]. Releasing is idempotent and also
//! happens on drop, so the device is let go exactly once per acquisition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio_stream::Stream as LevelStream;

use super::levels::{ANALYSIS_WINDOW, level_stream};
use super::{AudioInput, Recording};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Container type of recorded audio
pub const RECORDING_MIME_TYPE: &str = "audio/wav";

/// A finished, immutable recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

impl AudioBlob {
    #[must_use]
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            file_name: file_name.into(),
        }
    }

    /// Encode mono samples as a WAV blob
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Result<Self> {
        Ok(Self::new(
            samples_to_wav(samples, sample_rate)?,
            RECORDING_MIME_TYPE,
            "audio.wav",
        ))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// How an acquired stream is going to be consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Keep every sample until release, then build a blob
    Recording,
    /// Keep only the newest analysis window for level metering
    Metering,
}

/// Default input device
pub struct Microphone {
    sample_rate: u32,
}

impl Default for Microphone {
    fn default() -> Self {
        Self::new()
    }
}

impl Microphone {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
        }
    }

    /// Open the default input device and start streaming
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` if the platform refuses access, or `Audio`
    /// if no usable device/config exists
    pub fn acquire_with(&self, mode: CaptureMode) -> Result<CaptureStream> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(self.sample_rate)
                    && c.max_sample_rate() >= SampleRate(self.sample_rate)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config: StreamConfig = supported_config
            .with_sample_rate(SampleRate(self.sample_rate))
            .config();

        let capture = CaptureStream::detached(self.sample_rate);
        let buffer = Arc::clone(&capture.buffer);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                        if mode == CaptureMode::Metering && buf.len() > ANALYSIS_WINDOW * 2 {
                            let excess = buf.len() - ANALYSIS_WINDOW;
                            buf.drain(..excess);
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| classify(&e.to_string()))?;

        stream
            .play()
            .map_err(|e| classify(&e.to_string()))?;

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate = self.sample_rate,
            ?mode,
            "audio capture started"
        );

        Ok(capture.attach(stream))
    }
}

impl AudioInput for Microphone {
    type Recording = CaptureStream;

    fn acquire(&self) -> Result<CaptureStream> {
        self.acquire_with(CaptureMode::Recording)
    }
}

/// Map a device error, singling out refused access
///
/// A missing or unplugged device is a plain audio error.
fn classify(message: &str) -> Error {
    let lower = message.to_lowercase();
    if lower.contains("permission")
        || lower.contains("denied")
        || lower.contains("not authorized")
    {
        Error::PermissionDenied(message.to_string())
    } else {
        Error::Audio(message.to_string())
    }
}

/// Exclusive handle on a live input stream
pub struct CaptureStream {
    sample_rate: u32,
    buffer: Arc<Mutex<Vec<f32>>>,
    released: Arc<AtomicBool>,
    stream: Option<Stream>,
}

impl CaptureStream {
    /// Handle without a device attached yet
    fn detached(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            buffer: Arc::new(Mutex::new(Vec::new())),
            released: Arc::new(AtomicBool::new(false)),
            stream: None,
        }
    }

    fn attach(mut self, stream: Stream) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Whether the device has been let go
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Live level vectors, one per display frame, until release
    ///
    /// Each call starts a fresh sequence over the same device.
    pub fn levels(&self, bar_count: usize) -> impl LevelStream<Item = Vec<f32>> + Send + use<> {
        level_stream(
            Arc::clone(&self.buffer),
            Arc::clone(&self.released),
            bar_count,
        )
    }

    /// Stop the device; safe to call any number of times
    pub fn release(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        tracing::debug!("audio capture released");
    }

    /// Release the device and encode everything recorded
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn finish(mut self) -> Result<AudioBlob> {
        self.release();
        let samples = self
            .buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();
        tracing::debug!(samples = samples.len(), "recording finalized");
        AudioBlob::from_samples(&samples, self.sample_rate)
    }
}

impl Recording for CaptureStream {
    fn finish(self) -> Result<AudioBlob> {
        Self::finish(self)
    }

    fn release(&mut self) {
        Self::release(self);
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt;

    use super::*;

    #[test]
    fn release_is_idempotent() {
        let mut capture = CaptureStream::detached(SAMPLE_RATE);
        assert!(!capture.is_released());

        capture.release();
        capture.release();

        assert!(capture.is_released());
        assert!(capture.stream.is_none());
    }

    #[test]
    fn finish_encodes_buffered_samples() {
        let capture = CaptureStream::detached(SAMPLE_RATE);
        capture.buffer.lock().unwrap().extend_from_slice(&[0.1; 160]);

        let blob = capture.finish().unwrap();
        assert_eq!(blob.mime_type, "audio/wav");
        assert_eq!(blob.file_name, "audio.wav");
        // 44-byte header plus 16-bit samples
        assert_eq!(blob.len(), 44 + 160 * 2);
    }

    #[tokio::test]
    async fn levels_stop_when_released() {
        let mut capture = CaptureStream::detached(SAMPLE_RATE);
        let mut levels = Box::pin(capture.levels(10));
        assert_eq!(levels.next().await.map(|l| l.len()), Some(10));

        capture.release();
        assert!(levels.next().await.is_none());

        // A fresh sequence on a released stream is empty as well
        let mut again = Box::pin(capture.levels(10));
        assert!(again.next().await.is_none());
    }

    #[test]
    fn refused_access_is_classified() {
        assert!(matches!(
            classify("Permission denied by user"),
            Error::PermissionDenied(_)
        ));
        assert!(matches!(classify("app is not authorized"), Error::PermissionDenied(_)));
        assert!(matches!(classify("bad format"), Error::Audio(_)));
    }

    #[test]
    fn missing_device_is_not_a_refusal() {
        let unplugged = cpal::BuildStreamError::DeviceNotAvailable.to_string();
        assert!(matches!(classify(&unplugged), Error::Audio(_)));
    }

    #[test]
    fn wav_roundtrip_keeps_sample_count() {
        let wav = samples_to_wav(&[0.0, 0.5, -0.5], SAMPLE_RATE).unwrap();
        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.len(), 3);
    }
}
