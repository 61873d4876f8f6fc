//! Voice I/O
//!
//! Handles microphone capture (recording and level metering) and speaker
//! playback. Hardware sits behind [`AudioInput`] and [`AudioOutput`] so the
//! session coordinator can run against in-memory devices.

mod capture;
mod levels;
mod playback;

pub use capture::{
    AudioBlob, CaptureMode, CaptureStream, Microphone, RECORDING_MIME_TYPE, SAMPLE_RATE,
    samples_to_wav,
};
pub use levels::{ANALYSIS_WINDOW, DEFAULT_BAR_COUNT, FRAME_INTERVAL, compute_levels};
pub use playback::{AudioClip, PlaybackCompletion, PlaybackHandle, Speaker};

use crate::Result;

/// Source of exclusive recordings
pub trait AudioInput {
    type Recording: Recording;

    /// Acquire the device and start recording
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` when the platform refuses access
    fn acquire(&self) -> Result<Self::Recording>;
}

/// A recording in progress
///
/// The device must be released exactly once, whether the recording is
/// finished, released explicitly, or dropped.
pub trait Recording {
    /// Release the device and produce the finished blob
    ///
    /// # Errors
    ///
    /// Returns error if the captured audio cannot be encoded
    fn finish(self) -> Result<AudioBlob>;

    /// Release the device without producing a blob; idempotent
    fn release(&mut self);
}

/// Sink for synthesized speech
pub trait AudioOutput {
    /// Start playing a clip, returning a handle that observes and stops it
    ///
    /// # Errors
    ///
    /// Returns error if the clip cannot be decoded or the device is unavailable
    fn play(&mut self, clip: &AudioClip) -> Result<PlaybackHandle>;
}
