//! Audio playback to speakers
//!
//! Playback runs on its own thread and is observed through a
//! [`PlaybackHandle`], which can stop (and rewind) it at any moment.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::watch;

use super::AudioOutput;
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Encoded audio ready to be played
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl AudioClip {
    #[must_use]
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }
}

#[derive(Default)]
struct PlaybackShared {
    stopped: AtomicBool,
    position: AtomicUsize,
}

/// Observer and remote control for one playback
#[derive(Clone)]
pub struct PlaybackHandle {
    shared: Arc<PlaybackShared>,
    done: watch::Receiver<bool>,
}

/// Player side of a [`PlaybackHandle`]
///
/// Dropping it marks the playback finished, so a crashed player never
/// leaves the handle waiting.
pub struct PlaybackCompletion {
    shared: Arc<PlaybackShared>,
    done: watch::Sender<bool>,
}

impl PlaybackHandle {
    /// Create a linked handle/completion pair
    #[must_use]
    pub fn new() -> (Self, PlaybackCompletion) {
        let shared = Arc::new(PlaybackShared::default());
        let (tx, rx) = watch::channel(false);
        (
            Self {
                shared: Arc::clone(&shared),
                done: rx,
            },
            PlaybackCompletion { shared, done: tx },
        )
    }

    /// Halt immediately and rewind to the start
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.position.store(0, Ordering::Release);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Whether the player has let go of the clip
    #[must_use]
    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// Frames played so far
    #[must_use]
    pub fn position(&self) -> usize {
        self.shared.position.load(Ordering::Acquire)
    }

    /// Wait until playback ends for any reason
    pub async fn finished(&self) {
        let mut done = self.done.clone();
        // Err only if the sender vanished, which marks completion anyway
        let _ = done.wait_for(|finished| *finished).await;
    }
}

impl PlaybackCompletion {
    /// Whether the handle asked to stop
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Record progress
    pub fn set_position(&self, position: usize) {
        if !self.should_stop() {
            self.shared.position.store(position, Ordering::Release);
        }
    }

    /// Mark the playback as done
    pub fn complete(self) {
        drop(self);
    }
}

impl Drop for PlaybackCompletion {
    fn drop(&mut self) {
        if self.should_stop() {
            self.shared.position.store(0, Ordering::Release);
        }
        self.done.send_replace(true);
    }
}

/// Plays audio to the default output device
pub struct Speaker {
    config: StreamConfig,
}

impl Speaker {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config })
    }
}

impl AudioOutput for Speaker {
    fn play(&mut self, clip: &AudioClip) -> Result<PlaybackHandle> {
        let (samples, rate) = decode_clip(clip)?;
        let samples = if rate == PLAYBACK_SAMPLE_RATE {
            samples
        } else {
            resample_audio(&samples, rate, PLAYBACK_SAMPLE_RATE)?
        };

        let (handle, completion) = PlaybackHandle::new();
        let config = self.config.clone();

        std::thread::Builder::new()
            .name("coach-playback".to_string())
            .spawn(move || {
                if let Err(e) = play_blocking(&config, samples, &completion) {
                    tracing::warn!(error = %e, "audio playback error");
                }
                completion.complete();
            })?;

        Ok(handle)
    }
}

/// Play samples until they run out or the handle stops us
fn play_blocking(
    config: &StreamConfig,
    samples: Vec<f32>,
    completion: &PlaybackCompletion,
) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let channels = usize::from(config.channels);
    let total = samples.len();
    let samples = Arc::new(samples);
    let cursor = Arc::new(AtomicUsize::new(0));
    let stop = Arc::clone(&completion.shared);

    let callback_samples = Arc::clone(&samples);
    let callback_cursor = Arc::clone(&cursor);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let halted = stop.stopped.load(Ordering::Acquire);
                for frame in data.chunks_mut(channels) {
                    let pos = callback_cursor.load(Ordering::Relaxed);
                    let sample = if !halted && pos < callback_samples.len() {
                        callback_cursor.store(pos + 1, Ordering::Relaxed);
                        callback_samples[pos]
                    } else {
                        0.0
                    };
                    frame.fill(sample);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (total as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    let start = Instant::now();
    let timeout = Duration::from_millis(duration_ms + 500);

    loop {
        if completion.should_stop() {
            tracing::debug!("playback stopped");
            break;
        }
        let pos = cursor.load(Ordering::Relaxed);
        completion.set_position(pos);
        if pos >= total || start.elapsed() > timeout {
            // Let the device drain its last buffer
            std::thread::sleep(Duration::from_millis(100));
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    drop(stream);
    tracing::debug!(samples = total, "playback complete");

    Ok(())
}

/// Decode a clip to mono f32 samples and their sample rate
fn decode_clip(clip: &AudioClip) -> Result<(Vec<f32>, u32)> {
    if clip.mime_type.contains("wav") {
        decode_wav(&clip.bytes)
    } else {
        decode_mp3(&clip.bytes)
    }
}

fn decode_wav(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::new(Cursor::new(data)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = reader
        .samples::<i16>()
        .map(|s| s.map(|v| f32::from(v) / 32768.0))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?;

    #[allow(clippy::cast_precision_loss)]
    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok((mono, spec.sample_rate))
}

/// Decode MP3 bytes to f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = PLAYBACK_SAMPLE_RATE;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                #[allow(clippy::cast_sign_loss)]
                {
                    sample_rate = frame.sample_rate as u32;
                }
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok((samples, sample_rate))
}

/// Resample audio using rubato
#[allow(clippy::cast_possible_truncation)]
fn resample_audio(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let mut output = Vec::new();

    for chunk in samples.chunks(chunk_size) {
        // Pad the tail so the last partial chunk is not lost
        let mut input: Vec<f64> = chunk.iter().map(|&s| f64::from(s)).collect();
        input.resize(chunk_size, 0.0);

        let result = resampler
            .process(&[input], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend(result[0].iter().map(|&s| s as f32));
    }

    Ok(output)
}
