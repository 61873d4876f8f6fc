//! Amplitude level metering for live visualization

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;

/// Default number of meter bars
pub const DEFAULT_BAR_COUNT: usize = 40;

/// Samples examined per tick
pub const ANALYSIS_WINDOW: usize = 1024;

/// Roughly one display refresh
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Mean deviation that maps to a full bar
const FULL_SCALE_DEVIATION: f32 = 0.5;

/// Split `samples` into `bar_count` equal chunks and measure each one
///
/// Each level is the chunk's mean absolute deviation from zero, scaled so
/// that [`FULL_SCALE_DEVIATION`] reads as 1.0 and clamped to `[0, 1]`.
/// Trailing samples that don't fill a chunk are ignored. Too few samples
/// yields all-zero levels.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_levels(samples: &[f32], bar_count: usize) -> Vec<f32> {
    if bar_count == 0 {
        return Vec::new();
    }

    let chunk_size = samples.len() / bar_count;
    if chunk_size == 0 {
        return vec![0.0; bar_count];
    }

    samples
        .chunks_exact(chunk_size)
        .take(bar_count)
        .map(|chunk| {
            let mean = chunk.iter().map(|s| s.abs()).sum::<f32>() / chunk_size as f32;
            (mean / FULL_SCALE_DEVIATION).clamp(0.0, 1.0)
        })
        .collect()
}

/// Build a per-frame level stream over a shared sample buffer
///
/// The stream yields one level vector per tick from the newest
/// [`ANALYSIS_WINDOW`] samples and ends once `released` is set.
pub(crate) fn level_stream(
    buffer: Arc<Mutex<Vec<f32>>>,
    released: Arc<AtomicBool>,
    bar_count: usize,
) -> impl Stream<Item = Vec<f32>> + Send + 'static {
    let mut interval = tokio::time::interval(FRAME_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    IntervalStream::new(interval)
        .take_while(move |_| !released.load(Ordering::Acquire))
        .map(move |_| {
            let window = buffer
                .lock()
                .map(|buf| {
                    let start = buf.len().saturating_sub(ANALYSIS_WINDOW);
                    buf[start..].to_vec()
                })
                .unwrap_or_default();
            compute_levels(&window, bar_count)
        })
}
