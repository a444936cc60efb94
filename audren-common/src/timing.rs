//! Audio processor tick conversions
//!
//! Estimated command costs and DSP deadlines are expressed in ticks of the
//! console's 19.2 MHz system counter. Host-side tooling wants durations, so
//! the conversions live here rather than in the renderer.

use std::time::Duration;

/// System counter frequency in Hz
pub const TICK_RATE: u64 = 19_200_000;

/// Convert processor ticks to a `Duration` (truncating below 1ns)
pub fn ticks_to_duration(ticks: u64) -> Duration {
    let nanos = (ticks as u128 * 1_000_000_000) / TICK_RATE as u128;
    Duration::from_nanos(nanos as u64)
}

/// Convert a `Duration` to processor ticks (truncating)
pub fn duration_to_ticks(duration: Duration) -> u64 {
    ((duration.as_nanos() * TICK_RATE as u128) / 1_000_000_000) as u64
}

/// Length of one rendered frame
///
/// `sample_count` samples at `sample_rate` Hz; 160 samples @ 32kHz and
/// 240 samples @ 48kHz both give 5ms.
pub fn frame_duration(sample_rate: u32, sample_count: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(sample_count as u64 * 1_000_000_000 / sample_rate as u64)
}

/// Fraction of a frame consumed by `ticks` of estimated work
pub fn frame_load(ticks: u64, sample_rate: u32, sample_count: u32) -> f64 {
    let frame = frame_duration(sample_rate, sample_count);
    if frame.is_zero() {
        return 0.0;
    }
    ticks_to_duration(ticks).as_secs_f64() / frame.as_secs_f64()
}
