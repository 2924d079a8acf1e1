//! Sample-rate conversion for synthesizer output.
//!
//! ## Design
//!
//! Voices render at their own native rate (commonly 22 050 Hz). The wire
//! format is 16 kHz. `RateConverter` bridges that gap per synthesis block
//! with plain linear interpolation: equally spaced query positions over the
//! input index range `[0, N-1]`, piecewise-linear values between neighbouring
//! samples, clipped to the i16 range and truncated toward zero. No anti-alias
//! filter is applied; latency wins over fidelity here.
//!
//! When the block rate already equals the target rate the converter is a
//! zero-copy passthrough: the input bytes are handed back borrowed.
//!
//! ## Usage
//!
//! ```ignore
//! let rc = RateConverter::new(16_000);
//! let out = rc.process(&block); // Cow<[u8]> at 16 kHz
//! ```

use std::borrow::Cow;

use tracing::trace;

use crate::audio::{pcm_to_samples, samples_to_pcm, AudioBlock, CANONICAL_SAMPLE_RATE};

/// Converts s16le mono blocks from their native rate to a fixed target rate.
#[derive(Debug, Clone, Copy)]
pub struct RateConverter {
    target_rate: u32,
}

impl RateConverter {
    pub fn new(target_rate: u32) -> Self {
        Self { target_rate }
    }

    /// Converter targeting the canonical 16 kHz rate.
    pub fn canonical() -> Self {
        Self::new(CANONICAL_SAMPLE_RATE)
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Returns `true` when blocks at `rate` pass through untouched.
    pub fn is_passthrough(&self, rate: u32) -> bool {
        rate == self.target_rate
    }

    /// Resample one block, returning s16le bytes at the target rate.
    ///
    /// The result is empty when the block is too short to yield a single
    /// output sample. A block with a zero rate is treated as already at the
    /// target rate.
    pub fn process<'a>(&self, block: &'a AudioBlock) -> Cow<'a, [u8]> {
        if block.sample_rate == 0 || self.is_passthrough(block.sample_rate) {
            return Cow::Borrowed(&block.pcm);
        }

        let samples = pcm_to_samples(&block.pcm);
        let out = resample_linear(&samples, block.sample_rate, self.target_rate);
        trace!(
            from = block.sample_rate,
            to = self.target_rate,
            samples_in = samples.len(),
            samples_out = out.len(),
            "resampled block"
        );
        Cow::Owned(samples_to_pcm(&out))
    }
}

impl Default for RateConverter {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Number of output samples for `n` input samples: `round(n * to / from)`.
pub fn output_len(n: usize, from: u32, to: u32) -> usize {
    if from == 0 {
        return n;
    }
    let num = n as u128 * to as u128;
    let den = from as u128;
    ((2 * num + den) / (2 * den)) as usize
}

/// Linearly interpolate `samples` from `from` Hz to `to` Hz.
///
/// Equal rates return an exact copy.
pub fn resample_linear(samples: &[i16], from: u32, to: u32) -> Vec<i16> {
    if from == to || from == 0 {
        return samples.to_vec();
    }

    let n_in = samples.len();
    let n_out = output_len(n_in, from, to);
    if n_in == 0 || n_out == 0 {
        return Vec::new();
    }

    let last = (n_in - 1) as f64;
    let step = if n_out > 1 {
        last / (n_out - 1) as f64
    } else {
        0.0
    };

    (0..n_out)
        .map(|i| {
            // Pin the final position to the last input index so float drift
            // never reads past the end.
            let pos = if i + 1 == n_out && n_out > 1 {
                last
            } else {
                i as f64 * step
            };
            let value = interpolate(samples, pos);
            value.clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect()
}

fn interpolate(samples: &[i16], pos: f64) -> f64 {
    let idx = pos.floor() as usize;
    if idx + 1 >= samples.len() {
        return samples[samples.len() - 1] as f64;
    }
    let left = samples[idx] as f64;
    let right = samples[idx + 1] as f64;
    left + (right - left) * (pos - idx as f64)
}
