//! Canonical audio format and PCM helpers.
//!
//! Every stream that crosses the service boundary, inbound or outbound, is
//! PCM signed 16-bit little-endian, mono, 16 kHz. Synthesizers produce audio
//! at their own native rate; `resample` brings it to the canonical rate.

pub mod resample;

/// Canonical sample rate (Hz).
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

/// Canonical channel count.
pub const CANONICAL_CHANNELS: u16 = 1;

/// Bytes per canonical sample (s16le).
pub const BYTES_PER_SAMPLE: usize = 2;

/// A block of PCM produced by a synthesizer at its native rate.
///
/// Blocks are consumed exactly once, by the resampler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlock {
    /// Raw s16le PCM bytes.
    pub pcm: Vec<u8>,
    /// Native sample rate of `pcm` in Hz. May differ between blocks.
    pub sample_rate: u32,
}

impl AudioBlock {
    pub fn new(pcm: Vec<u8>, sample_rate: u32) -> Self {
        Self { pcm, sample_rate }
    }

    /// Build a block from decoded samples.
    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Self {
        Self::new(samples_to_pcm(samples), sample_rate)
    }

    /// Number of whole samples in the block.
    pub fn sample_count(&self) -> usize {
        self.pcm.len() / BYTES_PER_SAMPLE
    }

    /// Returns the duration of this block in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }
}

/// Decode s16le bytes into samples. A trailing odd byte is ignored.
pub fn pcm_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Encode samples as s16le bytes.
pub fn samples_to_pcm(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Decode s16le bytes into f32 samples in [-1.0, 1.0), the layout recognizers expect.
pub fn pcm_to_f32(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect()
}

/// Duration in milliseconds of `bytes` of canonical audio.
pub fn canonical_duration_ms(bytes: usize) -> u32 {
    let samples = (bytes / BYTES_PER_SAMPLE) as u64;
    (samples * 1000 / CANONICAL_SAMPLE_RATE as u64) as u32
}
