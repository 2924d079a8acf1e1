//! `ToneVoice`: placeholder backend that renders a sine tone instead of speech.
//!
//! Used when no neural synthesizer is wired in. Output length tracks the
//! input text and `length_scale` so the resampling and chunking stages see
//! realistic, variable-sized blocks: one block per sentence, at the voice's
//! native rate, phase-continuous across blocks.

use std::f64::consts::PI;

use crate::audio::AudioBlock;
use crate::error::Result;
use crate::voice::{BlockStream, SynthesisParams, Synthesizer};

pub const TONE_FREQUENCY_HZ: f64 = 440.0;
pub const TONE_AMPLITUDE: f64 = 16_000.0;

/// Rendered duration per input character at `length_scale == 1.0`.
const MS_PER_CHAR: f64 = 60.0;

/// Longest block rendered for one sentence.
const MAX_BLOCK_SECS: f64 = 60.0;

/// Sine-tone synthesizer.
#[derive(Debug, Clone)]
pub struct ToneVoice {
    native_rate: u32,
    frequency: f64,
}

impl ToneVoice {
    pub fn new(native_rate: u32) -> Self {
        Self::with_frequency(native_rate, TONE_FREQUENCY_HZ)
    }

    pub fn with_frequency(native_rate: u32, frequency: f64) -> Self {
        Self {
            native_rate,
            frequency,
        }
    }
}

impl Synthesizer for ToneVoice {
    fn native_rate(&self) -> u32 {
        self.native_rate
    }

    fn synthesize(&self, text: &str, params: &SynthesisParams) -> Result<BlockStream> {
        let sentences = split_sentences(text);
        let rate = self.native_rate;
        let frequency = self.frequency;
        let scale = if params.length_scale.is_finite() && params.length_scale > 0.0 {
            params.length_scale as f64
        } else {
            1.0
        };
        let max_samples = (MAX_BLOCK_SECS * rate as f64) as usize;
        let mut t = 0u64;

        let blocks = sentences.into_iter().map(move |sentence| {
            let chars = sentence.chars().count() as f64;
            let n = (chars * MS_PER_CHAR * scale * rate as f64 / 1000.0).round() as usize;
            let n = n.min(max_samples);
            let samples: Vec<i16> = (0..n)
                .map(|i| {
                    let secs = (t + i as u64) as f64 / rate as f64;
                    (TONE_AMPLITUDE * (2.0 * PI * frequency * secs).sin()) as i16
                })
                .collect();
            t += n as u64;
            Ok(AudioBlock::from_samples(&samples, rate))
        });

        Ok(Box::new(blocks))
    }
}

/// Split on sentence-ending punctuation, dropping empty pieces.
fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    out
}
