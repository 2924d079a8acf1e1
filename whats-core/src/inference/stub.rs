//! `StubRecognizer`: placeholder backend that reports audio metadata instead of words.
//!
//! Silence (RMS below a fixed threshold) yields no segments, like a real
//! recognizer with a VAD filter. Anything louder yields one segment
//! `"[stub: <N> samples @ 16000 Hz]"` spanning the whole input.

use tracing::debug;

use crate::audio::CANONICAL_SAMPLE_RATE;
use crate::error::Result;
use crate::inference::{Recognition, RecognizeOptions, SpeechRecognizer, Task, TranscriptSegment};

/// RMS level below which input counts as silence.
const SILENCE_RMS: f32 = 0.01;

/// Fallback when no language hint is given.
const DEFAULT_LANGUAGE: &str = "en";

pub struct StubRecognizer {
    utterance_count: u32,
}

impl StubRecognizer {
    pub fn new() -> Self {
        Self { utterance_count: 0 }
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Default for StubRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechRecognizer for StubRecognizer {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubRecognizer::warm_up (no-op)");
        Ok(())
    }

    fn recognize(&mut self, audio: &[f32], options: &RecognizeOptions) -> Result<Recognition> {
        let language = match options.task {
            Task::Translate => "en".to_string(),
            Task::Transcribe => options
                .language
                .clone()
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        };

        if Self::rms(audio) < SILENCE_RMS {
            return Ok(Recognition {
                segments: vec![],
                language,
            });
        }

        self.utterance_count += 1;
        debug!(
            utterance = self.utterance_count,
            samples = audio.len(),
            "StubRecognizer::recognize"
        );
        let duration = audio.len() as f64 / CANONICAL_SAMPLE_RATE as f64;
        let segments = vec![TranscriptSegment {
            text: format!(
                " [stub: {} samples @ {} Hz]",
                audio.len(),
                CANONICAL_SAMPLE_RATE
            ),
            start_time: 0.0,
            end_time: duration,
            confidence: 1.0,
        }];

        Ok(Recognition { segments, language })
    }
}
