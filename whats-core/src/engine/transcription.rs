//! Transcription result assembly.
//!
//! ```text
//! PCM s16le ─► rate check ─► f32 ─► recognizer ─► segments ─► joined text
//!                                                                │
//!                                     (target set, text, gate) ──┴─► TranslationGate (once)
//! ```
//!
//! The sample rate is checked before the recognizer is touched. Segment order
//! is whatever the recognizer returned; it is never re-sorted.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::{pcm_to_f32, CANONICAL_SAMPLE_RATE};
use crate::error::{Result, WhatsError};
use crate::inference::{RecognizeOptions, RecognizerHandle, Task, TranscriptSegment};
use crate::translate::{TranslationGate, TranslationOutcome};

/// Language reported when the audio is empty and no hint was given.
pub const FALLBACK_LANGUAGE: &str = "en";

/// One recognition request, already decoded from the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptionRequest {
    /// Canonical s16le mono PCM.
    pub audio: Vec<u8>,
    pub sample_rate: u32,
    pub language_hint: Option<String>,
    pub task: Task,
    /// Post-hoc translation target; `None` or empty skips translation.
    pub target_language: Option<String>,
}

/// Structured recognition result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionResult {
    pub text: String,
    pub language: String,
    pub segments: Vec<TranscriptSegment>,
    pub inference_duration_ms: u64,
    /// Present only when translation was requested and ran through the gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<TranslationOutcome>,
}

impl TranscriptionResult {
    fn empty(language: String) -> Self {
        Self {
            text: String::new(),
            language,
            segments: Vec::new(),
            inference_duration_ms: 0,
            translation: None,
        }
    }
}

/// Trimmed segment texts joined by single spaces. Blank segments are skipped
/// so they cannot introduce double spaces.
pub fn join_segments(segments: &[TranscriptSegment]) -> String {
    let mut text = String::new();
    for part in segments.iter().map(|s| s.text.trim()).filter(|t| !t.is_empty()) {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(part);
    }
    text
}

/// Runs the recognizer and, when asked, one translation gate decision.
pub struct TranscriptionResultAssembler<'a> {
    recognizer: &'a RecognizerHandle,
    gate: Option<&'a TranslationGate>,
    translate_timeout: Duration,
}

impl<'a> TranscriptionResultAssembler<'a> {
    pub fn new(
        recognizer: &'a RecognizerHandle,
        gate: Option<&'a TranslationGate>,
        translate_timeout: Duration,
    ) -> Self {
        Self {
            recognizer,
            gate,
            translate_timeout,
        }
    }

    /// # Errors
    /// - `WhatsError::UnsupportedSampleRate` when the audio is not 16 kHz; the
    ///   recognizer is not invoked.
    /// - Any recognizer error.
    pub fn assemble(&self, request: &TranscriptionRequest) -> Result<TranscriptionResult> {
        if request.sample_rate != CANONICAL_SAMPLE_RATE {
            return Err(WhatsError::UnsupportedSampleRate {
                expected: CANONICAL_SAMPLE_RATE,
                actual: request.sample_rate,
            });
        }

        let hint = request
            .language_hint
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty());

        let samples = pcm_to_f32(&request.audio);
        if samples.is_empty() {
            debug!("empty audio, skipping recognizer");
            return Ok(TranscriptionResult::empty(
                hint.unwrap_or(FALLBACK_LANGUAGE).to_string(),
            ));
        }

        let options = RecognizeOptions {
            language: hint.map(str::to_string),
            task: request.task,
        };

        let start = Instant::now();
        let recognition = self.recognizer.0.lock().recognize(&samples, &options)?;
        let inference_duration_ms = start.elapsed().as_millis() as u64;

        let segments: Vec<TranscriptSegment> = recognition
            .segments
            .into_iter()
            .map(|seg| TranscriptSegment {
                text: seg.text.trim().to_string(),
                ..seg
            })
            .collect();
        let text = join_segments(&segments);

        let target = request
            .target_language
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let translation = match (target, self.gate) {
            (Some(target), Some(gate)) if !text.is_empty() => Some(gate.decide(
                &text,
                &recognition.language,
                target,
                self.translate_timeout,
            )),
            _ => None,
        };

        Ok(TranscriptionResult {
            text,
            language: recognition.language,
            segments,
            inference_duration_ms,
            translation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::samples_to_pcm;
    use crate::inference::{Recognition, SpeechRecognizer};
    use crate::translate::{LanguageCodeMap, Translator};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns fixed segments and counts calls.
    struct Canned {
        calls: Arc<AtomicUsize>,
        segments: Vec<&'static str>,
        language: &'static str,
    }

    impl SpeechRecognizer for Canned {
        fn warm_up(&mut self) -> Result<()> {
            Ok(())
        }

        fn recognize(&mut self, _audio: &[f32], _opts: &RecognizeOptions) -> Result<Recognition> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let segments = self
                .segments
                .iter()
                .enumerate()
                .map(|(i, text)| TranscriptSegment {
                    text: text.to_string(),
                    start_time: i as f64,
                    end_time: i as f64 + 1.0,
                    confidence: -0.1,
                })
                .collect();
            Ok(Recognition {
                segments,
                language: self.language.to_string(),
            })
        }
    }

    struct Shout;

    impl Translator for Shout {
        fn translate(&self, text: &str, _src: &str, _tgt: &str) -> Result<String> {
            Ok(text.to_uppercase())
        }
    }

    fn canned(
        segments: Vec<&'static str>,
        language: &'static str,
    ) -> (Arc<AtomicUsize>, RecognizerHandle) {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = RecognizerHandle::new(Canned {
            calls: calls.clone(),
            segments,
            language,
        });
        (calls, handle)
    }

    fn speech(seconds: f32) -> Vec<u8> {
        let n = (seconds * 16_000.0) as usize;
        samples_to_pcm(&vec![8_000i16; n])
    }

    const TIMEOUT: Duration = Duration::from_millis(250);

    #[test]
    fn wrong_rate_rejected_before_recognizer() {
        let (calls, handle) = canned(vec!["hi"], "en");
        let assembler = TranscriptionResultAssembler::new(&handle, None, TIMEOUT);
        let err = assembler
            .assemble(&TranscriptionRequest {
                audio: speech(0.5),
                sample_rate: 8_000,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            err,
            WhatsError::UnsupportedSampleRate {
                expected: 16_000,
                actual: 8_000
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_audio_short_circuits_with_hint() {
        let (calls, handle) = canned(vec!["hi"], "en");
        let assembler = TranscriptionResultAssembler::new(&handle, None, TIMEOUT);
        let out = assembler
            .assemble(&TranscriptionRequest {
                sample_rate: 16_000,
                language_hint: Some("es".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(out.text, "");
        assert_eq!(out.language, "es");
        assert!(out.segments.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn segments_are_trimmed_and_joined_in_order() {
        let (_calls, handle) = canned(vec![" Hello", "  ", "world. ", " again"], "en");
        let assembler = TranscriptionResultAssembler::new(&handle, None, TIMEOUT);
        let out = assembler
            .assemble(&TranscriptionRequest {
                audio: speech(1.0),
                sample_rate: 16_000,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(out.text, "Hello world. again");
        assert_eq!(out.segments.len(), 4);
        assert_eq!(out.segments[0].text, "Hello");
        assert_eq!(out.segments[3].start_time, 3.0);
        assert!(out.translation.is_none());
    }

    #[test]
    fn translation_runs_once_against_detected_language() {
        let (_calls, handle) = canned(vec!["hola"], "es");
        let gate = TranslationGate::new(Arc::new(Shout), LanguageCodeMap::default());
        let assembler = TranscriptionResultAssembler::new(&handle, Some(&gate), TIMEOUT);
        let out = assembler
            .assemble(&TranscriptionRequest {
                audio: speech(0.5),
                sample_rate: 16_000,
                target_language: Some("en".into()),
                ..Default::default()
            })
            .unwrap();
        let tr = out.translation.expect("translation requested");
        assert_eq!(tr.translated_text, "HOLA");
        assert_eq!(tr.source_lang, "es");
        assert_eq!(tr.target_lang, "en");
        assert!(!tr.fallback_used);
    }

    #[test]
    fn no_gate_or_no_text_means_no_translation() {
        let (_calls, handle) = canned(vec![], "en");
        let gate = TranslationGate::new(Arc::new(Shout), LanguageCodeMap::default());
        let assembler = TranscriptionResultAssembler::new(&handle, Some(&gate), TIMEOUT);
        let request = TranscriptionRequest {
            audio: speech(0.5),
            sample_rate: 16_000,
            target_language: Some("pt".into()),
            ..Default::default()
        };
        assert!(assembler.assemble(&request).unwrap().translation.is_none());

        let (_calls, handle) = canned(vec!["hello"], "en");
        let assembler = TranscriptionResultAssembler::new(&handle, None, TIMEOUT);
        assert!(assembler.assemble(&request).unwrap().translation.is_none());
    }

    #[test]
    fn result_serializes_without_translation_field_when_absent() {
        let result = TranscriptionResult::empty("en".into());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["text"], "");
        assert_eq!(json["inferenceDurationMs"], 0);
        assert!(json.get("translation").is_none());
    }
}
