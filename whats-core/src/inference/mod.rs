//! Speech recognizer abstraction.
//!
//! The `SpeechRecognizer` trait decouples the transcription path from any
//! specific backend (stub, Whisper via ONNX, a remote engine, ...).
//!
//! `&mut self` on `recognize` expresses that decoders are stateful (beam
//! search caches, hidden states). All mutation is therefore serialised
//! through `RecognizerHandle`'s `parking_lot::Mutex`.

pub mod stub;

pub use stub::StubRecognizer;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What the recognizer should do with the audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    /// Transcribe in the spoken language.
    #[default]
    Transcribe,
    /// Transcribe straight into English.
    Translate,
}

impl Task {
    /// Parse a wire task name. Empty means `Transcribe`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "transcribe" => Some(Task::Transcribe),
            "translate" => Some(Task::Translate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Task::Transcribe => "transcribe",
            Task::Translate => "translate",
        }
    }
}

/// One recognized span of speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub text: String,
    /// Seconds from the start of the audio.
    pub start_time: f64,
    pub end_time: f64,
    /// Backend-specific score (e.g. average log-probability).
    pub confidence: f32,
}

/// Per-call recognizer options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognizeOptions {
    /// Language hint; `None` asks the backend to detect.
    pub language: Option<String>,
    pub task: Task,
}

/// Raw recognizer output.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    /// Ordered by `start_time`.
    pub segments: Vec<TranscriptSegment>,
    /// Detected (or hinted) language tag.
    pub language: String,
}

/// Contract for speech recognition backends.
pub trait SpeechRecognizer: Send + 'static {
    /// One-time warm-up: load weights, run a dummy inference. Called once at
    /// startup, never on the request path.
    ///
    /// # Errors
    /// Returns an error if model files are missing or corrupt.
    fn warm_up(&mut self) -> Result<()>;

    /// Recognize mono 16 kHz f32 audio in [-1.0, 1.0].
    fn recognize(&mut self, audio: &[f32], options: &RecognizeOptions) -> Result<Recognition>;
}

/// Thread-safe reference-counted handle to any `SpeechRecognizer` implementor.
///
/// Uses `parking_lot::Mutex` for non-poisoning on panic and a cheaper
/// uncontended lock than `std::sync::Mutex`.
#[derive(Clone)]
pub struct RecognizerHandle(pub Arc<Mutex<dyn SpeechRecognizer>>);

impl RecognizerHandle {
    pub fn new<R: SpeechRecognizer>(recognizer: R) -> Self {
        Self(Arc::new(Mutex::new(recognizer)))
    }
}

impl std::fmt::Debug for RecognizerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognizerHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_parsing() {
        assert_eq!(Task::parse(""), Some(Task::Transcribe));
        assert_eq!(Task::parse("Translate"), Some(Task::Translate));
        assert_eq!(Task::parse("summarize"), None);
        assert_eq!(Task::Translate.as_str(), "translate");
    }

    #[test]
    fn segment_serializes_with_camel_case() {
        let seg = TranscriptSegment {
            text: "hello".into(),
            start_time: 0.5,
            end_time: 1.25,
            confidence: -0.2,
        };
        let json = serde_json::to_value(&seg).expect("serialize segment");
        assert_eq!(json["text"], "hello");
        assert_eq!(json["startTime"], 0.5);
        assert_eq!(json["endTime"], 1.25);
    }
}
