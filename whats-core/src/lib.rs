//! # whats-core
//!
//! Post-processing core of the Whats speech services: everything between raw
//! model output and the wire.
//!
//! ## Architecture
//!
//! ```text
//! Synthesis:
//!   text → VoiceResolver → Synthesizer blocks (native rate)
//!        → RateConverter (16 kHz) → ChunkBuffer (3200 B) → AudioChunk stream
//!
//! Recognition:
//!   PCM s16le @16 kHz → SpeechRecognizer → segments → joined text
//!        → TranslationGate (optional, once) → TranscriptionResult
//! ```
//!
//! Recognizer, synthesizer and translator backends sit behind traits
//! (`SpeechRecognizer`, `Synthesizer`, `Translator`). Stub backends ship with
//! the crate so the whole path runs without neural models.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod inference;
pub mod protocol;
pub mod translate;
pub mod voice;

// Convenience re-exports for downstream crates
pub use buffering::AudioChunk;
pub use engine::{
    DiagnosticsSnapshot, EngineConfig, SpeechEngine, SynthesisRequest, SynthesisStream,
    TranscriptionRequest, TranscriptionResult,
};
pub use error::{Result, WhatsError};
pub use inference::{RecognizerHandle, SpeechRecognizer, Task, TranscriptSegment};
pub use translate::{LanguageCodeMap, TranslationGate, TranslationOutcome, Translator};
pub use voice::{LanguageVoiceMap, Synthesizer, VoiceRegistry, VoiceResolver};
