//! `SpeechEngine`: top-level request handler shared by every worker.
//!
//! ## Lifecycle
//!
//! ```text
//! load voices ─► SpeechEngine::new()
//!                    └─► warm_up()          → recognizer + translator primed
//!                        └─► transcribe() / synthesize()   (any thread, concurrently)
//! ```
//!
//! Models are loaded and warmed before the first request; nothing on the
//! request path loads weights.
//!
//! ## Threading
//!
//! `SpeechEngine` is `Send + Sync`. The voice registry and translation gate are
//! read-only. The recognizer is serialised behind `RecognizerHandle`'s mutex.
//! Per-request state (chunk residual, sequence counter) lives in the
//! `SynthesisStream` owned by the request.

pub mod synthesis;
pub mod transcription;

pub use synthesis::{StreamingSynthesisPipeline, SynthesisRequest, SynthesisStream};
pub use transcription::{TranscriptionRequest, TranscriptionResult, TranscriptionResultAssembler};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, WhatsError};
use crate::inference::RecognizerHandle;
use crate::translate::{LanguageCodeMap, TranslationGate, Translator};
use crate::voice::{LanguageVoiceMap, VoiceRegistry, VoiceResolver};

/// Default advisory translation timeout.
pub const DEFAULT_TRANSLATE_TIMEOUT: Duration = Duration::from_millis(250);

/// Configuration for `SpeechEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Soft limit for one translation call. Exceeding it is logged; the
    /// result is still used. Default: 250 ms.
    pub translate_timeout: Duration,
    /// Tag → translator code table.
    pub language_codes: LanguageCodeMap,
    /// Tag → voice table plus default voice.
    pub voice_map: LanguageVoiceMap,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            translate_timeout: DEFAULT_TRANSLATE_TIMEOUT,
            language_codes: LanguageCodeMap::default(),
            voice_map: LanguageVoiceMap::default(),
        }
    }
}

/// Shared engine counters. All updates use `Relaxed`; they are only read for
/// reporting.
#[derive(Debug, Default)]
pub struct EngineDiagnostics {
    pub transcriptions: AtomicUsize,
    pub synthesis_streams: AtomicUsize,
    pub chunks_emitted: AtomicUsize,
    /// Gate decisions, short-circuits included.
    pub translations_attempted: AtomicUsize,
    pub translation_fallbacks: AtomicUsize,
    pub translations_over_timeout: AtomicUsize,
    pub rejected_requests: AtomicUsize,
}

impl EngineDiagnostics {
    pub fn reset(&self) {
        self.transcriptions.store(0, Ordering::Relaxed);
        self.synthesis_streams.store(0, Ordering::Relaxed);
        self.chunks_emitted.store(0, Ordering::Relaxed);
        self.translations_attempted.store(0, Ordering::Relaxed);
        self.translation_fallbacks.store(0, Ordering::Relaxed);
        self.translations_over_timeout.store(0, Ordering::Relaxed);
        self.rejected_requests.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            transcriptions: self.transcriptions.load(Ordering::Relaxed),
            synthesis_streams: self.synthesis_streams.load(Ordering::Relaxed),
            chunks_emitted: self.chunks_emitted.load(Ordering::Relaxed),
            translations_attempted: self.translations_attempted.load(Ordering::Relaxed),
            translation_fallbacks: self.translation_fallbacks.load(Ordering::Relaxed),
            translations_over_timeout: self.translations_over_timeout.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub transcriptions: usize,
    pub synthesis_streams: usize,
    pub chunks_emitted: usize,
    pub translations_attempted: usize,
    pub translation_fallbacks: usize,
    pub translations_over_timeout: usize,
    pub rejected_requests: usize,
}

/// The top-level engine handle. Wrap in `Arc<SpeechEngine>` to share between
/// workers.
pub struct SpeechEngine {
    config: EngineConfig,
    recognizer: RecognizerHandle,
    resolver: VoiceResolver,
    /// `None` when no translator is configured; translation is then skipped.
    gate: Option<TranslationGate>,
    diagnostics: Arc<EngineDiagnostics>,
}

impl SpeechEngine {
    pub fn new(
        config: EngineConfig,
        recognizer: RecognizerHandle,
        voices: Arc<VoiceRegistry>,
        translator: Option<Arc<dyn Translator>>,
    ) -> Self {
        let resolver = VoiceResolver::new(voices, config.voice_map.clone());
        let gate = translator.map(|t| TranslationGate::new(t, config.language_codes.clone()));
        Self {
            config,
            recognizer,
            resolver,
            gate,
            diagnostics: Arc::new(EngineDiagnostics::default()),
        }
    }

    /// Prime the recognizer and the translator. Call once at startup, before
    /// serving.
    ///
    /// # Errors
    /// Recognizer warm-up failures. Translator warm-up failures are only
    /// logged.
    pub fn warm_up(&self) -> Result<()> {
        let start = Instant::now();
        info!("warming up speech recognizer");
        self.recognizer.0.lock().warm_up()?;
        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "speech recognizer ready"
        );

        if let Some(gate) = &self.gate {
            gate.warm_up();
        }
        Ok(())
    }

    /// Recognize one utterance and, when asked, translate the transcript.
    ///
    /// # Errors
    /// - `WhatsError::UnsupportedSampleRate` for non-16 kHz input.
    /// - Recognizer failures.
    pub fn transcribe(&self, request: &TranscriptionRequest) -> Result<TranscriptionResult> {
        let assembler = TranscriptionResultAssembler::new(
            &self.recognizer,
            self.gate.as_ref(),
            self.config.translate_timeout,
        );

        let result = match assembler.assemble(request) {
            Ok(r) => r,
            Err(e) => {
                if matches!(e, WhatsError::UnsupportedSampleRate { .. }) {
                    self.diagnostics
                        .rejected_requests
                        .fetch_add(1, Ordering::Relaxed);
                }
                return Err(e);
            }
        };

        self.diagnostics
            .transcriptions
            .fetch_add(1, Ordering::Relaxed);
        if let Some(tr) = &result.translation {
            self.diagnostics
                .translations_attempted
                .fetch_add(1, Ordering::Relaxed);
            if tr.fallback_used {
                self.diagnostics
                    .translation_fallbacks
                    .fetch_add(1, Ordering::Relaxed);
            }
            if tr.over_timeout {
                self.diagnostics
                    .translations_over_timeout
                    .fetch_add(1, Ordering::Relaxed);
            }
        }

        info!(
            language = %result.language,
            segments = result.segments.len(),
            chars = result.text.len(),
            inference_ms = result.inference_duration_ms,
            translated = result.translation.is_some(),
            "transcription complete"
        );
        Ok(result)
    }

    /// Start a chunk stream for `request`. The stream carries no final
    /// marker; see `SynthesisStream::with_final_marker`.
    ///
    /// # Errors
    /// Synthesizer start-up failures.
    pub fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisStream> {
        let stream = StreamingSynthesisPipeline::new(&self.resolver)
            .start(request)
            .map_err(|e| {
                warn!("synthesis failed to start: {e}");
                e
            })?;
        self.diagnostics
            .synthesis_streams
            .fetch_add(1, Ordering::Relaxed);
        Ok(stream.with_diagnostics(Arc::clone(&self.diagnostics)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn voices(&self) -> &VoiceRegistry {
        self.resolver.registry()
    }

    pub fn has_translator(&self) -> bool {
        self.gate.is_some()
    }

    /// Snapshot of engine counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }
}

impl std::fmt::Debug for SpeechEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechEngine")
            .field("config", &self.config)
            .field("voices", &self.voices().len())
            .field("translator", &self.gate.is_some())
            .finish_non_exhaustive()
    }
}
