//! Voice abstraction, registry and selection.
//!
//! The `Synthesizer` trait decouples the streaming pipeline from any specific
//! TTS backend. Voices are loaded once at startup into an immutable
//! `VoiceRegistry`; request handlers only ever read from it, so it is shared
//! across workers behind an `Arc` without locking.
//!
//! `VoiceResolver` is total: an unknown voice or language degrades to some
//! loaded voice instead of failing the request.

pub mod loader;
pub mod tone;

pub use loader::{load_voice_dir, ToneVoiceLoader, VoiceConfig, VoiceLoader};
pub use tone::ToneVoice;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audio::AudioBlock;
use crate::error::{Result, WhatsError};

/// Voice identifier meaning "pick one for me".
pub const DEFAULT_VOICE_SENTINEL: &str = "default";

/// Lazy, single-pass sequence of native-rate blocks for one utterance.
pub type BlockStream = Box<dyn Iterator<Item = Result<AudioBlock>> + Send>;

/// Bounds on `length_scale`; speeds outside 0.1x..10x are clamped.
pub const MIN_LENGTH_SCALE: f32 = 0.1;
pub const MAX_LENGTH_SCALE: f32 = 10.0;

/// Per-call synthesis knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisParams {
    /// Phoneme length multiplier: < 1 speaks faster, > 1 slower.
    pub length_scale: f32,
}

impl SynthesisParams {
    /// Derive parameters from a caller speed multiplier. Non-positive (or
    /// non-finite) speeds mean normal speed; extreme ones are clamped.
    pub fn from_speed(speed: f32) -> Self {
        let length_scale = if speed > 0.0 && speed.is_finite() {
            (1.0 / speed).clamp(MIN_LENGTH_SCALE, MAX_LENGTH_SCALE)
        } else {
            1.0
        };
        Self { length_scale }
    }
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self { length_scale: 1.0 }
    }
}

/// Contract for text-to-speech backends.
///
/// Implementations must be callable from many workers at once; any internal
/// serialisation is their own business.
pub trait Synthesizer: Send + Sync + 'static {
    /// Rate the backend renders at by default (Hz). Individual blocks carry
    /// their own rate and may deviate.
    fn native_rate(&self) -> u32;

    /// Start rendering `text`. Blocks are produced on demand as the returned
    /// iterator is pulled; dropping it stops production.
    fn synthesize(&self, text: &str, params: &SynthesisParams) -> Result<BlockStream>;
}

/// A loaded voice.
#[derive(Clone)]
pub struct Voice {
    pub id: String,
    pub native_rate: u32,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Voice {
    pub fn new(id: impl Into<String>, synthesizer: Arc<dyn Synthesizer>) -> Self {
        let native_rate = synthesizer.native_rate();
        Self {
            id: id.into(),
            native_rate,
            synthesizer,
        }
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("native_rate", &self.native_rate)
            .finish_non_exhaustive()
    }
}

/// Immutable set of loaded voices, sorted by id. Never empty.
#[derive(Debug, Clone)]
pub struct VoiceRegistry {
    voices: Vec<Voice>,
}

impl VoiceRegistry {
    /// Build a registry. Duplicate ids keep the first occurrence.
    ///
    /// # Errors
    /// `WhatsError::NoVoicesLoaded` when `voices` is empty.
    pub fn new(voices: impl IntoIterator<Item = Voice>) -> Result<Self> {
        let mut sorted: Vec<Voice> = Vec::new();
        for voice in voices {
            match sorted.binary_search_by(|v| v.id.as_str().cmp(voice.id.as_str())) {
                Ok(_) => warn!(voice = %voice.id, "duplicate voice id ignored"),
                Err(pos) => sorted.insert(pos, voice),
            }
        }
        if sorted.is_empty() {
            return Err(WhatsError::NoVoicesLoaded("registry is empty".into()));
        }
        Ok(Self { voices: sorted })
    }

    pub fn get(&self, id: &str) -> Option<&Voice> {
        self.voices
            .binary_search_by(|v| v.id.as_str().cmp(id))
            .ok()
            .map(|idx| &self.voices[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Lexicographically first voice.
    pub fn first(&self) -> &Voice {
        &self.voices[0]
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.voices.iter().map(|v| v.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

/// Language tag → preferred voice id, plus a designated default voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct LanguageVoiceMap {
    pub voices: HashMap<String, String>,
    pub default_voice: String,
}

impl Default for LanguageVoiceMap {
    fn default() -> Self {
        let voices = [
            ("en", "en_US-lessac-medium"),
            ("pt-BR", "pt_BR-faber-medium"),
            ("pt", "pt_BR-faber-medium"),
            ("es", "es_MX-ald-medium"),
        ]
        .into_iter()
        .map(|(lang, voice)| (lang.to_string(), voice.to_string()))
        .collect();

        Self {
            voices,
            default_voice: "en_US-lessac-medium".into(),
        }
    }
}

impl LanguageVoiceMap {
    pub fn voice_for(&self, language: &str) -> Option<&str> {
        self.voices.get(language).map(String::as_str)
    }
}

/// Maps a (requested voice, language) pair onto a loaded voice.
#[derive(Debug, Clone)]
pub struct VoiceResolver {
    registry: Arc<VoiceRegistry>,
    map: LanguageVoiceMap,
}

impl VoiceResolver {
    pub fn new(registry: Arc<VoiceRegistry>, map: LanguageVoiceMap) -> Self {
        Self { registry, map }
    }

    pub fn registry(&self) -> &VoiceRegistry {
        &self.registry
    }

    /// Resolution order, first match wins:
    /// 1. an explicitly requested, registered voice;
    /// 2. the language's mapped voice, if registered;
    /// 3. the default voice, if registered;
    /// 4. the lexicographically first registered voice.
    pub fn resolve(&self, requested: &str, language: &str) -> &Voice {
        if requested != DEFAULT_VOICE_SENTINEL {
            if let Some(voice) = self.registry.get(requested) {
                return voice;
            }
            if !requested.is_empty() {
                debug!(requested, "requested voice not loaded, falling back");
            }
        }

        if let Some(voice) = self
            .map
            .voice_for(language)
            .and_then(|id| self.registry.get(id))
        {
            return voice;
        }

        if let Some(voice) = self.registry.get(&self.map.default_voice) {
            return voice;
        }

        let first = self.registry.first();
        debug!(voice = %first.id, language, "no mapped or default voice loaded, using first");
        first
    }
}
