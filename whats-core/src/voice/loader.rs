//! Startup-time voice discovery.
//!
//! A voice on disk is a `<name>.onnx` model next to a `<name>.onnx.json`
//! config. The config's `audio.sample_rate` is the voice's native rate. The
//! `VoiceLoader` turns each discovered pair into a live `Synthesizer`.
//!
//! Loading happens once, before any request is served. A directory that
//! yields no usable voice is fatal.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Result, WhatsError};
use crate::voice::{Synthesizer, ToneVoice, Voice, VoiceRegistry};

/// Native rate assumed when a voice config omits it.
pub const DEFAULT_NATIVE_RATE: u32 = 22_050;

/// Parsed `<name>.onnx.json`. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub audio: VoiceAudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceAudioConfig {
    pub sample_rate: u32,
}

impl Default for VoiceAudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_NATIVE_RATE,
        }
    }
}

impl VoiceConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| WhatsError::VoiceConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Builds a synthesizer for one discovered voice.
pub trait VoiceLoader {
    fn load(&self, id: &str, model_path: &Path, config: &VoiceConfig)
        -> Result<Arc<dyn Synthesizer>>;
}

/// Loader backing every discovered voice with a `ToneVoice` at the
/// configured native rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToneVoiceLoader;

impl VoiceLoader for ToneVoiceLoader {
    fn load(
        &self,
        _id: &str,
        _model_path: &Path,
        config: &VoiceConfig,
    ) -> Result<Arc<dyn Synthesizer>> {
        Ok(Arc::new(ToneVoice::new(config.audio.sample_rate)))
    }
}

/// A model/config pair found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredVoice {
    pub id: String,
    pub model_path: PathBuf,
    pub config_path: PathBuf,
}

/// List voices in `dir`, sorted by id. Models without a config are skipped.
pub fn scan_voice_dir(dir: &Path) -> Result<Vec<DiscoveredVoice>> {
    if !dir.is_dir() {
        return Err(WhatsError::ModelNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("onnx") {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let mut config_path = path.clone().into_os_string();
        config_path.push(".json");
        let config_path = PathBuf::from(config_path);
        if !config_path.is_file() {
            warn!(model = ?path, "voice model has no .onnx.json config, skipping");
            continue;
        }
        found.push(DiscoveredVoice {
            id: id.to_string(),
            model_path: path.clone(),
            config_path,
        });
    }
    found.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(found)
}

/// Discover and load every voice in `dir` into a registry.
///
/// # Errors
/// - `WhatsError::ModelNotFound` if `dir` does not exist.
/// - `WhatsError::NoVoicesLoaded` if nothing loadable was found.
pub fn load_voice_dir(dir: &Path, loader: &dyn VoiceLoader) -> Result<VoiceRegistry> {
    let mut voices = Vec::new();

    for discovered in scan_voice_dir(dir)? {
        let start = Instant::now();
        let config = match VoiceConfig::from_path(&discovered.config_path) {
            Ok(c) => c,
            Err(e) => {
                warn!(voice = %discovered.id, "skipping voice: {e}");
                continue;
            }
        };
        match loader.load(&discovered.id, &discovered.model_path, &config) {
            Ok(synth) => {
                info!(
                    voice = %discovered.id,
                    native_rate = synth.native_rate(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "voice loaded"
                );
                voices.push(Voice::new(discovered.id, synth));
            }
            Err(e) => warn!(voice = %discovered.id, "voice failed to load: {e}"),
        }
    }

    if voices.is_empty() {
        return Err(WhatsError::NoVoicesLoaded(format!(
            "no usable voice in {}",
            dir.display()
        )));
    }
    VoiceRegistry::new(voices)
}
