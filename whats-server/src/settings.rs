//! Server settings: JSON file, then environment overrides, then clamping.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use whats_core::engine::EngineConfig;
use whats_core::{LanguageCodeMap, LanguageVoiceMap};

/// Environment variable naming an optional settings file.
pub const SETTINGS_PATH_ENV: &str = "WHATS_SETTINGS_PATH";

/// Bounds on one request line. 16 MiB holds several minutes of base64 audio.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;
const MIN_REQUEST_BYTES: usize = 1024;
const MAX_REQUEST_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ServerSettings {
    pub listen_addr: String,
    pub num_workers: usize,
    pub models_dir: PathBuf,
    /// Recognizer model size; informational for the stub backend.
    pub recognizer_model: String,
    pub device: String,
    pub translator_enabled: bool,
    pub translate_timeout_ms: u64,
    /// Longest accepted request line, newline excluded.
    pub max_request_bytes: usize,
    pub voice_map: LanguageVoiceMap,
    pub language_codes: LanguageCodeMap,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:50051".into(),
            num_workers: 2,
            models_dir: PathBuf::from("/app/models"),
            recognizer_model: "base".into(),
            device: "cpu".into(),
            translator_enabled: true,
            translate_timeout_ms: 250,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            voice_map: LanguageVoiceMap::default(),
            language_codes: LanguageCodeMap::default(),
        }
    }
}

impl ServerSettings {
    pub fn normalize(&mut self) {
        self.num_workers = self.num_workers.clamp(1, 64);
        self.translate_timeout_ms = self.translate_timeout_ms.clamp(1, 60_000);
        self.max_request_bytes = self
            .max_request_bytes
            .clamp(MIN_REQUEST_BYTES, MAX_REQUEST_BYTES);
        self.listen_addr = self.listen_addr.trim().to_string();
        if self.listen_addr.is_empty() {
            self.listen_addr = Self::default().listen_addr;
        }
        self.device = normalize_device(&self.device);
        if self.recognizer_model.trim().is_empty() {
            self.recognizer_model = Self::default().recognizer_model;
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Unparseable values are logged and ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("WHATS_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(port) = lookup("GRPC_PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => self.listen_addr = with_port(&self.listen_addr, port),
                Err(_) => warn!(value = %port, "ignoring invalid GRPC_PORT"),
            }
        }
        if let Some(raw) = lookup("NUM_WORKERS") {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.num_workers = n,
                Err(_) => warn!(value = %raw, "ignoring invalid NUM_WORKERS"),
            }
        }
        if let Some(dir) = lookup("TTS_MODELS_DIR") {
            self.models_dir = PathBuf::from(dir);
        }
        if let Some(model) = lookup("WHISPER_MODEL_SIZE") {
            self.recognizer_model = model;
        }
        if let Some(device) = lookup("WHATS_DEVICE") {
            self.device = device;
        }
        if let Some(raw) = lookup("WHATS_TRANSLATOR") {
            match parse_flag(&raw) {
                Some(enabled) => self.translator_enabled = enabled,
                None => warn!(value = %raw, "ignoring invalid WHATS_TRANSLATOR"),
            }
        }
        if let Some(raw) = lookup("WHATS_TRANSLATE_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.translate_timeout_ms = ms,
                Err(_) => warn!(value = %raw, "ignoring invalid WHATS_TRANSLATE_TIMEOUT_MS"),
            }
        }
        if let Some(raw) = lookup("WHATS_MAX_REQUEST_BYTES") {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.max_request_bytes = n,
                Err(_) => warn!(value = %raw, "ignoring invalid WHATS_MAX_REQUEST_BYTES"),
            }
        }
    }

    pub fn translate_timeout(&self) -> Duration {
        Duration::from_millis(self.translate_timeout_ms)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            translate_timeout: self.translate_timeout(),
            language_codes: self.language_codes.clone(),
            voice_map: self.voice_map.clone(),
        }
    }
}

fn normalize_device(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "cuda" | "gpu" => "cuda".into(),
        "auto" => "auto".into(),
        _ => "cpu".into(),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Replace the port of a `host:port` address, keeping the host.
fn with_port(addr: &str, port: u16) -> String {
    let host = match addr.rsplit_once(':') {
        Some((host, _)) if !host.is_empty() => host,
        _ => "0.0.0.0",
    };
    format!("{host}:{port}")
}

/// Read settings from `path`. A missing or malformed file yields defaults.
pub fn load_settings(path: &Path) -> ServerSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<ServerSettings>(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), "malformed settings file, using defaults: {e}");
            ServerSettings::default()
        }),
        Err(_) => ServerSettings::default(),
    };
    settings.normalize();
    settings
}

/// Defaults, then the optional `WHATS_SETTINGS_PATH` file, then environment
/// overrides, then normalisation.
pub fn resolve_settings() -> ServerSettings {
    let mut settings = match std::env::var_os(SETTINGS_PATH_ENV) {
        Some(path) => load_settings(Path::new(&path)),
        None => ServerSettings::default(),
    };
    settings.apply_env_overrides();
    settings.normalize();
    settings
}
