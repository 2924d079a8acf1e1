use thiserror::Error;

/// All errors produced by whats-core.
#[derive(Debug, Error)]
pub enum WhatsError {
    #[error("unsupported sample rate: expected {expected} Hz, got {actual} Hz")]
    UnsupportedSampleRate { expected: u32, actual: u32 },

    #[error("no voices loaded ({0})")]
    NoVoicesLoaded(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("invalid voice config {path}: {message}")]
    VoiceConfig {
        path: std::path::PathBuf,
        message: String,
    },

    #[error("inference error: {0}")]
    Inference(String),

    #[error("synthesis error: {0}")]
    Synthesis(String),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WhatsError>;
