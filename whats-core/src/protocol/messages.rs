//! Request and response messages.

use serde::{Deserialize, Serialize};

use crate::buffering::AudioChunk;
use crate::engine::{
    DiagnosticsSnapshot, SynthesisRequest, TranscriptionRequest, TranscriptionResult,
};
use crate::error::{Result, WhatsError};
use crate::inference::{Task, TranscriptSegment};
use crate::protocol::b64;
use crate::voice::DEFAULT_VOICE_SENTINEL;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Messages sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Transcribe(TranscribeRequest),
    Synthesize(SynthesizeRequest),
    Status,
}

impl Request {
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscribeRequest {
    /// s16le mono PCM, base64.
    #[serde(with = "b64")]
    pub audio: Vec<u8>,
    /// Must be 16000; a missing value is rejected like any other rate.
    pub sample_rate: u32,
    pub language_hint: Option<String>,
    /// `"transcribe"` (default) or `"translate"`.
    pub task: String,
    pub target_language: Option<String>,
    pub session_id: String,
    pub action_id: String,
}

impl TranscribeRequest {
    /// # Errors
    /// `WhatsError::Protocol` for an unknown task name.
    pub fn to_engine(&self) -> Result<TranscriptionRequest> {
        let task = Task::parse(&self.task)
            .ok_or_else(|| WhatsError::Protocol(format!("unknown task '{}'", self.task)))?;
        Ok(TranscriptionRequest {
            audio: self.audio.clone(),
            sample_rate: self.sample_rate,
            language_hint: self.language_hint.clone(),
            task,
            target_language: self.target_language.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthesizeRequest {
    pub text: String,
    /// Voice id or `"default"`.
    pub voice: String,
    pub speed: f32,
    pub language: String,
    pub session_id: String,
    pub action_id: String,
}

impl Default for SynthesizeRequest {
    fn default() -> Self {
        Self {
            text: String::new(),
            voice: DEFAULT_VOICE_SENTINEL.to_string(),
            speed: 1.0,
            language: String::new(),
            session_id: String::new(),
            action_id: String::new(),
        }
    }
}

impl SynthesizeRequest {
    pub fn to_engine(&self) -> SynthesisRequest {
        let voice = if self.voice.trim().is_empty() {
            DEFAULT_VOICE_SENTINEL.to_string()
        } else {
            self.voice.clone()
        };
        SynthesisRequest {
            text: self.text.clone(),
            voice,
            speed: self.speed,
            language: self.language.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Transcription(TranscriptionReply),
    AudioChunk(ChunkFrame),
    Status(StatusReply),
    Error { message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Flat recognition reply. Translation fields are empty when translation was
/// not requested or was skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptionReply {
    pub text: String,
    pub language: String,
    pub segments: Vec<TranscriptSegment>,
    pub inference_duration_ms: u64,
    pub translated_text: String,
    pub target_language: String,
    pub translate_duration_ms: u64,
    pub translation_fallback: bool,
    pub session_id: String,
    pub action_id: String,
}

impl TranscriptionReply {
    pub fn new(result: TranscriptionResult, session_id: &str, action_id: &str) -> Self {
        let mut reply = Self {
            text: result.text,
            language: result.language,
            segments: result.segments,
            inference_duration_ms: result.inference_duration_ms,
            session_id: session_id.to_string(),
            action_id: action_id.to_string(),
            ..Default::default()
        };
        if let Some(tr) = result.translation {
            reply.translated_text = tr.translated_text;
            reply.target_language = tr.target_lang;
            reply.translate_duration_ms = tr.duration_ms;
            reply.translation_fallback = tr.fallback_used;
        }
        reply
    }
}

/// One streamed chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkFrame {
    #[serde(with = "b64")]
    pub data: Vec<u8>,
    pub sequence: u64,
    pub duration_ms: u32,
    pub is_final: bool,
    pub session_id: String,
    pub action_id: String,
}

impl ChunkFrame {
    pub fn new(chunk: AudioChunk, session_id: &str, action_id: &str) -> Self {
        Self {
            data: chunk.data,
            sequence: chunk.sequence,
            duration_ms: chunk.duration_ms,
            is_final: chunk.is_final,
            session_id: session_id.to_string(),
            action_id: action_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusReply {
    /// Loaded voice ids, sorted.
    pub voices: Vec<String>,
    pub translator: bool,
    pub diagnostics: DiagnosticsSnapshot,
}
