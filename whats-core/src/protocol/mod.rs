//! Wire messages for the JSON-lines transport.
//!
//! Every message is one JSON object on its own line, tagged by `"type"`.
//! Binary audio travels as standard base64.
//!
//! | Request | Replies |
//! |---------|---------|
//! | `transcribe` | one `transcription` |
//! | `synthesize` | `audio_chunk` frames, the last with `isFinal: true` |
//! | `status` | one `status` |
//!
//! Any failure is answered with a single `error`.

pub mod messages;

pub use messages::{
    ChunkFrame, Request, Response, StatusReply, SynthesizeRequest, TranscribeRequest,
    TranscriptionReply,
};

/// Serde adapter storing `Vec<u8>` as a base64 string.
pub(crate) mod b64 {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}
