//! Typed audio chunk handed from the synthesis pipeline to the transport.

use crate::audio::canonical_duration_ms;

/// Canonical chunk size: 1600 samples = 100 ms of 16 kHz s16le mono.
pub const CHUNK_SIZE_BYTES: usize = 3200;

/// Duration of one full canonical chunk.
pub const CHUNK_DURATION_MS: u32 = 100;

/// One unit of streamed audio.
///
/// Data chunks carry exactly `CHUNK_SIZE_BYTES`. The terminal marker carries
/// no bytes and has `is_final` set, so a consumer can tell "stream complete"
/// apart from any data chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Canonical s16le PCM.
    pub data: Vec<u8>,
    /// Position in the stream, starting at zero with no gaps.
    pub sequence: u64,
    /// Audio duration carried by `data`.
    pub duration_ms: u32,
    /// `true` only for the zero-length terminal marker.
    pub is_final: bool,
}

impl AudioChunk {
    pub fn data(data: Vec<u8>, sequence: u64) -> Self {
        let duration_ms = canonical_duration_ms(data.len());
        Self {
            data,
            sequence,
            duration_ms,
            is_final: false,
        }
    }

    /// Zero-length end-of-stream marker.
    pub fn final_marker(sequence: u64) -> Self {
        Self {
            data: Vec::new(),
            sequence,
            duration_ms: 0,
            is_final: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_chunk_is_100ms() {
        let chunk = AudioChunk::data(vec![0; CHUNK_SIZE_BYTES], 3);
        assert_eq!(chunk.duration_ms, CHUNK_DURATION_MS);
        assert_eq!(chunk.sequence, 3);
        assert!(!chunk.is_final);
    }

    #[test]
    fn final_marker_is_empty_and_final() {
        let marker = AudioChunk::final_marker(12);
        assert!(marker.is_empty());
        assert!(marker.is_final);
        assert_eq!(marker.duration_ms, 0);
    }
}
