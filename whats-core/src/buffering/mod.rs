//! Re-slicing of a canonical byte stream into fixed-size chunks.
//!
//! Synthesizers hand back blocks of arbitrary length. `ChunkBuffer` turns
//! them into `CHUNK_SIZE_BYTES` slices, carrying whatever is left over to the
//! next block and padding the tail with silence when the stream ends.
//!
//! One `ChunkBuffer` belongs to exactly one stream; it is never shared.

pub mod chunk;

pub use chunk::{AudioChunk, CHUNK_DURATION_MS, CHUNK_SIZE_BYTES};

/// Residual-carrying chunker for a single stream.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    /// Always shorter than `CHUNK_SIZE_BYTES` between calls.
    residual: Vec<u8>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self {
            residual: Vec::with_capacity(CHUNK_SIZE_BYTES),
        }
    }

    /// Append `block` and return every full chunk now available, in order.
    pub fn push(&mut self, block: &[u8]) -> Vec<Vec<u8>> {
        self.residual.extend_from_slice(block);

        let mut chunks = Vec::with_capacity(self.residual.len() / CHUNK_SIZE_BYTES);
        let mut offset = 0;
        while self.residual.len() - offset >= CHUNK_SIZE_BYTES {
            chunks.push(self.residual[offset..offset + CHUNK_SIZE_BYTES].to_vec());
            offset += CHUNK_SIZE_BYTES;
        }
        self.residual.drain(..offset);

        chunks
    }

    /// Flush the residual as one silence-padded chunk, if there is any.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.residual.is_empty() {
            return None;
        }
        let mut last = std::mem::take(&mut self.residual);
        last.resize(CHUNK_SIZE_BYTES, 0);
        Some(last)
    }

    /// Bytes waiting for the next block.
    pub fn residual_len(&self) -> usize {
        self.residual.len()
    }
}
