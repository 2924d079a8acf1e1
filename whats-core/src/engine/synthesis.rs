//! Streaming synthesis: voice resolution, resampling and re-chunking.
//!
//! ```text
//! text ─► VoiceResolver ─► Synthesizer ─► AudioBlock (native rate)
//!                                              │  pulled one at a time
//!                                              ▼
//!                                        RateConverter ─► ChunkBuffer ─► AudioChunk (seq 0, 1, 2, ...)
//! ```
//!
//! `SynthesisStream` is a single-pass iterator. A block is only requested from
//! the synthesizer once every chunk cut from the previous block has been
//! handed out, so the utterance is never buffered whole. Dropping the stream
//! stops synthesis at the next block boundary.

use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info};

use crate::audio::resample::RateConverter;
use crate::buffering::{AudioChunk, ChunkBuffer};
use crate::engine::EngineDiagnostics;
use crate::error::Result;
use crate::voice::{BlockStream, SynthesisParams, VoiceResolver, DEFAULT_VOICE_SENTINEL};

/// One synthesis request, already decoded from the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    /// Explicit voice id, or `"default"`.
    pub voice: String,
    /// Speaking-rate multiplier; non-positive means normal speed.
    pub speed: f32,
    /// Language tag used for voice auto-selection.
    pub language: String,
}

impl Default for SynthesisRequest {
    fn default() -> Self {
        Self {
            text: String::new(),
            voice: DEFAULT_VOICE_SENTINEL.to_string(),
            speed: 1.0,
            language: String::new(),
        }
    }
}

/// Composes the resolver, the resampler and the chunker for one request.
pub struct StreamingSynthesisPipeline<'a> {
    resolver: &'a VoiceResolver,
    converter: RateConverter,
}

impl<'a> StreamingSynthesisPipeline<'a> {
    pub fn new(resolver: &'a VoiceResolver) -> Self {
        Self {
            resolver,
            converter: RateConverter::canonical(),
        }
    }

    /// Start a stream. Blank text yields an empty stream without touching
    /// any voice.
    ///
    /// # Errors
    /// Whatever the synthesizer returns when asked to start.
    pub fn start(&self, request: &SynthesisRequest) -> Result<SynthesisStream> {
        let text = request.text.trim();
        if text.is_empty() {
            debug!("blank synthesis text, empty stream");
            return Ok(SynthesisStream::empty());
        }

        let voice = self.resolver.resolve(&request.voice, &request.language);
        let params = SynthesisParams::from_speed(request.speed);
        info!(
            voice = %voice.id,
            native_rate = voice.native_rate,
            length_scale = params.length_scale,
            chars = text.len(),
            "synthesis started"
        );
        let blocks = voice.synthesizer.synthesize(text, &params)?;

        Ok(SynthesisStream {
            voice_id: Some(voice.id.clone()),
            blocks: Some(blocks),
            converter: self.converter,
            buffer: ChunkBuffer::new(),
            pending: VecDeque::new(),
            next_sequence: 0,
            final_marker: false,
            done: false,
            diagnostics: None,
        })
    }
}

/// Lazy sequence of canonical chunks for one utterance.
pub struct SynthesisStream {
    voice_id: Option<String>,
    /// `None` once the synthesizer is exhausted or failed.
    blocks: Option<BlockStream>,
    converter: RateConverter,
    buffer: ChunkBuffer,
    /// Full chunks cut from the latest block, not yet handed out.
    pending: VecDeque<Vec<u8>>,
    next_sequence: u64,
    /// Append a zero-length `is_final` chunk after the data.
    final_marker: bool,
    done: bool,
    diagnostics: Option<Arc<EngineDiagnostics>>,
}

impl SynthesisStream {
    /// A stream that produces no data chunks.
    pub fn empty() -> Self {
        Self {
            voice_id: None,
            blocks: None,
            converter: RateConverter::canonical(),
            buffer: ChunkBuffer::new(),
            pending: VecDeque::new(),
            next_sequence: 0,
            final_marker: false,
            done: false,
            diagnostics: None,
        }
    }

    /// Terminate the stream with a zero-length `is_final` chunk carrying the
    /// next sequence number. Not emitted after a synthesis error.
    pub fn with_final_marker(mut self) -> Self {
        self.final_marker = true;
        self
    }

    pub(crate) fn with_diagnostics(mut self, diagnostics: Arc<EngineDiagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Resolved voice, `None` for an empty stream.
    pub fn voice_id(&self) -> Option<&str> {
        self.voice_id.as_deref()
    }

    /// Data chunks handed out so far.
    pub fn chunks_emitted(&self) -> u64 {
        self.next_sequence
    }

    fn emit(&mut self, data: Vec<u8>) -> AudioChunk {
        let chunk = AudioChunk::data(data, self.next_sequence);
        self.next_sequence += 1;
        if let Some(d) = &self.diagnostics {
            d.chunks_emitted.fetch_add(1, Ordering::Relaxed);
        }
        chunk
    }
}

impl Iterator for SynthesisStream {
    type Item = Result<AudioChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(data) = self.pending.pop_front() {
                return Some(Ok(self.emit(data)));
            }
            if self.done {
                return None;
            }

            let Some(blocks) = self.blocks.as_mut() else {
                self.done = true;
                if self.final_marker {
                    debug!(chunks = self.next_sequence, "synthesis stream complete");
                    return Some(Ok(AudioChunk::final_marker(self.next_sequence)));
                }
                return None;
            };

            match blocks.next() {
                Some(Ok(block)) => {
                    let pcm = self.converter.process(&block);
                    self.pending.extend(self.buffer.push(&pcm));
                }
                Some(Err(e)) => {
                    self.blocks = None;
                    self.done = true;
                    self.pending.clear();
                    return Some(Err(e));
                }
                None => {
                    self.blocks = None;
                    self.pending.extend(self.buffer.finish());
                }
            }
        }
    }
}

impl FusedIterator for SynthesisStream {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioBlock, CANONICAL_SAMPLE_RATE};
    use crate::buffering::CHUNK_SIZE_BYTES;
    use crate::error::WhatsError;
    use crate::voice::{LanguageVoiceMap, Synthesizer, Voice, VoiceRegistry};
    use std::sync::atomic::AtomicUsize;

    /// Emits fixed-size constant blocks and counts how many were pulled.
    struct Blocks {
        rate: u32,
        sizes: Vec<usize>,
        pulled: Arc<AtomicUsize>,
        fail_at: Option<usize>,
    }

    impl Synthesizer for Blocks {
        fn native_rate(&self) -> u32 {
            self.rate
        }

        fn synthesize(&self, _text: &str, _params: &SynthesisParams) -> Result<BlockStream> {
            let rate = self.rate;
            let pulled = self.pulled.clone();
            let fail_at = self.fail_at;
            let iter = self.sizes.clone().into_iter().enumerate().map(move |(i, n)| {
                pulled.fetch_add(1, Ordering::SeqCst);
                if Some(i) == fail_at {
                    return Err(WhatsError::Synthesis("vocoder blew up".into()));
                }
                Ok(AudioBlock::from_samples(&vec![1000i16; n], rate))
            });
            Ok(Box::new(iter))
        }
    }

    fn resolver(
        rate: u32,
        sizes: Vec<usize>,
        fail_at: Option<usize>,
    ) -> (Arc<AtomicUsize>, VoiceResolver) {
        let pulled = Arc::new(AtomicUsize::new(0));
        let synth = Blocks {
            rate,
            sizes,
            pulled: pulled.clone(),
            fail_at,
        };
        let registry = VoiceRegistry::new([Voice::new("v", Arc::new(synth))]).unwrap();
        (
            pulled,
            VoiceResolver::new(Arc::new(registry), LanguageVoiceMap::default()),
        )
    }

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.into(),
            ..Default::default()
        }
    }

    #[test]
    fn blank_text_yields_nothing() {
        let (pulled, resolver) = resolver(CANONICAL_SAMPLE_RATE, vec![1600], None);
        let pipeline = StreamingSynthesisPipeline::new(&resolver);
        let stream = pipeline.start(&request("   ")).unwrap();
        assert!(stream.voice_id().is_none());
        assert_eq!(stream.count(), 0);
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn blank_text_with_marker_yields_only_marker() {
        let chunks: Vec<_> = SynthesisStream::empty()
            .with_final_marker()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(chunks, vec![AudioChunk::final_marker(0)]);
    }

    #[test]
    fn sequences_are_gapless_and_tail_is_padded() {
        // 1000 + 2500 samples = 7000 bytes -> 3 chunks, last one padded.
        let (_pulled, resolver) = resolver(CANONICAL_SAMPLE_RATE, vec![1000, 2500], None);
        let pipeline = StreamingSynthesisPipeline::new(&resolver);
        let chunks: Vec<AudioChunk> = pipeline
            .start(&request("hello"))
            .unwrap()
            .with_final_marker()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(chunks.len(), 4);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence, i as u64);
        }
        assert!(chunks[..3].iter().all(|c| c.data.len() == CHUNK_SIZE_BYTES && !c.is_final));
        assert!(chunks[2].data[600..].iter().all(|&b| b == 0));
        assert!(chunks[3].is_final && chunks[3].data.is_empty());
    }

    #[test]
    fn native_rate_is_converted_to_canonical() {
        // 22050 Hz for one second -> 16000 samples -> 10 full chunks.
        let (_pulled, resolver) = resolver(22_050, vec![22_050], None);
        let pipeline = StreamingSynthesisPipeline::new(&resolver);
        let chunks: Vec<_> = pipeline
            .start(&request("hello"))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(chunks.len(), 10);
    }

    #[test]
    fn blocks_are_pulled_lazily() {
        let (pulled, resolver) = resolver(CANONICAL_SAMPLE_RATE, vec![1600, 1600, 1600], None);
        let pipeline = StreamingSynthesisPipeline::new(&resolver);
        let mut stream = pipeline.start(&request("hello")).unwrap();
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
        stream.next().unwrap().unwrap();
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
        drop(stream);
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn synthesis_error_ends_stream_without_marker() {
        let (_pulled, resolver) = resolver(CANONICAL_SAMPLE_RATE, vec![1600, 800, 1600], Some(1));
        let pipeline = StreamingSynthesisPipeline::new(&resolver);
        let mut stream = pipeline.start(&request("hello")).unwrap().with_final_marker();
        assert!(stream.next().unwrap().is_ok());
        assert!(matches!(stream.next(), Some(Err(WhatsError::Synthesis(_)))));
        assert!(stream.next().is_none());
        assert_eq!(stream.chunks_emitted(), 1);
    }
}
