use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use whats_core::audio::{samples_to_pcm, AudioBlock};
use whats_core::buffering::CHUNK_SIZE_BYTES;
use whats_core::engine::{EngineConfig, SpeechEngine, SynthesisRequest, TranscriptionRequest};
use whats_core::inference::{Recognition, RecognizeOptions, StubRecognizer};
use whats_core::protocol::{ChunkFrame, Response, TranscriptionReply};
use whats_core::voice::{BlockStream, SynthesisParams, Voice, VoiceRegistry};
use whats_core::{
    AudioChunk, RecognizerHandle, SpeechRecognizer, Synthesizer, TranscriptSegment, Translator,
    WhatsError,
};

/// Emits the given blocks verbatim, whatever the text.
struct FixedBlocks {
    rate: u32,
    blocks: Vec<Vec<i16>>,
}

impl Synthesizer for FixedBlocks {
    fn native_rate(&self) -> u32 {
        self.rate
    }

    fn synthesize(
        &self,
        _text: &str,
        _params: &SynthesisParams,
    ) -> whats_core::Result<BlockStream> {
        let rate = self.rate;
        let blocks = self.blocks.clone();
        Ok(Box::new(
            blocks
                .into_iter()
                .map(move |b| Ok(AudioBlock::from_samples(&b, rate))),
        ))
    }
}

/// Counts recognizer calls and returns one segment per call.
struct CountingRecognizer {
    calls: Arc<AtomicUsize>,
}

impl SpeechRecognizer for CountingRecognizer {
    fn warm_up(&mut self) -> whats_core::Result<()> {
        Ok(())
    }

    fn recognize(
        &mut self,
        audio: &[f32],
        options: &RecognizeOptions,
    ) -> whats_core::Result<Recognition> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Recognition {
            segments: vec![TranscriptSegment {
                text: format!(" {} samples ", audio.len()),
                start_time: 0.0,
                end_time: audio.len() as f64 / 16_000.0,
                confidence: -0.3,
            }],
            language: options.language.clone().unwrap_or_else(|| "en".into()),
        })
    }
}

struct FailingTranslator;

impl Translator for FailingTranslator {
    fn translate(&self, _text: &str, _src: &str, _tgt: &str) -> whats_core::Result<String> {
        Err(WhatsError::Translation("model unavailable".into()))
    }
}

fn voices(synth: FixedBlocks) -> Arc<VoiceRegistry> {
    Arc::new(VoiceRegistry::new([Voice::new("en_US-lessac-medium", Arc::new(synth))]).unwrap())
}

fn stub_engine() -> SpeechEngine {
    SpeechEngine::new(
        EngineConfig::default(),
        RecognizerHandle::new(StubRecognizer::new()),
        voices(FixedBlocks {
            rate: 16_000,
            blocks: vec![],
        }),
        None,
    )
}

#[test]
fn one_second_of_silence_yields_a_complete_result() {
    let engine = stub_engine();
    let result = engine
        .transcribe(&TranscriptionRequest {
            audio: vec![0u8; 32_000],
            sample_rate: 16_000,
            ..Default::default()
        })
        .expect("silence transcribes");

    assert_eq!(result.text, "");
    assert_eq!(result.language, "en");
    assert!(result.segments.is_empty());

    let json = serde_json::to_value(&result).unwrap();
    for field in ["text", "language", "segments", "inferenceDurationMs"] {
        assert!(!json[field].is_null(), "{field} must be present");
    }
}

#[test]
fn non_canonical_rate_never_reaches_the_recognizer() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = SpeechEngine::new(
        EngineConfig::default(),
        RecognizerHandle::new(CountingRecognizer {
            calls: calls.clone(),
        }),
        voices(FixedBlocks {
            rate: 16_000,
            blocks: vec![],
        }),
        None,
    );

    let err = engine
        .transcribe(&TranscriptionRequest {
            audio: vec![0u8; 16_000],
            sample_rate: 8_000,
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, WhatsError::UnsupportedSampleRate { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn translator_failure_still_returns_the_transcript() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = SpeechEngine::new(
        EngineConfig::default(),
        RecognizerHandle::new(CountingRecognizer {
            calls: calls.clone(),
        }),
        voices(FixedBlocks {
            rate: 16_000,
            blocks: vec![],
        }),
        Some(Arc::new(FailingTranslator)),
    );

    let result = engine
        .transcribe(&TranscriptionRequest {
            audio: samples_to_pcm(&[100; 1600]),
            sample_rate: 16_000,
            language_hint: Some("en".into()),
            target_language: Some("es".into()),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(result.text, "1600 samples");
    let tr = result.translation.as_ref().expect("translation requested");
    assert!(tr.fallback_used);
    assert_eq!(tr.translated_text, "1600 samples");

    let reply = TranscriptionReply::new(result, "session", "action");
    assert!(reply.translation_fallback);
    assert_eq!(reply.target_language, "es");
    assert_eq!(engine.diagnostics_snapshot().translation_fallbacks, 1);
}

#[test]
fn whitespace_text_synthesizes_nothing() {
    let engine = stub_engine();
    let stream = engine
        .synthesize(&SynthesisRequest {
            text: "   \n\t".into(),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(stream.count(), 0);
}

#[test]
fn resampled_stream_reassembles_with_silence_padding() {
    // 22050 Hz blocks of assorted sizes.
    let sizes = [1usize, 4410, 11025, 2205, 7];
    let blocks: Vec<Vec<i16>> = sizes
        .iter()
        .map(|&n| (0..n).map(|i| ((i % 200) as i16 - 100) * 50).collect())
        .collect();
    let engine = SpeechEngine::new(
        EngineConfig::default(),
        RecognizerHandle::new(StubRecognizer::new()),
        voices(FixedBlocks {
            rate: 22_050,
            blocks,
        }),
        None,
    );

    let chunks: Vec<AudioChunk> = engine
        .synthesize(&SynthesisRequest {
            text: "Hello there.".into(),
            language: "fr".into(),
            ..Default::default()
        })
        .unwrap()
        .with_final_marker()
        .collect::<whats_core::Result<_>>()
        .unwrap();

    // round(n * 16000 / 22050) per block: 1, 3200, 8000, 1600, 5 samples.
    let expected_bytes: usize = (1 + 3200 + 8000 + 1600 + 5) * 2;
    let data = &chunks[..chunks.len() - 1];
    assert_eq!(data.len(), expected_bytes.div_ceil(CHUNK_SIZE_BYTES));
    assert!(data.iter().all(|c| c.data.len() == CHUNK_SIZE_BYTES));
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.sequence, i as u64);
    }

    let last = chunks.last().unwrap();
    assert!(last.is_final);
    assert!(last.data.is_empty());

    let tail = &data.last().unwrap().data[expected_bytes % CHUNK_SIZE_BYTES..];
    assert!(tail.iter().all(|&b| b == 0));
}

#[test]
fn chunk_frames_serialize_for_the_wire() {
    let engine = stub_engine();
    let frames: Vec<String> = engine
        .synthesize(&SynthesisRequest::default())
        .unwrap()
        .with_final_marker()
        .map(|c| Response::AudioChunk(ChunkFrame::new(c.unwrap(), "s", "a")))
        .map(|r| r.to_json().unwrap())
        .collect();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].contains(r#""isFinal":true"#));
}

#[test]
fn concurrent_streams_keep_independent_sequences() {
    let engine = Arc::new(SpeechEngine::new(
        EngineConfig::default(),
        RecognizerHandle::new(StubRecognizer::new()),
        voices(FixedBlocks {
            rate: 16_000,
            blocks: vec![vec![7; 1000]; 9],
        }),
        None,
    ));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut seqs = Vec::new();
                for chunk in engine
                    .synthesize(&SynthesisRequest {
                        text: "hi".into(),
                        ..Default::default()
                    })
                    .unwrap()
                {
                    seqs.push(chunk.unwrap().sequence);
                    thread::sleep(Duration::from_millis(1));
                }
                seqs
            })
        })
        .collect();

    for h in handles {
        // 9000 samples = 18000 bytes -> 6 chunks
        assert_eq!(h.join().unwrap(), (0..6).collect::<Vec<u64>>());
    }
    assert_eq!(engine.diagnostics_snapshot().chunks_emitted, 24);
}
