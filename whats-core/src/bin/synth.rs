//! Offline synthesis: run the streaming pipeline and write the chunk stream
//! to a 16 kHz mono WAV file.
//!
//! ```text
//! whats-synth --text "Olá, tudo bem?" --language pt --output out.wav [--models /app/models]
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use whats_core::audio::{pcm_to_samples, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE};
use whats_core::engine::{StreamingSynthesisPipeline, SynthesisRequest};
use whats_core::voice::{
    load_voice_dir, LanguageVoiceMap, ToneVoice, ToneVoiceLoader, Voice, VoiceRegistry,
    VoiceResolver, DEFAULT_VOICE_SENTINEL,
};

#[derive(Debug)]
struct Args {
    text: String,
    voice: String,
    language: String,
    speed: f32,
    models_dir: Option<PathBuf>,
    output: PathBuf,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut text: Option<String> = None;
    let mut voice = DEFAULT_VOICE_SENTINEL.to_string();
    let mut language = String::from("en");
    let mut speed = 1.0f32;
    let mut models_dir: Option<PathBuf> = None;
    let mut output = PathBuf::from("out.wav");

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| {
            it.next()
                .with_context(|| format!("missing value for {name}"))
        };
        match arg.as_str() {
            "--text" => text = Some(value("--text")?),
            "--voice" => voice = value("--voice")?,
            "--language" => language = value("--language")?,
            "--speed" => {
                speed = value("--speed")?
                    .parse()
                    .context("invalid value for --speed")?
            }
            "--models" => models_dir = Some(PathBuf::from(value("--models")?)),
            "--output" => output = PathBuf::from(value("--output")?),
            "--help" | "-h" => {
                println!(
                    "Usage: whats-synth --text <text> [--voice <id>] [--language <tag>] \\
  [--speed <x>] [--models <dir>] [--output <file.wav>]"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    let Some(text) = text else {
        bail!("--text is required");
    };
    Ok(Args {
        text,
        voice,
        language,
        speed,
        models_dir,
        output,
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("whats_core=info")),
        )
        .init();

    let args = parse_args()?;

    let registry = match &args.models_dir {
        Some(dir) => load_voice_dir(dir, &ToneVoiceLoader)
            .with_context(|| format!("loading voices from {}", dir.display()))?,
        None => VoiceRegistry::new([Voice::new("tone", Arc::new(ToneVoice::new(22_050)))])?,
    };
    let resolver = VoiceResolver::new(Arc::new(registry), LanguageVoiceMap::default());

    let request = SynthesisRequest {
        text: args.text,
        voice: args.voice,
        speed: args.speed,
        language: args.language,
    };

    let spec = hound::WavSpec {
        channels: CANONICAL_CHANNELS,
        sample_rate: CANONICAL_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&args.output, spec)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let start = Instant::now();
    let mut stream = StreamingSynthesisPipeline::new(&resolver).start(&request)?;
    let voice = stream.voice_id().unwrap_or("-").to_string();
    let mut first_chunk_ms = None;
    for chunk in stream.by_ref() {
        let chunk = chunk?;
        first_chunk_ms.get_or_insert_with(|| start.elapsed().as_millis() as u64);
        for sample in pcm_to_samples(&chunk.data) {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;

    info!(
        voice = %voice,
        chunks = stream.chunks_emitted(),
        first_chunk_ms = first_chunk_ms.unwrap_or(0),
        total_ms = start.elapsed().as_millis() as u64,
        output = %args.output.display(),
        "synthesis written"
    );
    Ok(())
}
