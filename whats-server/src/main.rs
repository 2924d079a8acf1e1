//! Whats speech services host.
//!
//! ## Startup
//!
//! ```text
//! settings (defaults → WHATS_SETTINGS_PATH → env) ─► load voices ─► build engine
//!     ─► warm up (blocking pool) ─► bind ─► serve until Ctrl-C
//! ```
//!
//! Every model is loaded and warmed before the listener is bound. An empty or
//! missing voice directory aborts startup.

mod server;
mod settings;
mod state;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use whats_core::inference::StubRecognizer;
use whats_core::translate::EchoTranslator;
use whats_core::voice::{load_voice_dir, ToneVoiceLoader};
use whats_core::{RecognizerHandle, SpeechEngine, Translator};

use settings::resolve_settings;
use state::ServerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("whats_server=info,whats_core=info")
            }),
        )
        .init();

    let settings = resolve_settings();
    info!(
        listen_addr = %settings.listen_addr,
        num_workers = settings.num_workers,
        models_dir = %settings.models_dir.display(),
        recognizer_model = %settings.recognizer_model,
        device = %settings.device,
        translator = settings.translator_enabled,
        translate_timeout_ms = settings.translate_timeout_ms,
        "settings resolved"
    );

    // ── Models ────────────────────────────────────────────────────────────
    let start = Instant::now();
    let voices = load_voice_dir(&settings.models_dir, &ToneVoiceLoader).with_context(|| {
        format!(
            "refusing to start: no usable voices in {}",
            settings.models_dir.display()
        )
    })?;
    info!(
        voices = voices.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "voices loaded"
    );

    // Stub backends until neural engines are wired in.
    let recognizer = RecognizerHandle::new(StubRecognizer::new());
    let translator: Option<Arc<dyn Translator>> = if settings.translator_enabled {
        Some(Arc::new(EchoTranslator::new()))
    } else {
        None
    };

    let engine = Arc::new(SpeechEngine::new(
        settings.engine_config(),
        recognizer,
        Arc::new(voices),
        translator,
    ));

    let warm = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || warm.warm_up())
        .await
        .context("warm-up task panicked")?
        .context("model warm-up failed")?;

    // ── Serve ─────────────────────────────────────────────────────────────
    let listener = TcpListener::bind(&settings.listen_addr)
        .await
        .with_context(|| format!("binding {}", settings.listen_addr))?;
    info!(
        addr = %listener.local_addr()?,
        workers = settings.num_workers,
        "whats-server listening"
    );

    let state = Arc::new(ServerState::new(engine, &settings));
    server::serve_until(listener, Arc::clone(&state), async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    let diagnostics = state.diagnostics_snapshot();
    info!(
        diagnostics = %serde_json::to_string(&diagnostics)?,
        engine = %serde_json::to_string(&state.engine.diagnostics_snapshot())?,
        "whats-server stopped"
    );
    Ok(())
}
