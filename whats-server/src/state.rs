//! Shared server state.
//!
//! One `ServerState` is built at startup and handed to every connection task
//! behind an `Arc`.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use serde::Serialize;
use tokio::sync::Semaphore;
use whats_core::protocol::StatusReply;
use whats_core::SpeechEngine;

use crate::settings::ServerSettings;

/// Bounded queue between a synthesis worker and its connection writer.
pub const CHUNK_CHANNEL_CAP: usize = 32;

pub struct ServerState {
    /// Loaded models; read-only after startup.
    pub engine: Arc<SpeechEngine>,
    /// One permit per worker. Every request holds a permit while it runs.
    pub workers: Arc<Semaphore>,
    pub num_workers: usize,
    /// Longest accepted request line.
    pub max_request_bytes: usize,
    /// Connections currently open.
    pub connections_open: AtomicUsize,
    /// Connections accepted since startup.
    pub connections_total: AtomicUsize,
    /// Requests answered without an error frame.
    pub requests_ok: AtomicUsize,
    /// Requests answered with an error frame.
    pub requests_failed: AtomicUsize,
    /// Synthesis streams cut short because the client went away.
    pub streams_abandoned: AtomicUsize,
}

impl ServerState {
    pub fn new(engine: Arc<SpeechEngine>, settings: &ServerSettings) -> Self {
        Self {
            engine,
            workers: Arc::new(Semaphore::new(settings.num_workers)),
            num_workers: settings.num_workers,
            max_request_bytes: settings.max_request_bytes,
            connections_open: AtomicUsize::new(0),
            connections_total: AtomicUsize::new(0),
            requests_ok: AtomicUsize::new(0),
            requests_failed: AtomicUsize::new(0),
            streams_abandoned: AtomicUsize::new(0),
        }
    }

    pub fn status_reply(&self) -> StatusReply {
        StatusReply {
            voices: self.engine.voices().ids().map(str::to_string).collect(),
            translator: self.engine.has_translator(),
            diagnostics: self.engine.diagnostics_snapshot(),
        }
    }

    pub fn diagnostics_snapshot(&self) -> ServerDiagnostics {
        ServerDiagnostics {
            connections_open: self.connections_open.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            requests_ok: self.requests_ok.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            streams_abandoned: self.streams_abandoned.load(Ordering::Relaxed),
            workers: self.num_workers,
            idle_workers: self.workers.available_permits(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDiagnostics {
    pub connections_open: usize,
    pub connections_total: usize,
    pub requests_ok: usize,
    pub requests_failed: usize,
    pub streams_abandoned: usize,
    pub workers: usize,
    pub idle_workers: usize,
}
