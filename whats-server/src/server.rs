//! JSON-lines TCP transport.
//!
//! ## Flow
//!
//! ```text
//! connection task (async)                 worker (spawn_blocking, holds a permit)
//! ───────────────────────                 ───────────────────────────────────────
//! read line → Request
//!   status     → reply inline
//!   transcribe → acquire permit ────────► engine.transcribe() ──► one reply
//!   synthesize → acquire permit ────────► engine.synthesize()
//!                 rx.recv() ◄── mpsc(32) ◄── chunk frames, final marker last
//!                 write line
//! ```
//!
//! Requests on one connection are handled in order. A line longer than
//! `max_request_bytes` is skipped up to its newline and answered with an error
//! frame. When the client goes away
//! the writer fails, `rx` is dropped and the worker's next `blocking_send`
//! fails, which stops synthesis after the current block.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use whats_core::protocol::{
    ChunkFrame, Request, Response, SynthesizeRequest, TranscribeRequest, TranscriptionReply,
};

use crate::state::{ServerState, CHUNK_CHANNEL_CAP};

/// Accept connections until `shutdown` resolves.
pub async fn serve_until<F>(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested, no longer accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("accepting connection")?;
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer, Arc::clone(&state)).await {
                        debug!(%peer, "connection closed with error: {e:#}");
                    }
                    state.connections_open.fetch_sub(1, Ordering::Relaxed);
                });
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    state.connections_open.fetch_add(1, Ordering::Relaxed);
    state.connections_total.fetch_add(1, Ordering::Relaxed);
    debug!(%peer, "client connected");

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        let read = read_request_line(&mut reader, &mut buf, state.max_request_bytes)
            .await
            .context("reading request")?;
        match read {
            LineRead::Eof => break,
            LineRead::TooLong => {
                warn!(%peer, limit = state.max_request_bytes, "request line too long");
                let message = format!("request line exceeds {} bytes", state.max_request_bytes);
                write_line(&mut writer, &Response::error(message)).await?;
                state.requests_failed.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            LineRead::Line => {}
        }

        let Ok(line) = std::str::from_utf8(&buf) else {
            warn!(%peer, "request line is not UTF-8");
            write_line(&mut writer, &Response::error("malformed request: not UTF-8")).await?;
            state.requests_failed.fetch_add(1, Ordering::Relaxed);
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let ok = match Request::from_json(line) {
            Ok(Request::Status) => {
                write_line(&mut writer, &Response::Status(state.status_reply())).await?;
                true
            }
            Ok(Request::Transcribe(req)) => transcribe(&state, req, &mut writer).await?,
            Ok(Request::Synthesize(req)) => synthesize(&state, req, &mut writer).await?,
            Err(e) => {
                warn!(%peer, "malformed request: {e}");
                write_line(&mut writer, &Response::error(format!("malformed request: {e}")))
                    .await?;
                false
            }
        };

        let counter = if ok {
            &state.requests_ok
        } else {
            &state.requests_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    debug!(%peer, "client disconnected");
    Ok(())
}

/// Returns `Ok(false)` when an error frame was sent instead of a result.
async fn transcribe<W>(
    state: &ServerState,
    req: TranscribeRequest,
    writer: &mut W,
) -> anyhow::Result<bool>
where
    W: AsyncWrite + Unpin,
{
    info!(
        session = %req.session_id,
        action = %req.action_id,
        bytes = req.audio.len(),
        sample_rate = req.sample_rate,
        language = req.language_hint.as_deref().unwrap_or(""),
        task = %req.task,
        target = req.target_language.as_deref().unwrap_or(""),
        "transcribe request"
    );

    let engine_req = match req.to_engine() {
        Ok(r) => r,
        Err(e) => {
            write_line(writer, &Response::error(e.to_string())).await?;
            return Ok(false);
        }
    };

    let permit = Arc::clone(&state.workers)
        .acquire_owned()
        .await
        .context("worker pool closed")?;
    let engine = Arc::clone(&state.engine);
    let result = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        engine.transcribe(&engine_req)
    })
    .await
    .context("transcription worker panicked")?;

    match result {
        Ok(result) => {
            let reply = TranscriptionReply::new(result, &req.session_id, &req.action_id);
            write_line(writer, &Response::Transcription(reply)).await?;
            Ok(true)
        }
        Err(e) => {
            warn!(session = %req.session_id, "transcription rejected: {e}");
            write_line(writer, &Response::error(e.to_string())).await?;
            Ok(false)
        }
    }
}

/// Stream chunk frames for one request. Returns `Ok(false)` when the stream
/// ended with an error frame.
async fn synthesize<W>(
    state: &ServerState,
    req: SynthesizeRequest,
    writer: &mut W,
) -> anyhow::Result<bool>
where
    W: AsyncWrite + Unpin,
{
    info!(
        session = %req.session_id,
        action = %req.action_id,
        chars = req.text.len(),
        voice = %req.voice,
        language = %req.language,
        speed = req.speed,
        "synthesize request"
    );

    let permit = Arc::clone(&state.workers)
        .acquire_owned()
        .await
        .context("worker pool closed")?;
    let engine = Arc::clone(&state.engine);
    let (tx, mut rx) = mpsc::channel::<Response>(CHUNK_CHANNEL_CAP);
    let session_id = req.session_id.clone();
    let action_id = req.action_id.clone();

    let worker = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        let stream = match engine.synthesize(&req.to_engine()) {
            Ok(s) => s,
            Err(e) => {
                let _ = tx.blocking_send(Response::error(e.to_string()));
                return WorkerExit::Failed;
            }
        };
        let voice = stream.voice_id().unwrap_or("-").to_string();

        let mut stream = stream.with_final_marker();
        for chunk in stream.by_ref() {
            let frame = match chunk {
                Ok(chunk) => Response::AudioChunk(ChunkFrame::new(chunk, &session_id, &action_id)),
                Err(e) => {
                    warn!(
                        session = %session_id,
                        voice = %voice,
                        "synthesis failed mid-stream: {e}"
                    );
                    let _ = tx.blocking_send(Response::error(e.to_string()));
                    return WorkerExit::Failed;
                }
            };
            if tx.blocking_send(frame).is_err() {
                return WorkerExit::Abandoned;
            }
        }

        info!(
            session = %session_id,
            voice = %voice,
            chunks = stream.chunks_emitted(),
            "synthesis complete"
        );
        WorkerExit::Completed
    });

    let mut write_result = Ok(());
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_line(writer, &frame).await {
            write_result = Err(e);
            break;
        }
    }
    drop(rx);

    let exit = worker.await.context("synthesis worker panicked")?;
    if exit == WorkerExit::Abandoned {
        state.streams_abandoned.fetch_add(1, Ordering::Relaxed);
        debug!("client went away mid-stream, synthesis stopped");
    }
    write_result?;
    Ok(exit == WorkerExit::Completed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineRead {
    Line,
    TooLong,
    Eof,
}

/// Read one newline-terminated line into `buf`, reading at most `max + 1`
/// bytes of it. An overlong line is drained up to its newline and reported as
/// `TooLong`; a final line without a newline counts as a line.
async fn read_request_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = (&mut *reader)
        .take(max as u64 + 1)
        .read_until(b'\n', buf)
        .await?;
    if n == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        return Ok(LineRead::Line);
    }
    if buf.len() <= max {
        return Ok(LineRead::Line);
    }

    buf.clear();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                break;
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
    Ok(LineRead::TooLong)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    Completed,
    Failed,
    Abandoned,
}

async fn write_line<W>(writer: &mut W, response: &Response) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = response.to_json().context("serializing response")?;
    writer
        .write_all(json.as_bytes())
        .await
        .context("writing response")?;
    writer.write_all(b"\n").await.context("writing newline")?;
    writer.flush().await.context("flushing response")?;
    Ok(())
}
