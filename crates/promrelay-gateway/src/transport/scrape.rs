//! Scrape handler.
//!
//! Lifecycle of one request:
//! - a `CancellationToken` is created; the response body holds its drop guard,
//!   so a client disconnect (hyper dropping the body) cancels the request;
//! - the fetch coordinator fans out to every exporter;
//! - a spawned task runs the assembler, writing into an in-memory pipe whose
//!   read half is the response body.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::Stream;
use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio_util::io::ReaderStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use promrelay_core::error::{ErrorKind, Result};

use crate::app_state::ListenerState;
use crate::assemble::AssembleReport;

/// Exposition content type for relayed scrapes.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Pipe size between the assembler and the response body.
const PIPE_BYTES: usize = 64 * 1024;

/// Response body: reads the assembler's output and cancels the request when
/// dropped. The guard is declared first so cancellation fires before the
/// pipe's read half goes away.
struct ScrapeBody {
    _cancel_on_drop: DropGuard,
    inner: ReaderStream<DuplexStream>,
}

impl Stream for ScrapeBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Handler bound to the listener path (any method, query ignored).
pub async fn scrape(State(state): State<ListenerState>) -> Response {
    let cancel = CancellationToken::new();
    let (mut writer, reader) = tokio::io::duplex(PIPE_BYTES);

    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = stream_scrape(&state, &mut writer, task_cancel).await;
        let _ = writer.shutdown().await;
    });

    let body = ScrapeBody {
        _cancel_on_drop: cancel.drop_guard(),
        inner: ReaderStream::new(reader),
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        Body::from_stream(body),
    )
        .into_response()
}

/// Fetch every exporter of `state` and stream the relabeled result into `out`.
///
/// Failures are logged and counted here; the returned error is informational
/// (the response is already committed when it happens).
pub async fn stream_scrape<W>(
    state: &ListenerState,
    out: &mut W,
    cancel: CancellationToken,
) -> Result<AssembleReport>
where
    W: AsyncWrite + Unpin,
{
    let listener = state.name();
    let metrics = state.metrics();
    let started = Instant::now();

    metrics.scrapes.inc(&[("listener", listener)]);
    metrics.scrapes_in_flight.inc(&[("listener", listener)]);

    let payloads = state.coordinator().fetch(cancel.clone());
    let res = state.assembler().run(payloads, out, &cancel).await;
    // stop whatever is still in flight when the assembler bailed out early
    cancel.cancel();

    match &res {
        Ok(report) => {
            tracing::debug!(
                listener = %listener,
                exporters = report.exporters,
                configured = state.coordinator().targets().len(),
                bytes = report.bytes,
                "scrape finished"
            );
            metrics.bytes_written.add(&[("listener", listener)], report.bytes);
        }
        Err(e) if e.kind() == ErrorKind::Cancelled => {
            tracing::warn!(listener = %listener, "scrape cancelled, client went away");
            metrics.copy_aborts.inc(&[("listener", listener), ("kind", e.kind().as_str())]);
        }
        Err(e) => {
            tracing::error!(listener = %listener, kind = e.kind().as_str(), error = %e, "aborting scrape response");
            metrics.copy_aborts.inc(&[("listener", listener), ("kind", e.kind().as_str())]);
        }
    }

    metrics.scrapes_in_flight.dec(&[("listener", listener)]);
    metrics.scrape_duration.observe(&[("listener", listener)], started.elapsed());
    res
}
