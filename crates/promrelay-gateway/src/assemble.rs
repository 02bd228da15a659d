//! Response assembler: drains fetched bodies through their label injector and
//! copies them to the client, one body at a time, in arrival order.
//!
//! A fetch failure never reaches this point (the exporter is just missing
//! from the queue). A failure here, whether an upstream read error, a client
//! write error or cancellation, aborts the whole response: the client has
//! already received the status line, so all it sees is a truncated body.

use std::sync::Arc;

use bytes::BytesMut;
use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use promrelay_core::error::{RelayError, Result};
use promrelay_core::exposition::{LabelInjector, DEFAULT_MAX_LINE_BYTES};
use promrelay_core::labels::ResolvedLabels;

use crate::fetch::Payload;
use crate::obs::RelayMetrics;

/// Outcome of a fully assembled response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssembleReport {
    /// Exporter bodies copied to the client.
    pub exporters: usize,
    /// Bytes written to the client.
    pub bytes: u64,
}

pub struct ResponseAssembler {
    listener: Arc<str>,
    labels: Arc<ResolvedLabels>,
    metrics: Arc<RelayMetrics>,
    max_line_bytes: usize,
}

impl ResponseAssembler {
    pub fn new(
        listener: impl Into<Arc<str>>,
        labels: Arc<ResolvedLabels>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            listener: listener.into(),
            labels,
            metrics,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    pub fn with_max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = max;
        self
    }

    /// Copy every payload in `payloads` to `out` until the queue closes.
    ///
    /// Returns at the first copy failure; payloads still queued are dropped
    /// (and their connections closed) together with the receiver.
    pub async fn run<W>(
        &self,
        mut payloads: mpsc::Receiver<Payload>,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<AssembleReport>
    where
        W: AsyncWrite + Unpin,
    {
        let mut report = AssembleReport::default();

        loop {
            let payload = tokio::select! {
                _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                p = payloads.recv() => match p {
                    Some(p) => p,
                    None => break,
                },
            };

            let exporter = payload.exporter.clone();
            tracing::debug!(listener = %self.listener, exporter = %exporter, "start copying body with merging labels");
            let n = self.copy_body(payload, out, cancel).await?;
            tracing::debug!(listener = %self.listener, exporter = %exporter, bytes = n, "finish copying body");

            self.metrics
                .payloads
                .inc(&[("listener", &*self.listener), ("exporter", exporter.as_str())]);
            report.exporters += 1;
            report.bytes += n;
        }

        out.flush().await?;
        Ok(report)
    }

    /// Stream one body through its injector. The body is dropped (closed)
    /// when this returns, on success or failure.
    async fn copy_body<W>(&self, payload: Payload, out: &mut W, cancel: &CancellationToken) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let Payload { exporter, mut body } = payload;
        let mut injector = LabelInjector::new(self.labels.for_exporter(&exporter))
            .with_max_line_bytes(self.max_line_bytes);
        let mut buf = BytesMut::with_capacity(8 * 1024);
        let mut written = 0u64;
        let mut last = None;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                next = body.next() => next,
            };
            match next {
                Some(Ok(chunk)) => injector.feed(&chunk, &mut buf),
                Some(Err(e)) => return Err(e),
                None => break,
            }
            if !buf.is_empty() {
                last = buf.last().copied();
                out.write_all(&buf).await?;
                written += buf.len() as u64;
                buf.clear();
            }
        }

        injector.finish(&mut buf);
        if !buf.is_empty() {
            last = buf.last().copied();
        }
        // keep the next exporter's first line on a line of its own
        if last.is_some_and(|b| b != b'\n') {
            buf.extend_from_slice(b"\n");
        }
        if !buf.is_empty() {
            out.write_all(&buf).await?;
            written += buf.len() as u64;
        }

        let stats = injector.stats();
        tracing::trace!(
            exporter = %exporter,
            lines = stats.lines,
            rewritten = stats.rewritten,
            oversized = stats.oversized,
            "body rewritten"
        );
        Ok(written)
    }
}
