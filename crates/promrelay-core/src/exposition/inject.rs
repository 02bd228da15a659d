//! Incremental label injector.
//!
//! Bytes are fed in whatever chunks the transport produces. Complete lines are
//! rewritten and emitted immediately; only the trailing partial line is held
//! back. A partial line longer than `max_line_bytes` is not buffered further:
//! it is flushed unmodified and the rest of that line streams through as is.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use super::series::MetricSeries;
use crate::labels::LabelFragments;

/// Default cap for a buffered partial line (1 MiB).
pub const DEFAULT_MAX_LINE_BYTES: usize = 1 << 20;

/// Counters collected while rewriting one body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectStats {
    /// Lines seen (including an unterminated final line).
    pub lines: u64,
    /// Sample lines that received the fragments.
    pub rewritten: u64,
    /// Lines passed through because they exceeded the buffer cap.
    pub oversized: u64,
}

/// Stateful rewriter for one upstream body.
#[derive(Debug)]
pub struct LabelInjector {
    fragments: Arc<LabelFragments>,
    pending: Vec<u8>,
    max_line_bytes: usize,
    /// Inside an oversized line: pass bytes through until the next `\n`.
    passthrough: bool,
    stats: InjectStats,
}

impl LabelInjector {
    pub fn new(fragments: Arc<LabelFragments>) -> Self {
        Self {
            fragments,
            pending: Vec::new(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            passthrough: false,
            stats: InjectStats::default(),
        }
    }

    /// Override the partial-line buffer cap.
    pub fn with_max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = max.max(1);
        self
    }

    pub fn stats(&self) -> InjectStats {
        self.stats
    }

    /// Rewrite every complete line of `chunk` into `out`.
    pub fn feed(&mut self, mut chunk: &[u8], out: &mut BytesMut) {
        while !chunk.is_empty() {
            let newline = chunk.iter().position(|&b| b == b'\n');

            if self.passthrough {
                match newline {
                    Some(p) => {
                        out.put_slice(&chunk[..=p]);
                        self.passthrough = false;
                        chunk = &chunk[p + 1..];
                        continue;
                    }
                    None => {
                        out.put_slice(chunk);
                        return;
                    }
                }
            }

            match newline {
                Some(p) => {
                    if self.pending.is_empty() {
                        self.rewrite_line(&chunk[..p], out);
                    } else {
                        self.pending.extend_from_slice(&chunk[..p]);
                        let line = std::mem::take(&mut self.pending);
                        self.rewrite_line(&line, out);
                        self.pending = line;
                        self.pending.clear();
                    }
                    out.put_u8(b'\n');
                    chunk = &chunk[p + 1..];
                }
                None => {
                    if self.pending.len() + chunk.len() > self.max_line_bytes {
                        tracing::debug!(
                            buffered = self.pending.len() + chunk.len(),
                            max = self.max_line_bytes,
                            "line exceeds buffer cap, passing through"
                        );
                        out.put_slice(&self.pending);
                        out.put_slice(chunk);
                        self.pending.clear();
                        self.passthrough = true;
                        self.stats.lines += 1;
                        self.stats.oversized += 1;
                    } else {
                        self.pending.extend_from_slice(chunk);
                    }
                    return;
                }
            }
        }
    }

    /// Flush a final line that had no terminating `\n`.
    pub fn finish(&mut self, out: &mut BytesMut) {
        self.passthrough = false;
        if self.pending.is_empty() {
            return;
        }
        let line = std::mem::take(&mut self.pending);
        self.rewrite_line(&line, out);
    }

    /// Rewrite a complete in-memory body (used by tests and tooling).
    pub fn rewrite_all(fragments: Arc<LabelFragments>, body: &[u8]) -> BytesMut {
        let mut injector = Self::new(fragments);
        let mut out = BytesMut::with_capacity(body.len());
        injector.feed(body, &mut out);
        injector.finish(&mut out);
        out
    }

    fn rewrite_line(&mut self, line: &[u8], out: &mut BytesMut) {
        self.stats.lines += 1;
        if self.fragments.is_empty() {
            out.put_slice(line);
            return;
        }
        match MetricSeries::parse(line) {
            Some(series) => {
                tracing::trace!(
                    name = %String::from_utf8_lossy(series.name),
                    labels = %String::from_utf8_lossy(series.labels.unwrap_or_default()),
                    sample = %String::from_utf8_lossy(series.sample),
                    "parsing series"
                );
                series.write_injected(self.fragments.joined().as_bytes(), out);
                self.stats.rewritten += 1;
            }
            None => out.put_slice(line),
        }
    }
}
