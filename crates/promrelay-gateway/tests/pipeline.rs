//! Fetch coordinator + response assembler against in-memory upstreams.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use promrelay_core::error::{ErrorKind, RelayError, Result};
use promrelay_gateway::app_state::ListenerState;
use promrelay_gateway::config::{self, Format};
use promrelay_gateway::obs::RelayMetrics;
use promrelay_gateway::transport::scrape::stream_scrape;
use promrelay_gateway::upstream::{BodyStream, Upstream};

#[derive(Clone)]
enum Behavior {
    Body(Vec<&'static str>),
    Refuse,
    Hang,
    BreakAfter(Vec<&'static str>),
}

struct FakeUpstream {
    by_uri: HashMap<String, Behavior>,
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn fetch(&self, exporter: &str, uri: &str) -> Result<BodyStream> {
        match self.by_uri.get(uri).cloned() {
            Some(Behavior::Body(chunks)) => {
                let items: Vec<Result<Bytes>> = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Some(Behavior::BreakAfter(chunks)) => {
                let mut items: Vec<Result<Bytes>> = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
                items.push(Err(RelayError::Transform {
                    exporter: exporter.to_string(),
                    reason: "connection reset".into(),
                }));
                Ok(Box::pin(stream::iter(items)))
            }
            Some(Behavior::Hang) => std::future::pending().await,
            Some(Behavior::Refuse) | None => Err(RelayError::Fetch {
                exporter: exporter.to_string(),
                reason: "connection refused".into(),
            }),
        }
    }
}

const CONFIG: &str = r#"
default:
  address: "127.0.0.1:0"
  exporters:
    a:
      uri: "http://a/metrics"
      labels: { job: "A" }
    b:
      uri: "http://b/metrics"
      labels: { job: "B" }
    c:
      uri: "http://c/metrics"
      labels: { job: "C" }
  commonLabels: { env: "prod" }
"#;

fn listener(behaviors: [(&str, Behavior); 3]) -> (ListenerState, Arc<RelayMetrics>) {
    let cfg = config::load_from_str(CONFIG, Format::Yaml).unwrap();
    let upstream = FakeUpstream {
        by_uri: behaviors
            .into_iter()
            .map(|(name, b)| (format!("http://{name}/metrics"), b))
            .collect(),
    };
    let metrics = Arc::new(RelayMetrics::new());
    let state = ListenerState::with_upstream(
        "default",
        &cfg.listeners["default"],
        Arc::new(upstream),
        Arc::clone(&metrics),
    );
    (state, metrics)
}

fn lines(out: &[u8]) -> HashSet<String> {
    String::from_utf8(out.to_vec())
        .unwrap()
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_blank(s: &str) -> usize {
    s.lines().filter(|l| !l.is_empty()).count()
}

const BODY_A: &str = "# HELP up target up\n# TYPE up gauge\nup 1\n\nrequests_total{code=\"200\"} 10\n";
const BODY_B: &str = "# TYPE temp gauge\ntemp{room=\"x\"} 21.5\n";
const BODY_C: &str = "build_info{version=\"1.0\"} 1\n";

#[tokio::test]
async fn merges_all_exporters_with_labels() {
    let (state, metrics) = listener([
        ("a", Behavior::Body(vec!["# HELP up target up\n# TY", "PE up gauge\nup 1\n\nreq", "uests_total{code=\"200\"} 10\n"])),
        ("b", Behavior::Body(vec![BODY_B])),
        ("c", Behavior::Body(vec![BODY_C])),
    ]);
    let mut out = Vec::new();
    let report = stream_scrape(&state, &mut out, CancellationToken::new()).await.unwrap();

    assert_eq!(report.exporters, 3);
    assert_eq!(report.bytes, out.len() as u64);

    let text = String::from_utf8(out.clone()).unwrap();
    assert_eq!(non_blank(&text), non_blank(BODY_A) + non_blank(BODY_B) + non_blank(BODY_C));

    let got = lines(&out);
    for want in [
        "# HELP up target up",
        "# TYPE up gauge",
        "up{job=\"A\",env=\"prod\"} 1",
        "requests_total{code=\"200\",job=\"A\",env=\"prod\"} 10",
        "# TYPE temp gauge",
        "temp{room=\"x\",job=\"B\",env=\"prod\"} 21.5",
        "build_info{version=\"1.0\",job=\"C\",env=\"prod\"} 1",
    ] {
        assert!(got.contains(want), "missing {want:?} in\n{text}");
    }
    assert_eq!(metrics.scrapes.get(&[("listener", "default")]), 1);
    assert_eq!(metrics.scrapes_in_flight.get(&[("listener", "default")]), 0);
    assert_eq!(metrics.scrape_duration.count(&[("listener", "default")]), 1);
}

#[tokio::test]
async fn exporter_lines_stay_contiguous_and_ordered() {
    let (state, _) = listener([
        ("a", Behavior::Body(vec!["x 1\ny 2\n", "z 3\n"])),
        ("b", Behavior::Body(vec!["p 1\nq 2\n"])),
        ("c", Behavior::Refuse),
    ]);
    let mut out = Vec::new();
    stream_scrape(&state, &mut out, CancellationToken::new()).await.unwrap();
    let text = String::from_utf8(out).unwrap();

    let a = "x{job=\"A\",env=\"prod\"} 1\ny{job=\"A\",env=\"prod\"} 2\nz{job=\"A\",env=\"prod\"} 3\n";
    let b = "p{job=\"B\",env=\"prod\"} 1\nq{job=\"B\",env=\"prod\"} 2\n";
    assert!(text == format!("{a}{b}") || text == format!("{b}{a}"), "got\n{text}");
}

#[tokio::test]
async fn failed_exporter_is_omitted() {
    let (state, metrics) = listener([
        ("a", Behavior::Body(vec![BODY_A])),
        ("b", Behavior::Refuse),
        ("c", Behavior::Body(vec![BODY_C])),
    ]);
    let mut out = Vec::new();
    let report = stream_scrape(&state, &mut out, CancellationToken::new()).await.unwrap();

    assert_eq!(report.exporters, 2);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(non_blank(&text), non_blank(BODY_A) + non_blank(BODY_C));
    assert!(!text.contains("job=\"B\""));
    assert_eq!(
        metrics.fetch_failures.get(&[("listener", "default"), ("exporter", "b")]),
        1
    );
    assert_eq!(metrics.copy_aborts.get(&[("listener", "default"), ("kind", "copy")]), 0);
}

#[tokio::test]
async fn unterminated_body_does_not_merge_with_next() {
    let (state, _) = listener([
        ("a", Behavior::Body(vec!["a_total 1"])),
        ("b", Behavior::Body(vec!["b_total 2"])),
        ("c", Behavior::Refuse),
    ]);
    let mut out = Vec::new();
    stream_scrape(&state, &mut out, CancellationToken::new()).await.unwrap();
    let got = lines(&out);
    assert_eq!(got.len(), 2);
    assert!(got.contains("a_total{job=\"A\",env=\"prod\"} 1"));
    assert!(got.contains("b_total{job=\"B\",env=\"prod\"} 2"));
}

/// Accepts `limit` bytes, then fails like a closed client connection.
struct ClosingWriter {
    written: Vec<u8>,
    limit: usize,
}

impl AsyncWrite for ClosingWriter {
    fn poll_write(mut self: Pin<&mut Self>, _: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if self.written.len() >= self.limit {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "client closed")));
        }
        let n = buf.len().min(self.limit - self.written.len());
        self.written.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn client_write_failure_aborts_response() {
    let (state, metrics) = listener([
        ("a", Behavior::Body(vec![BODY_A])),
        ("b", Behavior::Body(vec![BODY_B])),
        ("c", Behavior::Body(vec![BODY_C])),
    ]);
    let mut out = ClosingWriter { written: Vec::new(), limit: 10 };
    let err = stream_scrape(&state, &mut out, CancellationToken::new())
        .await
        .expect_err("must abort");

    assert_eq!(err.kind(), ErrorKind::Copy);
    assert_eq!(out.written.len(), 10);
    assert_eq!(metrics.copy_aborts.get(&[("listener", "default"), ("kind", "copy")]), 1);
    assert_eq!(metrics.scrapes_in_flight.get(&[("listener", "default")]), 0);
}

#[tokio::test]
async fn upstream_body_failure_truncates_response() {
    let (state, metrics) = listener([
        ("a", Behavior::BreakAfter(vec!["up 1\n", "partial_li"])),
        ("b", Behavior::Hang),
        ("c", Behavior::Hang),
    ]);
    let mut out = Vec::new();
    let err = stream_scrape(&state, &mut out, CancellationToken::new())
        .await
        .expect_err("must abort");

    assert_eq!(err.kind(), ErrorKind::Transform);
    assert_eq!(String::from_utf8(out).unwrap(), "up{job=\"A\",env=\"prod\"} 1\n");
    assert_eq!(metrics.copy_aborts.get(&[("listener", "default"), ("kind", "transform")]), 1);
}

#[tokio::test]
async fn cancellation_stops_hung_fetches() {
    let (state, metrics) = listener([
        ("a", Behavior::Body(vec![BODY_C])),
        ("b", Behavior::Hang),
        ("c", Behavior::Hang),
    ]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let mut out = Vec::new();
    let err = tokio::time::timeout(Duration::from_secs(5), stream_scrape(&state, &mut out, cancel))
        .await
        .expect("scrape must not hang")
        .expect_err("must be cancelled");
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(metrics.copy_aborts.get(&[("listener", "default"), ("kind", "cancelled")]), 1);
}

#[tokio::test]
async fn queue_closes_after_cancel() {
    let (state, _) = listener([
        ("a", Behavior::Hang),
        ("b", Behavior::Hang),
        ("c", Behavior::Refuse),
    ]);
    let cancel = CancellationToken::new();
    let mut rx = state.coordinator().fetch(cancel.clone());
    cancel.cancel();

    let next = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("queue must close");
    assert!(next.is_none());
}

#[tokio::test]
async fn already_cancelled_token_starts_nothing() {
    let (state, metrics) = listener([
        ("a", Behavior::Refuse),
        ("b", Behavior::Refuse),
        ("c", Behavior::Refuse),
    ]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut rx = state.coordinator().fetch(cancel);
    assert!(rx.recv().await.is_none());
    assert_eq!(metrics.fetch_failures.get(&[("listener", "default"), ("exporter", "a")]), 0);
}

#[tokio::test]
async fn payloads_arrive_before_slow_exporters_finish() {
    let (state, _) = listener([
        ("a", Behavior::Body(vec![BODY_C])),
        ("b", Behavior::Hang),
        ("c", Behavior::Hang),
    ]);
    let cancel = CancellationToken::new();
    let mut rx = state.coordinator().fetch(cancel.clone());

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("fast exporter must not wait for hung ones")
        .expect("payload");
    assert_eq!(first.exporter, "a");
    cancel.cancel();
}
