//! Fetch coordinator: one concurrent request per exporter target.
//!
//! Results are handed over through a bounded queue sized to the number of
//! targets, so a fetch task never blocks on a slow consumer. The queue closes
//! only after the supervisor has joined every task it launched.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::obs::RelayMetrics;
use crate::upstream::{BodyStream, Upstream};

/// One configured upstream exporter.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub uri: String,
}

/// A fetched exporter body, owned by whoever holds it. Dropping it closes
/// the upstream connection.
pub struct Payload {
    pub exporter: String,
    pub body: BodyStream,
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload").field("exporter", &self.exporter).finish_non_exhaustive()
    }
}

pub struct FetchCoordinator {
    listener: Arc<str>,
    upstream: Arc<dyn Upstream>,
    targets: Arc<[Target]>,
    metrics: Arc<RelayMetrics>,
}

impl FetchCoordinator {
    pub fn new(
        listener: impl Into<Arc<str>>,
        upstream: Arc<dyn Upstream>,
        targets: Vec<Target>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            listener: listener.into(),
            upstream,
            targets: targets.into(),
            metrics,
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Launch every fetch now and return the completion queue.
    ///
    /// Failed targets are logged and omitted. When `cancel` fires, in-flight
    /// fetches are aborted and the queue closes once they have unwound.
    pub fn fetch(&self, cancel: CancellationToken) -> mpsc::Receiver<Payload> {
        let (tx, rx) = mpsc::channel(self.targets.len().max(1));
        let mut tasks = JoinSet::new();

        for target in self.targets.iter() {
            if cancel.is_cancelled() {
                break;
            }
            let tx = tx.clone();
            let cancel = cancel.clone();
            let upstream = Arc::clone(&self.upstream);
            let metrics = Arc::clone(&self.metrics);
            let listener = Arc::clone(&self.listener);
            let target = target.clone();

            tasks.spawn(async move {
                tracing::debug!(listener = %listener, exporter = %target.name, uri = %target.uri, "start fetching");
                let res = tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!(listener = %listener, exporter = %target.name, "fetch cancelled");
                        return;
                    }
                    res = upstream.fetch(&target.name, &target.uri) => res,
                };

                match res {
                    Ok(body) => {
                        tracing::debug!(listener = %listener, exporter = %target.name, "finish fetching");
                        let payload = Payload { exporter: target.name, body };
                        if tx.send(payload).await.is_err() {
                            tracing::debug!(listener = %listener, "payload receiver gone, dropping body");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            listener = %listener,
                            exporter = %target.name,
                            uri = %target.uri,
                            error = %e,
                            "fetch failed, omitting exporter"
                        );
                        metrics
                            .fetch_failures
                            .inc(&[("listener", &*listener), ("exporter", target.name.as_str())]);
                    }
                }
            });
        }

        let listener = Arc::clone(&self.listener);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    joined = tasks.join_next() => match joined {
                        Some(Err(e)) if e.is_panic() => {
                            tracing::error!(listener = %listener, error = %e, "fetch task panicked");
                        }
                        Some(_) => {}
                        None => break,
                    },
                    _ = cancel.cancelled() => {
                        tasks.abort_all();
                        while tasks.join_next().await.is_some() {}
                        break;
                    }
                }
            }
            // completion barrier passed: closing the queue is now safe
            drop(tx);
            tracing::debug!(listener = %listener, "all fetches finished");
        });

        rx
    }
}
