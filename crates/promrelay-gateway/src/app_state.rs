//! Per-listener state shared by every scrape request.
//!
//! Everything in here is built once at startup (resolved labels, target list,
//! HTTP client) and only read afterwards.

use std::sync::Arc;

use promrelay_core::error::Result;
use promrelay_core::labels::ResolvedLabels;

use crate::assemble::ResponseAssembler;
use crate::config::ListenerConfig;
use crate::fetch::{FetchCoordinator, Target};
use crate::obs::RelayMetrics;
use crate::upstream::{ClientOptions, HttpUpstream, Upstream};

#[derive(Clone)]
pub struct ListenerState {
    inner: Arc<ListenerInner>,
}

struct ListenerInner {
    name: Arc<str>,
    path: String,
    coordinator: FetchCoordinator,
    assembler: ResponseAssembler,
    metrics: Arc<RelayMetrics>,
}

impl ListenerState {
    /// Build listener state with its own HTTP client.
    pub fn new(name: &str, cfg: &ListenerConfig, metrics: Arc<RelayMetrics>) -> Result<Self> {
        let upstream = HttpUpstream::new(&ClientOptions {
            timeout: cfg.timeout(),
            connect_timeout: Some(cfg.connect_timeout()),
        })?;
        Ok(Self::with_upstream(name, cfg, Arc::new(upstream), metrics))
    }

    /// Build listener state around an existing upstream client.
    pub fn with_upstream(
        name: &str,
        cfg: &ListenerConfig,
        upstream: Arc<dyn Upstream>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        let name: Arc<str> = Arc::from(name);

        let labels = Arc::new(ResolvedLabels::build(
            cfg.exporters.iter().map(|(n, e)| (n.as_str(), &e.labels)),
            &cfg.common_labels,
        ));
        let targets = cfg
            .exporters
            .iter()
            .map(|(n, e)| Target {
                name: n.clone(),
                uri: e.uri.clone(),
            })
            .collect();

        let mut assembler = ResponseAssembler::new(Arc::clone(&name), labels, Arc::clone(&metrics));
        if let Some(max) = cfg.max_line_bytes {
            assembler = assembler.with_max_line_bytes(max);
        }

        Self {
            inner: Arc::new(ListenerInner {
                coordinator: FetchCoordinator::new(Arc::clone(&name), upstream, targets, Arc::clone(&metrics)),
                assembler,
                path: cfg.path.clone(),
                name,
                metrics,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.inner.coordinator
    }

    pub fn assembler(&self) -> &ResponseAssembler {
        &self.inner.assembler
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.inner.metrics
    }
}
