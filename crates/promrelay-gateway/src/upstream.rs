//! Upstream exporter client.
//!
//! `Upstream` is the seam between the fetch coordinator and the network:
//! the production implementation wraps one `reqwest::Client` per listener,
//! tests plug in in-memory bodies.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};

use promrelay_core::error::{RelayError, Result};

/// An open upstream body. Dropping it closes the underlying connection.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Issue one request to `uri` for `exporter`; resolves once response
    /// headers are available. The response status is not inspected.
    async fn fetch(&self, exporter: &str, uri: &str) -> Result<BodyStream>;
}

/// Client policy for one listener.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

/// `reqwest`-backed upstream.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(opts: &ClientOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder().gzip(true);
        if let Some(t) = opts.timeout {
            builder = builder.timeout(t);
        }
        if let Some(t) = opts.connect_timeout {
            builder = builder.connect_timeout(t);
        }
        let client = builder
            .build()
            .map_err(|e| RelayError::Internal(format!("http client build failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, exporter: &str, uri: &str) -> Result<BodyStream> {
        let resp = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| RelayError::Fetch {
                exporter: exporter.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(exporter = %exporter, status = %resp.status(), "upstream headers received");

        let exporter = exporter.to_string();
        let body = resp.bytes_stream().map_err(move |e| RelayError::Transform {
            exporter: exporter.clone(),
            reason: e.to_string(),
        });
        Ok(Box::pin(body))
    }
}
