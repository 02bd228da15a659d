use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::Deserialize;
use promrelay_core::error::{RelayError, Result};
use promrelay_core::labels::LabelSet;

/// Top level: listener name -> listener.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct RelayConfig {
    pub listeners: BTreeMap<String, ListenerConfig>,
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.listeners.is_empty() {
            return Err(RelayError::Config("at least one listener is required".into()));
        }

        let mut seen = HashSet::new();
        for (name, l) in &self.listeners {
            l.validate()
                .map_err(|e| RelayError::Config(format!("listener {name}: {e}")))?;
            let addr = l.bind_address()?;
            if !seen.insert(addr.clone()) {
                return Err(RelayError::Config(format!(
                    "listener {name}: address {addr} already used by another listener"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ListenerConfig {
    pub address: String,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default)]
    pub exporters: BTreeMap<String, ExporterConfig>,

    #[serde(default)]
    pub common_labels: LabelSet,

    /// Whole-request timeout per upstream fetch (headers + body).
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Cap for one buffered exposition line; longer lines pass through as is.
    #[serde(default)]
    pub max_line_bytes: Option<usize>,
}

impl ListenerConfig {
    pub fn validate(&self) -> Result<()> {
        self.bind_address()?;

        if !self.path.starts_with('/') {
            return Err(RelayError::Config(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        if self
            .path
            .split('/')
            .any(|seg| seg.starts_with(':') || seg.starts_with('*'))
        {
            return Err(RelayError::Config(format!(
                "path must be a literal route: {}",
                self.path
            )));
        }
        if self.exporters.is_empty() {
            return Err(RelayError::Config("exporters must not be empty".into()));
        }
        if let Some(t) = self.timeout_ms {
            if !(100..=600_000).contains(&t) {
                return Err(RelayError::Config(
                    "timeoutMs must be between 100 and 600000".into(),
                ));
            }
        }
        if !(10..=60_000).contains(&self.connect_timeout_ms) {
            return Err(RelayError::Config(
                "connectTimeoutMs must be between 10 and 60000".into(),
            ));
        }

        if let Some(m) = self.max_line_bytes {
            if m < 1024 {
                return Err(RelayError::Config("maxLineBytes must be at least 1024".into()));
            }
        }

        validate_label_names(&self.common_labels, "commonLabels")?;
        for (name, e) in &self.exporters {
            e.validate()
                .map_err(|err| RelayError::Config(format!("exporter {name}: {err}")))?;
        }
        Ok(())
    }

    /// `address` as handed to the listener socket; see [`bind_address`].
    pub fn bind_address(&self) -> Result<String> {
        bind_address(&self.address)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    pub uri: String,

    #[serde(default)]
    pub labels: LabelSet,
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.uri.starts_with("http://") || self.uri.starts_with("https://")) {
            return Err(RelayError::Config(format!(
                "uri must be http:// or https://: {}",
                self.uri
            )));
        }
        validate_label_names(&self.labels, "labels")
    }
}

/// Normalize a `host:port` listen address. A bare `:port` binds every
/// interface; hostnames are kept and resolved at bind time.
pub fn bind_address(address: &str) -> Result<String> {
    let addr = if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    };
    let valid = match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    };
    if !valid {
        return Err(RelayError::Config(format!("invalid address: {address}")));
    }
    Ok(addr)
}

fn validate_label_names(labels: &LabelSet, field: &str) -> Result<()> {
    for k in labels.keys() {
        if !is_label_name(k) {
            return Err(RelayError::Config(format!("{field}: invalid label name {k:?}")));
        }
    }
    Ok(())
}

fn is_label_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn default_path() -> String {
    "/metrics".into()
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
