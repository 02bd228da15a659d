//! Relay config loader (strict parsing).
//!
//! The file format is picked from the extension: `.yaml`/`.yml` or `.json`.

pub mod env;
pub mod schema;

use std::fs;
use std::path::Path;

use promrelay_core::error::{RelayError, Result};

pub use schema::{bind_address, ExporterConfig, ListenerConfig, RelayConfig};

/// Supported config encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(Format::Yaml),
            Some("json") => Ok(Format::Json),
            _ => Err(RelayError::Config(format!(
                "unsupported file {}",
                path.display()
            ))),
        }
    }
}

pub fn load_from_file(path: impl AsRef<Path>, expand_env: bool) -> Result<RelayConfig> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    let mut s = fs::read_to_string(path)
        .map_err(|e| RelayError::Config(format!("read {} failed: {e}", path.display())))?;
    if expand_env {
        s = env::expand(&s, |k| std::env::var(k).ok());
    }
    load_from_str(&s, format)
}

pub fn load_from_str(s: &str, format: Format) -> Result<RelayConfig> {
    let cfg: RelayConfig = match format {
        Format::Yaml => serde_yaml::from_str(s)
            .map_err(|e| RelayError::Config(format!("invalid yaml: {e}")))?,
        Format::Json => serde_json::from_str(s)
            .map_err(|e| RelayError::Config(format!("invalid json: {e}")))?,
    };
    cfg.validate()?;
    Ok(cfg)
}
