//! Exporter config loader (strict parsing).
//!
//! The YAML file is optional; command-line flags override whatever it sets.

pub mod schema;

use std::fs;

use pfe_core::error::{PfeError, Result};

pub use schema::{ExportSection, ExporterConfig, StoreSection, DEFAULT_PATH};

pub fn load_from_file(path: &str) -> Result<ExporterConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| PfeError::Config(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ExporterConfig> {
    let cfg: ExporterConfig = serde_yaml::from_str(s)
        .map_err(|e| PfeError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
