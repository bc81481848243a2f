use std::net::SocketAddr;

use serde::Deserialize;
use pfe_core::error::{PfeError, Result};
use pfe_core::naming::{MetricFileFilter, DEFAULT_FILE_PATTERN};

/// Metric directory used when neither the config file nor `--path` names one.
pub const DEFAULT_PATH: &str = "/var/lib/pfe";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    pub version: u32,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub export: ExportSection,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            version: 1,
            store: StoreSection::default(),
            export: ExportSection::default(),
        }
    }
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PfeError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.store.validate()?;
        self.export.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_watch")]
    pub watch: bool,

    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,

    #[serde(default = "default_event_queue")]
    pub event_queue: usize,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_path(),
            watch: default_watch(),
            file_pattern: default_file_pattern(),
            event_queue: default_event_queue(),
        }
    }
}

impl StoreSection {
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(PfeError::Config("store.path must not be empty".into()));
        }
        if !(1..=65536).contains(&self.event_queue) {
            return Err(PfeError::Config(
                "store.event_queue must be between 1 and 65536".into(),
            ));
        }
        self.file_filter()?;
        Ok(())
    }

    pub fn file_filter(&self) -> Result<MetricFileFilter> {
        MetricFileFilter::new(&self.file_pattern)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default)]
    pub pid_file: Option<String>,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            pid_file: None,
        }
    }
}

impl ExportSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| PfeError::Config(format!("export.listen {:?}: {e}", self.listen)))
    }
}

fn default_path() -> String {
    DEFAULT_PATH.into()
}
fn default_watch() -> bool {
    true
}
fn default_file_pattern() -> String {
    DEFAULT_FILE_PATTERN.into()
}
fn default_event_queue() -> usize {
    64
}
fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
