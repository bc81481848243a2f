//! Command-line surface of the `pfe` binary.
//!
//! Flags override the optional YAML config; commands that only write a metric
//! file never start a store.

mod export;
mod list;
mod write;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use pfe_core::error::Result;

use crate::config::{self, ExporterConfig};

pub use export::{run_export, shutdown_signal};
pub use list::{run_list, write_listing};
pub use write::{run_counter, run_gauge};

#[derive(Debug, Parser)]
#[command(name = "pfe", version, about = "The Prometheus File Exporter")]
pub struct Cli {
    /// YAML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to monitor for metric files
    #[arg(long, global = true)]
    pub path: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The file to log to
    #[arg(long, global = true)]
    pub logfile: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Exports the data over HTTP
    Export {
        /// The port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Write running PID to a file
        #[arg(long = "pid")]
        pid_file: Option<String>,
    },

    /// Writes to a gauge metric
    // `guage` is an old typo kept as a hidden alias.
    #[command(alias = "guage")]
    Gauge {
        /// The name of the metric to write
        metric: String,

        /// The value to write
        #[arg(allow_negative_numbers = true)]
        value: f64,

        /// Label as name=value, may repeat
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
    },

    /// Increments a counter metric
    Counter {
        /// The metric name to write
        metric: String,

        /// How much to increment the counter with
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        inc: i64,

        /// Label as name=value, may repeat
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
    },

    /// Lists known metrics
    List {
        /// Limit output to metrics containing the filter text
        #[arg(default_value = "")]
        filter: String,
    },
}

fn parse_label(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("label must be name=value, got {s:?}")),
    }
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Export { .. } => "export",
            Command::Gauge { .. } => "gauge",
            Command::Counter { .. } => "counter",
            Command::List { .. } => "list",
        }
    }
}

impl Cli {
    /// Effective config: file (if given) or defaults, then flag overrides.
    pub fn settings(&self) -> Result<ExporterConfig> {
        let mut cfg = match &self.config {
            Some(p) => config::load_from_file(&p.to_string_lossy())?,
            None => ExporterConfig::default(),
        };

        if let Some(path) = &self.path {
            cfg.store.path = path.clone();
        }
        if let Command::Export { port, pid_file } = &self.command {
            if let Some(port) = port {
                let mut addr = cfg.export.listen_addr()?;
                addr.set_port(*port);
                cfg.export.listen = addr.to_string();
            }
            if pid_file.is_some() {
                cfg.export.pid_file = pid_file.clone();
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

/// Dispatch the parsed command.
pub async fn run(cli: Cli) -> Result<()> {
    let cfg = cli.settings()?;
    match cli.command {
        Command::Export { .. } => run_export(cfg).await,
        Command::Gauge { metric, value, labels } => {
            run_gauge(&cfg, &metric, value, labels.into_iter().collect())
        }
        Command::Counter { metric, inc, labels } => {
            run_counter(&cfg, &metric, inc, labels.into_iter().collect())
        }
        Command::List { filter } => {
            let mut stdout = std::io::stdout().lock();
            run_list(&cfg, &filter, &mut stdout).await
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn parses_guage_alias_and_labels() {
        let cli = Cli::try_parse_from([
            "pfe", "--path", "/tmp/m", "guage", "jobs", "-3.5", "--label", "host=x",
        ])
        .unwrap();
        match cli.command {
            Command::Gauge { metric, value, labels } => {
                assert_eq!(metric, "jobs");
                assert_eq!(value, -3.5);
                assert_eq!(labels, vec![("host".to_string(), "x".to_string())]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn counter_defaults_to_one() {
        let cli = Cli::try_parse_from(["pfe", "counter", "hits"]).unwrap();
        assert!(matches!(cli.command, Command::Counter { inc: 1, .. }));
    }

    #[test]
    fn bad_label_is_rejected() {
        assert!(Cli::try_parse_from(["pfe", "gauge", "x", "1", "--label", "novalue"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "pfe", "--path", "/srv/m", "export", "--port", "9100", "--pid", "/run/pfe.pid",
        ])
        .unwrap();
        let cfg = cli.settings().unwrap();
        assert_eq!(cfg.store.path, "/srv/m");
        assert_eq!(cfg.export.listen, "0.0.0.0:9100");
        assert_eq!(cfg.export.pid_file.as_deref(), Some("/run/pfe.pid"));
    }
}
