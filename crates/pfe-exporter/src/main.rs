//! pfe: the Prometheus File Exporter.
//!
//! - `pfe export`  : watch a directory of metric files and serve `/metrics`
//! - `pfe gauge`   : write an absolute gauge value
//! - `pfe counter` : increment a stored value
//! - `pfe list`    : print the metrics found in the directory

use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use pfe_exporter::cli::{self, Cli};

fn init_logging(debug: bool, logfile: Option<&Path>) -> std::io::Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    match logfile {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => fmt().with_env_filter(filter).with_writer(std::io::stderr).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.debug, cli.logfile.as_deref()) {
        eprintln!("pfe: could not set up logging: {e}");
        return ExitCode::FAILURE;
    }

    let command = cli.command.name();
    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = e.kind().as_str(), error = %e, "command failed");
            eprintln!("pfe: could not run {command}: {e}");
            ExitCode::FAILURE
        }
    }
}
