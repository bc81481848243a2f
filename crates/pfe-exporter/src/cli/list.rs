//! `pfe list`: one-shot scan of the directory, printed for humans.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat};
use tokio::sync::watch;

use pfe_core::error::{PfeError, Result};
use pfe_core::metric::MetricRecord;

use crate::config::ExporterConfig;
use crate::obs::metrics::{ExporterMetrics, GaugeRegistry};
use crate::store::{MetricsStore, StoreOptions};

pub async fn run_list<W: Write>(cfg: &ExporterConfig, filter: &str, out: &mut W) -> Result<()> {
    let (_shutdown, rx) = watch::channel(false);
    let opts = StoreOptions::new(&cfg.store.path)
        .watch(false)
        .filter(cfg.store.file_filter()?);
    let store = MetricsStore::new(
        opts,
        Arc::new(GaugeRegistry::new()),
        Arc::new(ExporterMetrics::default()),
        rx,
    )
    .await?;

    write_listing(store.path(), &store.snapshot(), filter, out)
        .map_err(|e| PfeError::Internal(format!("write listing failed: {e}")))
}

/// Render the listing; metrics whose name does not contain `filter` are skipped.
pub fn write_listing<W: Write>(
    dir: &Path,
    metrics: &BTreeMap<PathBuf, MetricRecord>,
    filter: &str,
    out: &mut W,
) -> std::io::Result<()> {
    writeln!(out, "Listing metrics found in {}\n", dir.display())?;

    for (file, m) in metrics {
        if !filter.is_empty() && !m.name.contains(filter) {
            continue;
        }
        let updated =
            DateTime::from_timestamp_nanos(m.timestamp).to_rfc3339_opts(SecondsFormat::Secs, true);

        writeln!(out, "{} ({})", m.name, file.display())?;
        writeln!(out, "     Type: {}", m.kind)?;
        writeln!(out, "  Updated: {}", updated)?;
        writeln!(out, "    Value: {}", m.value)?;
        writeln!(out)?;
    }
    Ok(())
}
