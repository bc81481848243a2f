//! Write-path commands: mutate one metric file without a running store.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use pfe_core::error::Result;
use pfe_core::metric::Metric;

use crate::config::ExporterConfig;
use crate::obs::metrics::GaugeRegistry;

/// Set a gauge to an absolute value and save it.
pub fn run_gauge(
    cfg: &ExporterConfig,
    name: &str,
    value: f64,
    labels: BTreeMap<String, String>,
) -> Result<()> {
    let dir = Path::new(&cfg.store.path);
    let mut metric = Metric::new(name, labels, Arc::new(GaugeRegistry::new()))?;
    metric.set(value)?;
    metric.save(dir)?;
    tracing::debug!(metric = name, value, file = %metric.file_name(), "gauge written");
    Ok(())
}

/// Increment a counter, starting from the stored value if the file exists.
///
/// A missing file starts at zero; an unreadable or corrupt one is an error
/// rather than being silently reset.
pub fn run_counter(
    cfg: &ExporterConfig,
    name: &str,
    inc: i64,
    labels: BTreeMap<String, String>,
) -> Result<()> {
    let dir = Path::new(&cfg.store.path);
    let mut metric = Metric::new(name, labels, Arc::new(GaugeRegistry::new()))?;
    match metric.load(dir) {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }
    metric.increment(inc)?;
    metric.save(dir)?;
    tracing::debug!(metric = name, inc, value = metric.value(), "counter written");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::fs;

    use pfe_core::metric::MetricRecord;

    use super::*;

    fn cfg_for(dir: &Path) -> ExporterConfig {
        let mut cfg = ExporterConfig::default();
        cfg.store.path = dir.to_string_lossy().into_owned();
        cfg
    }

    fn read(dir: &Path, file: &str) -> MetricRecord {
        let path = dir.join(file);
        MetricRecord::from_slice(&path, &fs::read(&path).unwrap()).unwrap()
    }

    #[test]
    fn gauge_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let labels = BTreeMap::from([("host".to_string(), "db1".to_string())]);
        run_gauge(&cfg_for(dir.path()), "disk_free", 12.5, labels).unwrap();

        let rec = read(dir.path(), "disk_free-host.json");
        assert_eq!(rec.value, 12.5);
        assert_eq!(rec.labels["host"], "db1");
    }

    #[test]
    fn counter_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = cfg_for(dir.path());
        run_counter(&cfg, "hits", 1, BTreeMap::new()).unwrap();
        run_counter(&cfg, "hits", 1, BTreeMap::new()).unwrap();
        run_counter(&cfg, "hits", 5, BTreeMap::new()).unwrap();
        run_counter(&cfg, "hits", -2, BTreeMap::new()).unwrap();

        assert_eq!(read(dir.path(), "hits.json").value, 5.0);
    }

    #[test]
    fn counter_refuses_to_reset_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hits.json"), b"{oops").unwrap();

        let err = run_counter(&cfg_for(dir.path()), "hits", 1, BTreeMap::new()).unwrap_err();
        assert_eq!(err.kind().as_str(), "FILE");
        assert_eq!(fs::read(dir.path().join("hits.json")).unwrap(), b"{oops");
    }

    #[test]
    fn gauge_refuses_infinite_value() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_gauge(&cfg_for(dir.path()), "x", f64::INFINITY, BTreeMap::new()).unwrap_err();
        assert_eq!(err.kind().as_str(), "INVALID");
        assert!(!dir.path().join("x.json").exists());
    }

    #[test]
    fn write_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = cfg_for(&dir.path().join("nope"));
        let err = run_gauge(&cfg, "x", 1.0, BTreeMap::new()).unwrap_err();
        assert_eq!(err.kind().as_str(), "WRITE");
    }
}
