//! Metrics registry for the exporter.
//!
//! Two kinds of series live here: the user gauges loaded from metric files
//! (kept in [`GaugeRegistry`], which is the [`GaugeSink`] handed to every
//! `Metric`) and the exporter's own health gauges ([`ExporterMetrics`]).
//! Labels are flattened into sorted key vectors to keep deterministic
//! ordering. Values are `f64` stored as bits in atomics.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use pfe_core::error::{PfeError, Result};
use pfe_core::sink::{GaugeSink, SeriesHandle};

const READ_ERRORS: &str = "pfe_file_read_errors";
const FILE_MTIME: &str = "pfe_file_mtime_seconds";
const METRICS_LOADED: &str = "pfe_metrics_loaded";
const DRAINING: &str = "pfe_draining";

/// Names the exporter renders itself; user files may not claim them.
const RESERVED: [&str; 4] = [READ_ERRORS, FILE_MTIME, METRICS_LOADED, DRAINING];

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Prometheus text representation of a sample value.
fn fmt_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".into()
    } else if v == f64::INFINITY {
        "+Inf".into()
    } else if v == f64::NEG_INFINITY {
        "-Inf".into()
    } else {
        v.to_string()
    }
}

fn write_sample(out: &mut String, name: &str, pairs: &[(&str, &str)], v: f64) {
    if pairs.is_empty() {
        let _ = writeln!(out, "{} {}", name, fmt_value(v));
        return;
    }
    let label_str = pairs
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",");
    let _ = writeln!(out, "{}{{{}}} {}", name, label_str, fmt_value(v));
}

/// Unlabeled gauge.
#[derive(Default)]
pub struct Gauge {
    bits: AtomicU64,
}

impl Gauge {
    pub fn set(&self, v: f64) {
        self.bits.store(v.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Increment by 1.
    pub fn inc(&self) {
        let _ = self
            .bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |b| {
                Some((f64::from_bits(b) + 1.0).to_bits())
            });
    }

    fn render(&self, name: &str, help: &str, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", name, help);
        let _ = writeln!(out, "# TYPE {} gauge", name);
        write_sample(out, name, &[], self.get());
    }
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<Vec<(String, String)>, AtomicU64>,
}

impl GaugeVec {
    fn key(labels: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut key: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        key.sort();
        key
    }

    pub fn set(&self, labels: &[(&str, &str)], v: f64) {
        self.map
            .entry(Self::key(labels))
            .or_insert_with(|| AtomicU64::new(0))
            .store(v.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> Option<f64> {
        self.map
            .get(&Self::key(labels))
            .map(|r| f64::from_bits(r.value().load(Ordering::Relaxed)))
    }

    pub fn remove(&self, labels: &[(&str, &str)]) {
        self.map.remove(&Self::key(labels));
    }

    /// Render in Prometheus text exposition format.
    fn render(&self, name: &str, help: &str, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", name, help);
        let _ = writeln!(out, "# TYPE {} gauge", name);
        let mut rows: Vec<(Vec<(String, String)>, f64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), f64::from_bits(r.value().load(Ordering::Relaxed))))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, val) in rows {
            let pairs: Vec<(&str, &str)> =
                key.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            write_sample(out, name, &pairs, val);
        }
    }
}

/// One registered gauge family: fixed label names, any number of series.
struct Family {
    help: String,
    label_names: Vec<String>,
    holders: usize,
    series: HashMap<Vec<String>, Series>,
}

/// Last published value plus the handles currently publishing it.
struct Series {
    value: f64,
    holders: HashSet<u64>,
}

/// Registry of gauges loaded from metric files.
///
/// Families are keyed by metric name. Several records may share a family as
/// long as they agree on label names; the family disappears once the last
/// holder unregisters. Two records with the same label values share one
/// series, which stays until both have released it.
#[derive(Default)]
pub struct GaugeRegistry {
    families: DashMap<String, Family>,
    next_id: AtomicU64,
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of one series, if present.
    pub fn value(&self, name: &str, label_values: &[&str]) -> Option<f64> {
        let fam = self.families.get(name)?;
        let key: Vec<String> = label_values.iter().map(|s| s.to_string()).collect();
        fam.series.get(&key).map(|s| s.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.families.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Render all families, sorted by name.
    pub fn render(&self, out: &mut String) {
        let mut names: Vec<String> = self.families.iter().map(|r| r.key().clone()).collect();
        names.sort();
        for name in names {
            let Some(fam) = self.families.get(&name) else { continue };
            let _ = writeln!(out, "# HELP {} {}", name, fam.help);
            let _ = writeln!(out, "# TYPE {} gauge", name);
            let mut rows: Vec<(&Vec<String>, f64)> =
                fam.series.iter().map(|(k, s)| (k, s.value)).collect();
            rows.sort_by(|a, b| a.0.cmp(b.0));
            for (values, v) in rows {
                let pairs: Vec<(&str, &str)> = fam
                    .label_names
                    .iter()
                    .zip(values.iter())
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                write_sample(out, &name, &pairs, v);
            }
        }
    }
}

impl GaugeSink for GaugeRegistry {
    fn register(&self, name: &str, help: &str, label_names: &[String]) -> Result<SeriesHandle> {
        if RESERVED.contains(&name) {
            return Err(PfeError::Sink(format!("{name} is reserved for the exporter")));
        }
        let mut fam = self.families.entry(name.to_string()).or_insert_with(|| Family {
            help: help.to_string(),
            label_names: label_names.to_vec(),
            holders: 0,
            series: HashMap::new(),
        });
        if fam.label_names != label_names {
            return Err(PfeError::Sink(format!(
                "{name} already registered with labels [{}], got [{}]",
                fam.label_names.join(","),
                label_names.join(",")
            )));
        }
        fam.holders += 1;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(SeriesHandle::new(name, label_names.to_vec()).with_id(id))
    }

    fn set_value(&self, handle: &SeriesHandle, label_values: &[String], value: f64) {
        if let Some(mut fam) = self.families.get_mut(handle.name()) {
            let series = fam.series.entry(label_values.to_vec()).or_insert_with(|| Series {
                value,
                holders: HashSet::new(),
            });
            series.value = value;
            series.holders.insert(handle.id());
        }
    }

    fn remove_series(&self, handle: &SeriesHandle, label_values: &[String]) {
        let Some(mut fam) = self.families.get_mut(handle.name()) else {
            return;
        };
        let released = match fam.series.get_mut(label_values) {
            Some(series) => {
                series.holders.remove(&handle.id());
                series.holders.is_empty()
            }
            None => false,
        };
        if released {
            fam.series.remove(label_values);
        }
    }

    fn unregister(&self, handle: SeriesHandle) {
        self.families.remove_if_mut(handle.name(), |_, fam| {
            fam.holders = fam.holders.saturating_sub(1);
            fam.holders == 0
        });
    }
}

/// The exporter's own health gauges.
#[derive(Default)]
pub struct ExporterMetrics {
    pub file_read_errors: Gauge,
    pub file_mtime: GaugeVec,
    pub metrics_loaded: Gauge,
    draining: AtomicBool,
}

impl ExporterMetrics {
    /// Mark draining state.
    pub fn set_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }
    /// Return whether draining is active.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    /// Render the exporter gauges followed by every user gauge.
    pub fn render(&self, gauges: &GaugeRegistry) -> String {
        let mut out = String::new();
        self.file_read_errors
            .render(READ_ERRORS, "Number of times files failed to read", &mut out);
        self.file_mtime
            .render(FILE_MTIME, "Unix mtime of read files", &mut out);
        self.metrics_loaded
            .render(METRICS_LOADED, "Number of metric files currently loaded", &mut out);
        let _ = writeln!(
            out,
            "# TYPE {DRAINING} gauge\n{DRAINING} {}",
            if self.is_draining() { 1 } else { 0 }
        );
        gauges.render(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn register_is_shared_and_refcounted() {
        let reg = GaugeRegistry::new();
        let a = reg.register("jobs", "help", &names(&["host"])).unwrap();
        let b = reg.register("jobs", "help", &names(&["host"])).unwrap();
        assert_eq!(a.name(), b.name());
        assert_eq!(a.label_names(), b.label_names());
        assert_ne!(a.id(), b.id());

        reg.set_value(&a, &names(&["x"]), 1.0);
        reg.set_value(&b, &names(&["y"]), 2.0);
        assert_eq!(reg.value("jobs", &["x"]), Some(1.0));
        assert_eq!(reg.value("jobs", &["y"]), Some(2.0));

        reg.remove_series(&a, &names(&["x"]));
        reg.unregister(a);
        assert!(reg.contains("jobs"));
        assert_eq!(reg.value("jobs", &["x"]), None);

        reg.remove_series(&b, &names(&["y"]));
        reg.unregister(b);
        assert!(!reg.contains("jobs"));
        assert!(reg.is_empty());
    }

    #[test]
    fn shared_series_survives_until_last_holder_releases() {
        let reg = GaugeRegistry::new();
        let a = reg.register("x", "help", &[]).unwrap();
        let b = reg.register("x", "help", &[]).unwrap();
        reg.set_value(&a, &[], 1.0);
        reg.set_value(&b, &[], 1.0);

        reg.remove_series(&a, &[]);
        reg.unregister(a);
        assert_eq!(reg.value("x", &[]), Some(1.0));

        reg.set_value(&b, &[], 4.0);
        assert_eq!(reg.value("x", &[]), Some(4.0));

        reg.remove_series(&b, &[]);
        assert_eq!(reg.value("x", &[]), None);
        reg.unregister(b);
        assert!(reg.is_empty());
    }

    #[test]
    fn label_conflict_and_reserved_names_rejected() {
        let reg = GaugeRegistry::new();
        reg.register("jobs", "help", &names(&["host"])).unwrap();
        let err = reg.register("jobs", "help", &names(&["zone"])).unwrap_err();
        assert_eq!(err.kind().as_str(), "SINK");

        assert!(reg.register(READ_ERRORS, "help", &[]).is_err());
    }

    #[test]
    fn render_is_sorted_and_escaped() {
        let reg = GaugeRegistry::new();
        let b = reg.register("zeta", "Generated metric from zeta.json", &[]).unwrap();
        reg.set_value(&b, &[], f64::INFINITY);
        let a = reg
            .register("alpha", "Generated metric from alpha-host.json", &names(&["host"]))
            .unwrap();
        reg.set_value(&a, &names(&["a\"b"]), 2.5);

        let mut out = String::new();
        reg.render(&mut out);
        let alpha = out.find("# TYPE alpha gauge").unwrap();
        let zeta = out.find("# TYPE zeta gauge").unwrap();
        assert!(alpha < zeta);
        assert!(out.contains("alpha{host=\"a\\\"b\"} 2.5\n"));
        assert!(out.contains("zeta +Inf\n"));
    }

    #[test]
    fn exporter_metrics_render() {
        let m = ExporterMetrics::default();
        m.file_read_errors.inc();
        m.file_read_errors.inc();
        m.file_mtime.set(&[("file", "/m/a.json")], 1700000000.0);
        m.set_draining();

        let out = m.render(&GaugeRegistry::new());
        assert!(out.contains("pfe_file_read_errors 2\n"));
        assert!(out.contains("pfe_file_mtime_seconds{file=\"/m/a.json\"} 1700000000\n"));
        assert!(out.contains("pfe_draining 1"));
    }
}
