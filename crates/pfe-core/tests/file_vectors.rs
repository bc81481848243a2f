//! Metric file vector tests: decode fixtures from `tests/vectors`.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Deserialize;

use pfe_core::naming::DEFAULT_FILE_PATTERN;
use pfe_core::{GaugeSink, Metric, MetricFileFilter, Result, SeriesHandle};

#[derive(Debug, Deserialize)]
struct Case {
    file: String,
    #[serde(default)]
    expect: Option<Expect>,
    #[serde(default)]
    expect_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Expect {
    name: String,
    file_name: String,
    timestamp: i64,
    value: f64,
}

#[derive(Default)]
struct MapSink {
    values: Mutex<HashMap<(String, Vec<String>), f64>>,
}

impl GaugeSink for MapSink {
    fn register(&self, name: &str, _help: &str, label_names: &[String]) -> Result<SeriesHandle> {
        Ok(SeriesHandle::new(name, label_names.to_vec()))
    }

    fn set_value(&self, handle: &SeriesHandle, label_values: &[String], value: f64) {
        self.values
            .lock()
            .unwrap()
            .insert((handle.name().to_string(), label_values.to_vec()), value);
    }

    fn remove_series(&self, handle: &SeriesHandle, label_values: &[String]) {
        self.values
            .lock()
            .unwrap()
            .remove(&(handle.name().to_string(), label_values.to_vec()));
    }

    fn unregister(&self, _handle: SeriesHandle) {}
}

fn vector_path(name: &str) -> String {
    format!("tests/vectors/{name}")
}

#[test]
fn file_vectors() {
    let cases: Vec<Case> =
        serde_json::from_str(&fs::read_to_string(vector_path("cases.json")).unwrap()).unwrap();
    assert!(!cases.is_empty());

    for case in cases {
        let path = vector_path(&case.file);
        let bytes = fs::read(&path).unwrap();
        let sink = Arc::new(MapSink::default());
        let res = Metric::decode(Path::new(&path), &bytes, sink.clone());

        if let Some(kind) = case.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.kind().as_str(), kind, "vector={}", case.file);
            continue;
        }

        let metric = res.expect("expected ok metric");
        let ex = case.expect.expect("missing expect block");
        assert_eq!(metric.name(), ex.name, "vector={}", case.file);
        assert_eq!(metric.file_name(), ex.file_name, "vector={}", case.file);
        assert_eq!(metric.timestamp(), ex.timestamp, "vector={}", case.file);
        assert_eq!(metric.value(), ex.value, "vector={}", case.file);

        let key = (metric.name().to_string(), metric.record().label_values());
        assert_eq!(
            sink.values.lock().unwrap().get(&key).copied(),
            Some(ex.value),
            "decoded value must be visible in the sink, vector={}",
            case.file
        );
    }
}

#[test]
fn fixtures_follow_the_file_filter() {
    let filter = MetricFileFilter::new(DEFAULT_FILE_PATTERN).unwrap();
    for name in ["valid.json", "labeled.json", "cases.json"] {
        assert!(filter.matches(Path::new(&vector_path(name))), "{name}");
    }
}

#[test]
fn save_into_directory_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = fs::read(vector_path("labeled.json")).unwrap();
    let sink = Arc::new(MapSink::default());
    let original = Metric::decode(Path::new("labeled.json"), &bytes, sink.clone()).unwrap();

    original.save(dir.path()).unwrap();
    let written = dir.path().join("queue_depth-host-zone.json");
    assert!(written.exists());

    let reloaded = Metric::decode(&written, &fs::read(&written).unwrap(), sink).unwrap();
    assert_eq!(reloaded.record(), original.record());
}
