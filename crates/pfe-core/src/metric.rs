//! Metric record: one named, labeled, timestamped gauge persisted as a JSON file.
//!
//! [`MetricRecord`] is the plain serialized form. [`Metric`] wraps a record
//! together with its sink registration so every mutation is immediately
//! visible to scrapes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PfeError, Result};
use crate::naming::{validate_label_name, validate_metric_name};
use crate::sink::{GaugeSink, SeriesHandle};
use crate::storage;

/// Discriminator of the on-disk record. Only gauges exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    #[default]
    Gauge,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Gauge => f.write_str("gauge"),
        }
    }
}

/// Serialized form: `{"type":"gauge","name":..,"labels":{..},"timestamp":ns,"value":f64}`.
///
/// Labels live in a `BTreeMap`, so iteration is always in sorted label-name order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    #[serde(rename = "type", default)]
    pub kind: MetricKind,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub labels: BTreeMap<String, String>,
    pub timestamp: i64,
    pub value: f64,
}

fn null_as_empty<'de, D>(de: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(de)?.unwrap_or_default())
}

impl MetricRecord {
    /// Decode and validate a record. `path` is only used for error context.
    pub fn from_slice(path: &Path, bytes: &[u8]) -> Result<Self> {
        let record: MetricRecord = serde_json::from_slice(bytes).map_err(|source| PfeError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        record.validate()?;
        Ok(record)
    }

    /// Encode for disk. JSON has no NaN or infinities, so those values are refused.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        if !self.value.is_finite() {
            return Err(PfeError::NonFinite {
                name: self.name.clone(),
                value: self.value,
            });
        }
        serde_json::to_vec(self).map_err(PfeError::Encode)
    }

    pub fn validate(&self) -> Result<()> {
        validate_metric_name(&self.name)?;
        for k in self.labels.keys() {
            validate_label_name(k)?;
        }
        Ok(())
    }

    /// File name derived from the name and the label-name set only.
    pub fn file_name(&self) -> String {
        if self.labels.is_empty() {
            return format!("{}.json", self.name);
        }
        format!("{}-{}.json", self.name, self.label_names().join("-"))
    }

    /// Sorted label names.
    pub fn label_names(&self) -> Vec<String> {
        self.labels.keys().cloned().collect()
    }

    /// Label values in the same order as [`Self::label_names`].
    pub fn label_values(&self) -> Vec<String> {
        self.labels.values().cloned().collect()
    }
}

/// Current wall clock in nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn help_text(record: &MetricRecord) -> String {
    format!("Generated metric from {}", record.file_name())
}

/// A record bound to a gauge sink.
pub struct Metric {
    record: MetricRecord,
    sink: Arc<dyn GaugeSink>,
    series: Option<SeriesHandle>,
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("record", &self.record)
            .field("registered", &self.series.is_some())
            .finish()
    }
}

impl Metric {
    /// Create a fresh gauge with value 0. Nothing is pushed to the sink until the first mutation.
    pub fn new(
        name: impl Into<String>,
        labels: BTreeMap<String, String>,
        sink: Arc<dyn GaugeSink>,
    ) -> Result<Self> {
        let record = MetricRecord {
            kind: MetricKind::Gauge,
            name: name.into(),
            labels,
            timestamp: now_nanos(),
            value: 0.0,
        };
        record.validate()?;
        Ok(Self {
            record,
            sink,
            series: None,
        })
    }

    /// Wrap a decoded record and publish its value, keeping the decoded timestamp.
    pub fn from_record(record: MetricRecord, sink: Arc<dyn GaugeSink>) -> Result<Self> {
        record.validate()?;
        let mut metric = Self {
            record,
            sink,
            series: None,
        };
        metric.publish()?;
        Ok(metric)
    }

    /// Decode JSON bytes into a metric bound to `sink`.
    pub fn decode(path: &Path, bytes: &[u8], sink: Arc<dyn GaugeSink>) -> Result<Self> {
        let record = MetricRecord::from_slice(path, bytes)?;
        Self::from_record(record, sink)
    }

    pub fn record(&self) -> &MetricRecord {
        &self.record
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn value(&self) -> f64 {
        self.record.value
    }

    pub fn timestamp(&self) -> i64 {
        self.record.timestamp
    }

    pub fn file_name(&self) -> String {
        self.record.file_name()
    }

    pub fn is_registered(&self) -> bool {
        self.series.is_some()
    }

    pub fn increment(&mut self, delta: i64) -> Result<()> {
        self.record.value += delta as f64;
        self.touch();
        self.publish()
    }

    pub fn decrement(&mut self, delta: i64) -> Result<()> {
        self.record.value -= delta as f64;
        self.touch();
        self.publish()
    }

    pub fn set(&mut self, value: f64) -> Result<()> {
        self.record.value = value;
        self.touch();
        self.publish()
    }

    /// Replace the record with freshly decoded content from the same file.
    ///
    /// The decoded timestamp is kept. A change of name or label names moves the
    /// registration; a change of label values drops the stale series. If the
    /// sink refuses the new family, the metric is left exactly as it was.
    pub fn apply(&mut self, record: MetricRecord) -> Result<()> {
        record.validate()?;
        let same_family = record.name == self.record.name
            && record.labels.keys().eq(self.record.labels.keys());

        match &self.series {
            Some(handle) if same_family => {
                if !record.labels.values().eq(self.record.labels.values()) {
                    self.sink.remove_series(handle, &self.record.label_values());
                }
            }
            _ => {
                let handle = self.sink.register(
                    &record.name,
                    &help_text(&record),
                    &record.label_names(),
                )?;
                self.unregister();
                self.series = Some(handle);
            }
        }
        self.record = record;
        self.publish()
    }

    /// Persist to `dir/file_name()` with an atomic write-then-rename.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let bytes = self.record.to_vec()?;
        storage::write_atomic(dir, &self.file_name(), &bytes)
    }

    /// Reload from `dir/file_name()`.
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        let path = dir.join(self.file_name());
        let bytes = storage::read_file(&path)?;
        let record = MetricRecord::from_slice(&path, &bytes)?;
        self.apply(record)
    }

    /// Remove this metric's series from the sink. Safe to call repeatedly.
    pub fn unregister(&mut self) {
        if let Some(handle) = self.series.take() {
            self.sink.remove_series(&handle, &self.record.label_values());
            self.sink.unregister(handle);
        }
    }

    fn touch(&mut self) {
        self.record.timestamp = now_nanos().max(self.record.timestamp.saturating_add(1));
    }

    fn publish(&mut self) -> Result<()> {
        if self.series.is_none() {
            let handle = self.sink.register(
                &self.record.name,
                &help_text(&self.record),
                &self.record.label_names(),
            )?;
            self.series = Some(handle);
        }
        if let Some(handle) = &self.series {
            self.sink
                .set_value(handle, &self.record.label_values(), self.record.value);
        }
        Ok(())
    }
}
