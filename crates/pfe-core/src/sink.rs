//! Labeled-gauge sink contract.
//!
//! A [`crate::metric::Metric`] pushes every mutation into a sink so that a scrape
//! always sees the in-memory value. The sink is injected (`Arc<dyn GaugeSink>`)
//! rather than being a process-global registry, which keeps it replaceable in tests.

use crate::error::Result;

/// Registration key of one gauge family: metric name plus sorted label names.
///
/// `id` tells holders of the same family apart, so a sink can keep a series
/// alive while any holder still publishes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesHandle {
    id: u64,
    name: String,
    label_names: Vec<String>,
}

impl SeriesHandle {
    pub fn new(name: impl Into<String>, label_names: Vec<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            label_names,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}

/// External registry of labeled gauges.
///
/// Implementations must treat `register` for an already registered
/// `(name, label_names)` pair as joining the family; a record only calls it
/// once per handle it holds.
pub trait GaugeSink: Send + Sync {
    /// Register (or join) the gauge family `name` with the given sorted label names.
    fn register(&self, name: &str, help: &str, label_names: &[String]) -> Result<SeriesHandle>;

    /// Set the value of the series identified by the sorted label values.
    fn set_value(&self, handle: &SeriesHandle, label_values: &[String], value: f64);

    /// Release this handle's claim on a single series. The series is dropped
    /// once no handle publishes it any more.
    fn remove_series(&self, handle: &SeriesHandle, label_values: &[String]);

    /// Release a handle obtained from `register`.
    fn unregister(&self, handle: SeriesHandle);
}
