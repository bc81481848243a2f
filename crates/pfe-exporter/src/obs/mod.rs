//! In-process metrics registry.
//!
//! User gauges loaded from the metric directory and the exporter's own health
//! gauges are both rendered by the `/metrics` handler in Prometheus text format.

pub mod metrics;
