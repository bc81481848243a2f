//! pfe core: metric records, their on-disk form, and the gauge sink contract.
//!
//! This crate defines the file format and persistence rules shared by the
//! exporter and the write-path CLI. It carries no async runtime or HTTP
//! dependencies so a short-lived writer process stays cheap.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. A corrupt metric
//! file or a failed write must surface as `PfeError`, never bring down the
//! process that watches the directory.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod metric;
pub mod naming;
pub mod sink;
pub mod storage;

/// Shared result type.
pub use error::{ErrorKind, PfeError, Result};
pub use metric::{Metric, MetricKind, MetricRecord};
pub use naming::MetricFileFilter;
pub use sink::{GaugeSink, SeriesHandle};
