//! pfe exporter library entry.
//!
//! This crate wires the metric directory store, the filesystem notifier, the
//! gauge registry, and the HTTP scrape endpoints into the `pfe` binary. It is
//! intended to be consumed by `main.rs` and by integration tests.

pub mod app_state;
pub mod cli;
pub mod config;
pub mod obs;
pub mod ops;
pub mod router;
pub mod store;
pub mod watch;
