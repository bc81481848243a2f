//! Top-level facade crate for pfe.
//!
//! Re-exports the core metric primitives and the exporter library so users can
//! depend on a single crate.

pub mod core {
    pub use pfe_core::*;
}

pub mod exporter {
    pub use pfe_exporter::*;
}
