//! Shared error type across pfe crates.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification used by callers deciding whether an error is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Store construction could not resolve or watch its directory.
    Startup,
    /// A single metric file could not be read or parsed.
    File,
    /// Persisting a metric failed.
    Write,
    /// Bad user input (names, labels, unstorable values, config).
    Invalid,
    /// The gauge sink refused a registration.
    Sink,
    /// Runtime failure outside the metric files (socket, signals).
    Internal,
}

impl ErrorKind {
    /// String representation used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Startup => "STARTUP",
            ErrorKind::File => "FILE",
            ErrorKind::Write => "WRITE",
            ErrorKind::Invalid => "INVALID",
            ErrorKind::Sink => "SINK",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PfeError>;

/// Unified error type used by core and exporter.
#[derive(Debug, Error)]
pub enum PfeError {
    #[error("cannot resolve directory {path}: {source}")]
    PathResolution {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("filesystem notifier setup failed for {path}: {reason}")]
    Subscription { path: PathBuf, reason: String },
    #[error("read {path} failed: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("decode {path} failed: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("encode metric failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("write {path} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("metric {name} has value {value}, which cannot be stored")]
    NonFinite { name: String, value: f64 },
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("sink: {0}")]
    Sink(String),
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl PfeError {
    /// Map an error to its coarse kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PfeError::PathResolution { .. } | PfeError::Subscription { .. } => ErrorKind::Startup,
            PfeError::Read { .. } | PfeError::Decode { .. } => ErrorKind::File,
            PfeError::Encode(_) | PfeError::Write { .. } => ErrorKind::Write,
            PfeError::NonFinite { .. } | PfeError::InvalidName(_) | PfeError::Config(_) => {
                ErrorKind::Invalid
            }
            PfeError::Sink(_) => ErrorKind::Sink,
            PfeError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when a read failed because the file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PfeError::Read { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// The underlying I/O error, if any.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            PfeError::PathResolution { source, .. }
            | PfeError::Read { source, .. }
            | PfeError::Write { source, .. } => Some(source),
            _ => None,
        }
    }
}
