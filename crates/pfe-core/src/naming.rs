//! Name rules: which files count as metric files and which metric/label names are valid.

use std::path::Path;

use regex::Regex;

use crate::error::{PfeError, Result};

/// Default base-name pattern of metric files: lowercase-leading, `.json` suffix.
///
/// The atomic writer names its temp files `.pfe-*.tmp`, which never match.
pub const DEFAULT_FILE_PATTERN: &str = r"^[a-z].*\.json$";

/// Predicate on base names deciding whether a file is scanned and watched.
#[derive(Debug, Clone)]
pub struct MetricFileFilter {
    pattern: Regex,
}

impl MetricFileFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| PfeError::Config(format!("invalid file pattern {pattern:?}: {e}")))?;
        Ok(Self { pattern })
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    /// Match on the base name of `path` only; directories in the path are ignored.
    pub fn matches(&self, path: &Path) -> bool {
        match path.file_name().and_then(|n| n.to_str()) {
            Some(base) => self.pattern.is_match(base),
            None => false,
        }
    }
}

/// Prometheus metric name: `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn validate_metric_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(PfeError::InvalidName("metric name must not be empty".into()));
    };
    let head_ok = first.is_ascii_alphabetic() || first == '_' || first == ':';
    if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':') {
        return Err(PfeError::InvalidName(format!("invalid metric name {name:?}")));
    }
    Ok(())
}

/// Prometheus label name: `[a-zA-Z_][a-zA-Z0-9_]*`, `__` prefix reserved.
pub fn validate_label_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(PfeError::InvalidName("label name must not be empty".into()));
    };
    let head_ok = first.is_ascii_alphabetic() || first == '_';
    if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') || name.starts_with("__") {
        return Err(PfeError::InvalidName(format!("invalid label name {name:?}")));
    }
    Ok(())
}
