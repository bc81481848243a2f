//! On-disk persistence of metric files.
//!
//! Writes go to a temp file in the target directory which is then renamed over
//! the final name, so a reader never observes a partially written file.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::Builder;

use crate::error::{PfeError, Result};

/// Temp files are dot-prefixed so the metric-file filter never picks them up.
const TEMP_PREFIX: &str = ".pfe-";
const TEMP_SUFFIX: &str = ".tmp";

/// Atomically replace `dir/file_name` with `contents`.
///
/// On any failure the previous file (if any) is left untouched and the temp
/// file is removed.
pub fn write_atomic(dir: &Path, file_name: &str, contents: &[u8]) -> Result<()> {
    let target = dir.join(file_name);
    let write_err = |source| PfeError::Write {
        path: target.clone(),
        source,
    };

    let mut tmp = Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)
        .map_err(write_err)?;

    tmp.write_all(contents).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    set_world_readable(tmp.path()).map_err(write_err)?;

    tmp.persist(&target).map_err(|e| write_err(e.error))?;
    tracing::debug!(path = %target.display(), bytes = contents.len(), "metric file written");
    Ok(())
}

/// Read a whole metric file.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| PfeError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn set_world_readable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_world_readable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn write_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        write_atomic(dir.path(), "a.json", b"one").unwrap();
        write_atomic(dir.path(), "a.json", b"two").unwrap();

        assert_eq!(read_file(&dir.path().join("a.json")).unwrap(), b"two");
        assert_eq!(entries(dir.path()), vec!["a.json".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn written_file_is_0644() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write_atomic(dir.path(), "a.json", b"{}").unwrap();
        let mode = fs::metadata(dir.path().join("a.json")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn write_into_missing_dir_fails_with_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = write_atomic(&missing, "a.json", b"{}").unwrap_err();
        assert_eq!(err.kind().as_str(), "WRITE");
        assert!(err.io_error().is_some());
        assert!(!missing.join("a.json").exists());
    }

    #[test]
    fn read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_file(&dir.path().join("gone.json")).unwrap_err();
        assert!(err.is_not_found());
    }
}
