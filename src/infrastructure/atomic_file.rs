//! Whole-file replacement through a temporary file and rename.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::domain::{AppError, Result};

/// Replaces the contents of `path` with `bytes`.
///
/// The data is staged in a temporary file in the same directory and renamed
/// over the target, so readers see either the old or the new file, never a
/// partial one. Permissions of an existing target are kept.
///
/// # Errors
/// Returns error if the directory cannot be created or the file cannot be
/// written or renamed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    fs::create_dir_all(dir)
        .map_err(|e| AppError::io(format!("Failed to create directory {}", dir.display()), e))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| AppError::io("Failed to create temporary file", e))?;

    tmp.write_all(bytes)
        .map_err(|e| AppError::io("Failed to write temporary file", e))?;

    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(|e| AppError::io("Failed to copy file permissions", e))?;
    }

    tmp.as_file()
        .sync_all()
        .map_err(|e| AppError::io("Failed to flush temporary file", e))?;

    tmp.persist(path).map_err(|e| {
        AppError::io(format!("Failed to replace {}", path.display()), e.error)
    })?;

    Ok(())
}
