//! Publishing the rendered feed to disk.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output path '{0}' has no file name")]
    NotAFile(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> OutputError + '_ {
    move |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Replaces `dst` with `content` without ever exposing a partial file.
///
/// Writes to a randomly named sibling, syncs it, then renames it over the
/// destination. Readers see either the old file or the new one. On failure
/// the temp file is removed and `dst` is left as it was.
pub fn write_atomic(dst: &Path, content: &[u8]) -> Result<(), OutputError> {
    let file_name = dst
        .file_name()
        .ok_or_else(|| OutputError::NotAFile(dst.to_path_buf()))?;

    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    // Unpredictable temp name; create_new refuses to follow a planted symlink.
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut temp_name = file_name.to_os_string();
    temp_name.push(format!(".tmp.{:016x}.{}", random_suffix, std::process::id()));
    let temp_path = dst.with_file_name(temp_name);

    let result = write_then_rename(&temp_path, dst, content);
    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

fn write_then_rename(temp_path: &Path, dst: &Path, content: &[u8]) -> Result<(), OutputError> {
    let mut temp_file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)
        .map_err(io_err(temp_path))?;

    temp_file.write_all(content).map_err(io_err(temp_path))?;
    temp_file.sync_all().map_err(io_err(temp_path))?;
    drop(temp_file);

    // Windows refuses to rename over an existing file.
    #[cfg(windows)]
    if dst.exists() {
        std::fs::remove_file(dst).map_err(io_err(dst))?;
    }

    std::fs::rename(temp_path, dst).map_err(io_err(dst))?;
    Ok(())
}
