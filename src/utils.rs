//! Small helpers for log output and file system checks.

use crate::error::StoreError;
use std::error::Error;
use std::fs as stdfs;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (backing off to a character
/// boundary) with an ellipsis and the number of dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Open `path` for appending log lines, creating its directory if needed.
///
/// The file is never rotated.
pub fn log_file_appender(path: &Path) -> Result<RollingFileAppender, Box<dyn Error>> {
    let name = path
        .file_name()
        .ok_or_else(|| format!("log file path {} has no file name", path.display()))?
        .to_string_lossy()
        .into_owned();
    let dir = output_dir(path);
    stdfs::create_dir_all(&dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)?;
    Ok(appender)
}

/// Directory a dataset file will be written into.
pub fn output_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and immediately deletes a
/// probe file.
///
/// # Errors
///
/// Returns [`StoreError::Io`] if the directory cannot be created or written.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), StoreError> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(path).await.map_err(io_error)?;

    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path).map_err(io_error)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
