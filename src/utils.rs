//! Utility functions for timestamps, logging and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Timestamp formatting for scratch file names and commit messages
//! - Scratch file name matching
//! - String truncation and URL redaction for logging
//! - JSON error detection for partially written snapshots
//! - File system validation for the data directory
//! - Atomic file replacement

use crate::config::NEWS_RESPONSE_PREFIX;
use crate::error::ConfigError;
use chrono::{DateTime, Local, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

static NEWS_RESPONSE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^{}\d{{8}}_\d{{6}}\.json$",
        regex::escape(NEWS_RESPONSE_PREFIX)
    ))
    .expect("scratch name pattern is a valid regex")
});

/// Timestamp used in scratch file names, e.g. `20250506_142501`.
pub fn file_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// [`file_stamp`] for the current local time.
pub fn file_stamp_now() -> String {
    file_stamp(&Local::now())
}

/// Whether `name` is a news API scratch response written by this tool.
///
/// Only `news_response_YYYYMMDD_HHMMSS.json` matches; saved error bodies
/// and hand-made files are left alone.
pub fn is_news_response_name(name: &str) -> bool {
    NEWS_RESPONSE_NAME.is_match(name)
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (on a character
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
    }
}

/// Render `url` with the value of query parameter `param` masked.
pub fn redact_query(url: &Url, param: &str) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == param { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    if pairs.is_empty() {
        return redacted.to_string();
    }
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// A snapshot left behind by an interrupted run fails to parse with an
/// EOF error; this tells that case apart from a body that was never JSON.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a marker file.
///
/// # Errors
///
/// Returns [`ConfigError::DataDir`] if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), ConfigError> {
    let to_err = |source| ConfigError::DataDir {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(path).await.map_err(to_err)?;
    // Try a small sync write using std fs (simpler error surface)
    let marker_path = path.join("..__write_check__");
    stdfs::File::create(&marker_path).map_err(to_err)?;
    let _ = stdfs::remove_file(&marker_path);
    info!("Data directory is writable");
    Ok(())
}

/// Replace `path` with `contents` without ever exposing a partial file.
///
/// Writes a sibling `.tmp` file and renames it over `path`.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, contents).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
