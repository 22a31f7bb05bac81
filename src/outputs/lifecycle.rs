//! Replacing the published document with a freshly staged one.
//!
//! The order is fixed:
//!
//! 1. **Cleanup**: delete every news API scratch response and the RSS
//!    snapshot. Best effort; failures are logged and counted.
//! 2. **Replace**: the staged document takes the canonical name via a
//!    single rename over the existing file, so readers see either the old
//!    document or the new one, never a truncated file.

use crate::config::DataLayout;
use crate::error::LifecycleError;
use crate::utils::is_news_response_name;
use std::io;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// Outcome of the best-effort cleanup step.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Every `news_response_YYYYMMDD_HHMMSS.json` directly inside the data directory.
pub async fn list_news_responses(layout: &DataLayout) -> io::Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(&layout.data_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if is_news_response_name(name) && entry.file_type().await?.is_file() {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

/// Delete scratch artifacts. Never fails; see [`CleanupReport::failed`].
#[instrument(level = "info", skip_all, fields(dir = %layout.data_dir.display()))]
pub async fn cleanup_scratch(layout: &DataLayout) -> CleanupReport {
    let mut report = CleanupReport::default();

    let mut targets = match list_news_responses(layout).await {
        Ok(files) => files,
        Err(e) => {
            error!(error = %e, "Failed to list scratch responses; skipping them");
            Vec::new()
        }
    };
    let rss = layout.rss_snapshot_path();
    if fs::try_exists(&rss).await.unwrap_or(false) {
        targets.push(rss);
    }

    for path in targets {
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "Removed scratch file");
                report.removed.push(path);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
                report.failed.push(path);
            }
        }
    }

    info!(removed = report.removed.len(), failed = report.failed.len(), "Scratch cleanup finished");
    report
}

/// Rename the staged document over the canonical one.
///
/// # Errors
///
/// - [`LifecycleError::StagedMissing`] if nothing is staged
/// - [`LifecycleError::CanonicalIsDirectory`] if the canonical path is a directory
/// - [`LifecycleError::Rename`] if the rename itself fails; the previous
///   canonical document, if any, is then left untouched
#[instrument(level = "info", skip_all)]
pub async fn promote(layout: &DataLayout) -> Result<PathBuf, LifecycleError> {
    let staged = layout.staged_path();
    let canonical = layout.canonical_path();

    if !fs::try_exists(&staged).await.unwrap_or(false) {
        return Err(LifecycleError::StagedMissing(staged));
    }
    let replaced = match fs::metadata(&canonical).await {
        Ok(meta) if meta.is_dir() => return Err(LifecycleError::CanonicalIsDirectory(canonical)),
        Ok(_) => true,
        Err(_) => false,
    };

    fs::rename(&staged, &canonical)
        .await
        .map_err(|source| LifecycleError::Rename {
            from: staged.clone(),
            to: canonical.clone(),
            source,
        })?;

    info!(
        from = %staged.display(),
        to = %canonical.display(),
        replaced,
        "Promoted staged document"
    );
    Ok(canonical)
}

/// Cleanup followed by promotion.
pub async fn finalize(layout: &DataLayout) -> Result<(PathBuf, CleanupReport), LifecycleError> {
    let report = cleanup_scratch(layout).await;
    let canonical = promote(layout).await?;
    Ok((canonical, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    fn seed(layout: &DataLayout) {
        stdfs::create_dir_all(&layout.data_dir).unwrap();
        stdfs::write(layout.news_response_path("20250101_080000"), "{}").unwrap();
        stdfs::write(layout.news_response_path("20250102_080000"), "{}").unwrap();
        stdfs::write(layout.error_response_path("20250101_080000"), "{}").unwrap();
        stdfs::write(layout.rss_snapshot_path(), "{}").unwrap();
        stdfs::write(layout.data_dir.join("notes.txt"), "keep").unwrap();
    }

    #[tokio::test]
    async fn test_list_news_responses_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path().join("absent"));
        assert!(list_news_responses(&layout).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_scratch() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path());
        seed(&layout);

        let report = cleanup_scratch(&layout).await;
        assert!(report.is_clean());
        assert_eq!(report.removed.len(), 3);
        assert!(list_news_responses(&layout).await.unwrap().is_empty());
        assert!(!layout.rss_snapshot_path().exists());
        assert!(layout.error_response_path("20250101_080000").exists());
        assert!(layout.data_dir.join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_promote_replaces_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path());
        stdfs::write(layout.canonical_path(), "old").unwrap();
        stdfs::write(layout.staged_path(), "new").unwrap();

        let canonical = promote(&layout).await.unwrap();
        assert_eq!(stdfs::read_to_string(&canonical).unwrap(), "new");
        assert!(!layout.staged_path().exists());
    }

    #[tokio::test]
    async fn test_promote_without_staged_keeps_canonical() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path());
        stdfs::write(layout.canonical_path(), "old").unwrap();

        let err = promote(&layout).await.unwrap_err();
        assert!(matches!(err, LifecycleError::StagedMissing(_)));
        assert_eq!(stdfs::read_to_string(layout.canonical_path()).unwrap(), "old");
    }

    #[tokio::test]
    async fn test_promote_refuses_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path());
        stdfs::create_dir(layout.canonical_path()).unwrap();
        stdfs::write(layout.staged_path(), "new").unwrap();

        let err = promote(&layout).await.unwrap_err();
        assert!(matches!(err, LifecycleError::CanonicalIsDirectory(_)));
        assert!(layout.staged_path().exists());
    }

    #[tokio::test]
    async fn test_finalize_leaves_exactly_one_document() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path());
        seed(&layout);
        stdfs::write(layout.canonical_path(), "old").unwrap();
        stdfs::write(layout.staged_path(), "new").unwrap();

        let (canonical, report) = finalize(&layout).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(stdfs::read_to_string(&canonical).unwrap(), "new");
        assert!(list_news_responses(&layout).await.unwrap().is_empty());

        let json_files: Vec<_> = stdfs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".json") && !n.starts_with("error_response_"))
            .collect();
        assert_eq!(json_files, vec!["news.json".to_string()]);
    }
}
