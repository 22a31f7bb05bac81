//! Merging normalized articles into one [`CombinedDocument`].
//!
//! The merge itself is pure. Writing the result only ever targets the
//! staging file; [`crate::outputs::lifecycle`] promotes it afterwards.
//!
//! The snapshot loaders re-read scratch artifacts left by an earlier
//! `collect` so `combine` can run without touching the network.

use super::lifecycle::list_news_responses;
use crate::config::DataLayout;
use crate::error::MergeError;
use crate::models::{Article, CombinedDocument, NewsApiResponse, RssFeed, SourceCounts};
use crate::utils::looks_truncated;
use chrono::Local;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// Concatenate news API articles, then RSS articles.
///
/// A source that failed is passed as `None`; an empty list counts the same.
///
/// # Errors
///
/// [`MergeError::NoSourceData`] if and only if neither source contributes
/// a single article.
pub fn merge(
    news_api: Option<Vec<Article>>,
    rss: Option<Vec<Article>>,
) -> Result<CombinedDocument, MergeError> {
    merge_at(news_api, rss, Local::now().to_rfc3339())
}

/// [`merge`] with an explicit `combined_at` stamp.
pub fn merge_at(
    news_api: Option<Vec<Article>>,
    rss: Option<Vec<Article>>,
    combined_at: String,
) -> Result<CombinedDocument, MergeError> {
    let news_api = news_api.unwrap_or_default();
    let rss = rss.unwrap_or_default();
    if news_api.is_empty() && rss.is_empty() {
        return Err(MergeError::NoSourceData);
    }

    let sources = SourceCounts {
        news_api_count: news_api.len(),
        rss_count: rss.len(),
    };
    let mut articles = news_api;
    articles.extend(rss);

    Ok(CombinedDocument {
        combined_at,
        total_articles: articles.len(),
        sources,
        articles,
    })
}

/// Write the document as pretty JSON to the staging path.
#[instrument(level = "info", skip_all, fields(total = doc.total_articles))]
pub async fn write_staged(
    doc: &CombinedDocument,
    layout: &DataLayout,
) -> Result<PathBuf, MergeError> {
    let path = layout.staged_path();
    let json = serde_json::to_vec_pretty(doc)?;
    let write_err = |source| MergeError::Write {
        path: path.clone(),
        source,
    };
    fs::create_dir_all(&layout.data_dir).await.map_err(write_err)?;
    fs::write(&path, json).await.map_err(write_err)?;
    info!(path = %path.display(), "Wrote staged combined document");
    Ok(path)
}

/// Newest `news_response_*.json` in the data directory, by modification time.
pub async fn latest_news_response(layout: &DataLayout) -> Option<PathBuf> {
    let files = match list_news_responses(layout).await {
        Ok(files) => files,
        Err(e) => {
            error!(
                dir = %layout.data_dir.display(),
                error = %e,
                "Failed to list scratch responses"
            );
            return None;
        }
    };

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for path in files {
        let modified = match fs::metadata(&path).await.and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot stat scratch response");
                continue;
            }
        };
        // Ties resolve to the later file name, which carries the later stamp.
        let newer = match &newest {
            None => true,
            Some((t, p)) => modified > *t || (modified == *t && path > *p),
        };
        if newer {
            newest = Some((modified, path));
        }
    }
    newest.map(|(_, p)| p)
}

/// Load the newest news API scratch response, if any.
#[instrument(level = "info", skip_all)]
pub async fn load_news_api_snapshot(layout: &DataLayout) -> Option<NewsApiResponse> {
    let Some(path) = latest_news_response(layout).await else {
        info!("No news API response files found");
        return None;
    };
    info!(path = %path.display(), "Using latest news API response");
    read_json(&path).await
}

/// Load the RSS snapshot, if present.
#[instrument(level = "info", skip_all)]
pub async fn load_rss_snapshot(layout: &DataLayout) -> Option<RssFeed> {
    let path = layout.rss_snapshot_path();
    if !fs::try_exists(&path).await.unwrap_or(false) {
        info!(path = %path.display(), "No RSS snapshot found");
        return None;
    }
    read_json(&path).await
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read snapshot");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(v) => Some(v),
        Err(e) if looks_truncated(&e) => {
            error!(path = %path.display(), error = %e, "Snapshot is truncated (interrupted run?)");
            None
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Snapshot is not valid JSON");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn articles(source_type: SourceType, n: usize) -> Vec<Article> {
        (0..n)
            .map(|i| Article {
                source_name: match source_type {
                    SourceType::NewsApi => "News API".to_string(),
                    SourceType::Rss => "Sweden RSS".to_string(),
                },
                source_type,
                title: Some(format!("{source_type}-{i}")),
                description: None,
                url: None,
                content: None,
                author: None,
                image_url: None,
                published_at: String::new(),
                published_at_utc: None,
                origin: None,
            })
            .collect()
    }

    #[test]
    fn test_merge_five_and_three() {
        let doc = merge(
            Some(articles(SourceType::NewsApi, 5)),
            Some(articles(SourceType::Rss, 3)),
        )
        .unwrap();

        assert_eq!(doc.total_articles, 8);
        assert_eq!(doc.articles.len(), 8);
        assert_eq!(
            doc.sources,
            SourceCounts {
                news_api_count: 5,
                rss_count: 3
            }
        );
        assert!(doc.articles[..5].iter().all(|a| a.source_type == SourceType::NewsApi));
        assert!(doc.articles[5..].iter().all(|a| a.source_type == SourceType::Rss));
        let titles: Vec<_> = doc.articles.iter().filter_map(|a| a.title.clone()).collect();
        assert_eq!(titles[0], "news_api-0");
        assert_eq!(titles[4], "news_api-4");
        assert_eq!(titles[5], "rss-0");
        assert_eq!(titles[7], "rss-2");
    }

    #[test]
    fn test_merge_news_api_missing() {
        let doc = merge(None, Some(articles(SourceType::Rss, 3))).unwrap();
        assert_eq!(doc.total_articles, 3);
        assert_eq!(doc.sources.news_api_count, 0);
        assert_eq!(doc.sources.rss_count, 3);
    }

    #[test]
    fn test_merge_one_side_empty_list() {
        let doc = merge(Some(articles(SourceType::NewsApi, 2)), Some(vec![])).unwrap();
        assert_eq!(doc.total_articles, 2);
        assert_eq!(doc.sources.total(), doc.total_articles);
    }

    #[test]
    fn test_merge_fails_only_without_data() {
        assert!(matches!(merge(None, None), Err(MergeError::NoSourceData)));
        assert!(matches!(merge(Some(vec![]), None), Err(MergeError::NoSourceData)));
        assert!(matches!(merge(Some(vec![]), Some(vec![])), Err(MergeError::NoSourceData)));
        assert!(merge(None, Some(articles(SourceType::Rss, 1))).is_ok());
    }

    #[test]
    fn test_merge_at_stamp() {
        let doc = merge_at(
            Some(articles(SourceType::NewsApi, 1)),
            None,
            "2025-05-06T12:00:00+02:00".to_string(),
        )
        .unwrap();
        assert_eq!(doc.combined_at, "2025-05-06T12:00:00+02:00");
    }

    #[tokio::test]
    async fn test_write_staged_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path().join("data"));
        let doc = merge(
            Some(articles(SourceType::NewsApi, 2)),
            Some(articles(SourceType::Rss, 1)),
        )
        .unwrap();

        let path = write_staged(&doc, &layout).await.unwrap();
        assert_eq!(path, layout.staged_path());
        let back: CombinedDocument =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back, doc);
        assert!(!layout.canonical_path().exists());
    }

    #[tokio::test]
    async fn test_load_snapshots() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path());
        assert!(load_news_api_snapshot(&layout).await.is_none());
        assert!(load_rss_snapshot(&layout).await.is_none());

        std::fs::write(
            layout.news_response_path("20250101_080000"),
            r#"{"status":"ok","totalResults":1,"articles":[{"title":"old"}]}"#,
        )
        .unwrap();
        std::fs::write(
            layout.news_response_path("20250101_090000"),
            r#"{"status":"ok","totalResults":1,"articles":[{"title":"new"}]}"#,
        )
        .unwrap();
        std::fs::write(
            layout.rss_snapshot_path(),
            r#"{"title":"Barometern","articles":[]}"#,
        )
        .unwrap();

        let old = std::fs::File::options()
            .write(true)
            .open(layout.news_response_path("20250101_080000"))
            .unwrap();
        old.set_modified(std::time::SystemTime::UNIX_EPOCH).unwrap();

        let news = load_news_api_snapshot(&layout).await.unwrap();
        assert_eq!(news.articles[0].title.as_deref(), Some("new"));
        let rss = load_rss_snapshot(&layout).await.unwrap();
        assert_eq!(rss.title, "Barometern");
    }

    #[tokio::test]
    async fn test_load_truncated_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path());
        std::fs::write(layout.rss_snapshot_path(), r#"{"title":"Barom"#).unwrap();
        assert!(load_rss_snapshot(&layout).await.is_none());
    }
}
