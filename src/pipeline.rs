//! End-to-end runs over the data directory.
//!
//! Every step blocks until it completes before the next one starts:
//!
//! 1. **Fetch** the news API, then the RSS feed (or reload their snapshots)
//! 2. **Normalize** both documents into [`Article`](crate::models::Article)s
//! 3. **Merge** them; with no articles at all the run stops here and the
//!    data directory is left exactly as it was
//! 4. **Stage** the combined document
//! 5. **Finalize**: clean up scratch files, promote the staged document
//! 6. **Encrypt** the canonical document according to the configured mode
//! 7. **Publish** it with git, when asked to
//!
//! A failed source is logged and contributes nothing. Any other failure
//! ends the run with a [`PipelineError`].

use crate::config::{AppConfig, GitConfig};
use crate::crypto::{self, GateOutcome};
use crate::error::{GitError, PipelineError};
use crate::git::{Git, PublishOutcome};
use crate::models::{NewsApiResponse, RssFeed, SourceCounts};
use crate::normalize;
use crate::outputs::combine::{load_news_api_snapshot, load_rss_snapshot, merge, write_staged};
use crate::outputs::lifecycle::{self, CleanupReport};
use crate::sources::{self, news_api, rss};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument};

/// How one source fared in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// The source answered with this many articles (possibly zero).
    Fetched(usize),
    Failed,
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceStatus::Fetched(n) => write!(f, "{n} articles"),
            SourceStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of [`collect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectReport {
    pub news_api: SourceStatus,
    pub rss: SourceStatus,
}

/// Result of a completed [`run`] or [`combine_from_snapshots`].
#[derive(Debug)]
pub struct RunReport {
    pub news_api: SourceStatus,
    pub rss: SourceStatus,
    pub sources: SourceCounts,
    pub canonical: PathBuf,
    pub cleanup: CleanupReport,
    pub encryption: GateOutcome,
    /// `None` unless publishing was requested.
    pub publish: Option<PublishOutcome>,
}

struct Fetched {
    news_api: Option<NewsApiResponse>,
    rss: Option<RssFeed>,
}

impl Fetched {
    fn news_api_status(&self) -> SourceStatus {
        self.news_api
            .as_ref()
            .map_or(SourceStatus::Failed, |r| SourceStatus::Fetched(r.articles.len()))
    }

    fn rss_status(&self) -> SourceStatus {
        self.rss
            .as_ref()
            .map_or(SourceStatus::Failed, |f| SourceStatus::Fetched(f.articles.len()))
    }
}

async fn fetch_all(config: &AppConfig) -> Result<Fetched, PipelineError> {
    config.news_api.require_key()?;
    let client = sources::build_client(config.http_timeout)?;

    let news_api = news_api::fetch(&client, &config.news_api, &config.layout).await;
    let rss = rss::fetch(&client, &config.rss, &config.layout).await;
    Ok(Fetched { news_api, rss })
}

/// Fetch both sources and leave their scratch snapshots in place.
///
/// # Errors
///
/// [`PipelineError::Config`] when no news API key is configured.
#[instrument(level = "info", skip_all, fields(dir = %config.layout.data_dir.display()))]
pub async fn collect(config: &AppConfig) -> Result<CollectReport, PipelineError> {
    let fetched = fetch_all(config).await?;
    let report = CollectReport {
        news_api: fetched.news_api_status(),
        rss: fetched.rss_status(),
    };
    info!(news_api = %report.news_api, rss = %report.rss, "Collection finished");
    Ok(report)
}

/// Fetch both sources and replace the canonical document.
#[instrument(level = "info", skip_all, fields(dir = %config.layout.data_dir.display()))]
pub async fn run(config: &AppConfig) -> Result<RunReport, PipelineError> {
    let fetched = fetch_all(config).await?;
    finish(config, fetched).await
}

/// Replace the canonical document from the snapshots of an earlier `collect`.
#[instrument(level = "info", skip_all, fields(dir = %config.layout.data_dir.display()))]
pub async fn combine_from_snapshots(config: &AppConfig) -> Result<RunReport, PipelineError> {
    let fetched = Fetched {
        news_api: load_news_api_snapshot(&config.layout).await,
        rss: load_rss_snapshot(&config.layout).await,
    };
    finish(config, fetched).await
}

async fn finish(config: &AppConfig, fetched: Fetched) -> Result<RunReport, PipelineError> {
    let news_api_status = fetched.news_api_status();
    let rss_status = fetched.rss_status();

    let news_api_articles = fetched
        .news_api
        .as_ref()
        .map(|r| normalize::from_news_api(r, &config.news_api.label));
    let rss_articles = fetched
        .rss
        .as_ref()
        .map(|f| normalize::from_rss(f, &config.rss.label));

    let doc = merge(news_api_articles, rss_articles).inspect_err(|e| {
        error!(
            error = %e,
            "Nothing to combine; scratch files and canonical document left untouched"
        )
    })?;
    info!(
        total = doc.total_articles,
        news_api = doc.sources.news_api_count,
        rss = doc.sources.rss_count,
        "Combined articles"
    );

    write_staged(&doc, &config.layout).await?;
    let (canonical, cleanup) = lifecycle::finalize(&config.layout).await?;
    let encryption = crypto::apply(&canonical, &config.encryption).await?;

    let publish = if config.git.push {
        Some(publish(&config.git, &canonical).await?)
    } else {
        None
    };

    Ok(RunReport {
        news_api: news_api_status,
        rss: rss_status,
        sources: doc.sources,
        canonical,
        cleanup,
        encryption,
        publish,
    })
}

#[instrument(level = "info", skip_all, fields(repo = %git.repo_dir.display()))]
async fn publish(git: &GitConfig, canonical: &Path) -> Result<PublishOutcome, GitError> {
    let repo = Git::new(&git.repo_dir);
    if git.convert_remote_to_ssh {
        repo.convert_remote_to_ssh().await?;
    }
    repo.commit_and_push(&[canonical.to_path_buf()], git.message.as_deref())
        .await
        .inspect_err(|e| {
            error!(error = %e, "Publishing failed; the canonical document stays in place")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataLayout, EncryptionConfig, NewsApiConfig, RssConfig};
    use crate::crypto::{EncryptionMode, KeyDerivation};
    use crate::error::{ConfigError, MergeError};
    use crate::models::CombinedDocument;
    use crate::sources::canned::{news_api_body, rss_body, serve, Reply};
    use crate::utils::is_news_response_name;
    use std::fs;
    use std::time::Duration;

    const NEWS_API_BODY: &str = r#"{"status":"ok","totalResults":2,"articles":[
        {"source":{"id":"reuters","name":"Reuters"},"title":"Markets rally",
         "url":"https://example.com/a","publishedAt":"2025-05-06T07:00:00Z"},
        {"source":{"id":null,"name":"AP"},"title":"Rates hold",
         "url":"https://example.com/b","publishedAt":"2025-05-06T08:00:00Z"}]}"#;

    const RSS_BODY: &str = r#"{"title":"Barometern","description":"",
        "link":"https://www.barometern.se","updated":"2025-05-06T10:00:00+02:00","articles":[
        {"title":"Kalmar","link":"https://www.barometern.se/1","description":"",
         "pubDate":"Tue, 06 May 2025 09:00:00 +0200","guid":"1"}]}"#;

    const REJECTED_KEY_BODY: &str =
        r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#;

    fn config(dir: &Path) -> AppConfig {
        AppConfig {
            layout: DataLayout::new(dir),
            news_api: NewsApiConfig {
                endpoint: "http://127.0.0.1:9/v2/top-headlines".to_string(),
                country: "us".to_string(),
                category: "business".to_string(),
                api_key: Some("test-key".to_string()),
                label: "News API".to_string(),
            },
            rss: RssConfig {
                url: "http://127.0.0.1:9/feed".to_string(),
                label: "Sweden RSS".to_string(),
            },
            encryption: EncryptionConfig {
                mode: EncryptionMode::Off,
                key: None,
                derivation: KeyDerivation::Argon2id,
            },
            git: GitConfig::default(),
            http_timeout: Some(Duration::from_secs(5)),
        }
    }

    fn seed_snapshots(layout: &DataLayout) {
        fs::write(layout.news_response_path("20250506_080000"), NEWS_API_BODY).unwrap();
        fs::write(layout.rss_snapshot_path(), RSS_BODY).unwrap();
    }

    #[tokio::test]
    async fn test_combine_from_snapshots() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        seed_snapshots(&config.layout);
        fs::write(config.layout.error_response_path("20250505_080000"), "{}").unwrap();

        let report = combine_from_snapshots(&config).await.unwrap();
        assert_eq!(report.news_api, SourceStatus::Fetched(2));
        assert_eq!(report.rss, SourceStatus::Fetched(1));
        assert_eq!(report.sources.total(), 3);
        assert!(report.cleanup.is_clean());
        assert_eq!(report.encryption, GateOutcome::Skipped(crypto::SkipReason::Disabled));
        assert!(report.publish.is_none());

        let doc: CombinedDocument =
            serde_json::from_slice(&fs::read(&report.canonical).unwrap()).unwrap();
        assert_eq!(doc.total_articles, 3);
        assert_eq!(doc.articles[0].title.as_deref(), Some("Markets rally"));
        assert_eq!(doc.articles[2].origin.as_deref(), Some("Barometern"));

        assert!(!config.layout.news_response_path("20250506_080000").exists());
        assert!(!config.layout.rss_snapshot_path().exists());
        assert!(!config.layout.staged_path().exists());
        assert!(config.layout.error_response_path("20250505_080000").exists());
    }

    #[tokio::test]
    async fn test_no_data_leaves_directory_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        fs::write(
            config.layout.news_response_path("20250506_080000"),
            r#"{"status":"ok","totalResults":0,"articles":[]}"#,
        )
        .unwrap();
        fs::write(
            config.layout.rss_snapshot_path(),
            r#"{"title":"Barometern","articles":[]}"#,
        )
        .unwrap();
        fs::write(config.layout.canonical_path(), "old").unwrap();

        let err = combine_from_snapshots(&config).await.unwrap_err();
        assert!(matches!(err, PipelineError::Merge(MergeError::NoSourceData)));
        assert!(config.layout.news_response_path("20250506_080000").exists());
        assert!(config.layout.rss_snapshot_path().exists());
        assert!(!config.layout.staged_path().exists());
        assert_eq!(fs::read_to_string(config.layout.canonical_path()).unwrap(), "old");
    }

    #[tokio::test]
    async fn test_run_requires_api_key() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(tmp.path());
        config.news_api.api_key = None;

        let err = run(&config).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_run_both_sources_down() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        fs::write(config.layout.canonical_path(), "old").unwrap();

        let err = run(&config).await.unwrap_err();
        assert!(matches!(err, PipelineError::Merge(MergeError::NoSourceData)));
        assert_eq!(fs::read_to_string(config.layout.canonical_path()).unwrap(), "old");
    }

    #[tokio::test]
    async fn test_collect_reports_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());

        let report = collect(&config).await.unwrap();
        assert_eq!(report.news_api, SourceStatus::Failed);
        assert_eq!(report.rss, SourceStatus::Failed);
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    async fn served_config(dir: &Path, news_api: Reply, feed: Reply) -> AppConfig {
        let mut config = config(dir);
        let news_base = serve(vec![news_api]).await;
        let rss_base = serve(vec![feed]).await;
        config.news_api.endpoint = format!("{news_base}/v2/top-headlines");
        config.rss.url = format!("{rss_base}/feed");
        config
    }

    #[tokio::test]
    async fn test_run_leaves_only_canonical_document() {
        let tmp = tempfile::tempdir().unwrap();
        let config = served_config(
            tmp.path(),
            Reply::json(200, news_api_body(5)),
            Reply::xml(200, rss_body(3)),
        )
        .await;

        let report = run(&config).await.unwrap();
        assert_eq!(report.news_api, SourceStatus::Fetched(5));
        assert_eq!(report.rss, SourceStatus::Fetched(3));
        assert_eq!(report.sources.news_api_count, 5);
        assert_eq!(report.sources.rss_count, 3);
        assert!(report.cleanup.is_clean());
        assert_eq!(file_names(tmp.path()), vec!["news.json".to_string()]);

        let doc: CombinedDocument =
            serde_json::from_slice(&fs::read(&report.canonical).unwrap()).unwrap();
        assert_eq!(doc.total_articles, 8);
        assert_eq!(doc.articles[0].title.as_deref(), Some("Headline 0"));
        assert_eq!(doc.articles[5].title.as_deref(), Some("Nyhet 0"));
    }

    #[tokio::test]
    async fn test_run_with_rejected_key_keeps_error_body() {
        let tmp = tempfile::tempdir().unwrap();
        let config = served_config(
            tmp.path(),
            Reply::json(401, REJECTED_KEY_BODY),
            Reply::xml(200, rss_body(3)),
        )
        .await;

        let report = run(&config).await.unwrap();
        assert_eq!(report.news_api, SourceStatus::Failed);
        assert_eq!(report.rss, SourceStatus::Fetched(3));
        assert_eq!(report.sources.news_api_count, 0);
        assert_eq!(report.sources.rss_count, 3);

        let names = file_names(tmp.path());
        assert_eq!(names.len(), 2, "unexpected files {names:?}");
        assert!(names[0].starts_with("error_response_"));
        assert_eq!(names[1], "news.json");
    }

    #[tokio::test]
    async fn test_run_empty_headlines_and_failed_feed() {
        let tmp = tempfile::tempdir().unwrap();
        let config = served_config(
            tmp.path(),
            Reply::json(200, news_api_body(0)),
            Reply::xml(500, "<error/>"),
        )
        .await;

        let err = run(&config).await.unwrap_err();
        assert!(matches!(err, PipelineError::Merge(MergeError::NoSourceData)));
        assert!(!config.layout.canonical_path().exists());
        assert!(!config.layout.staged_path().exists());
        assert!(!config.layout.rss_snapshot_path().exists());

        // The empty response snapshot is scratch and stays until a run succeeds.
        let names = file_names(tmp.path());
        assert_eq!(names.len(), 1);
        assert!(is_news_response_name(&names[0]));
    }

    #[tokio::test]
    async fn test_publish_outside_repository_keeps_document() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(tmp.path());
        config.git = GitConfig {
            push: true,
            repo_dir: tmp.path().to_path_buf(),
            convert_remote_to_ssh: false,
            message: None,
        };
        seed_snapshots(&config.layout);

        let err = combine_from_snapshots(&config).await.unwrap_err();
        assert!(matches!(err, PipelineError::Git(GitError::NotARepository(_))));
        assert!(config.layout.canonical_path().exists());
    }

    #[cfg(feature = "encryption")]
    #[tokio::test]
    async fn test_combine_encrypts_canonical() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(tmp.path());
        config.encryption.mode = EncryptionMode::Required;
        config.encryption.key = Some("correct horse battery staple".to_string());
        seed_snapshots(&config.layout);

        let report = combine_from_snapshots(&config).await.unwrap();
        assert!(report.encryption.is_encrypted());

        let stored = fs::read(&report.canonical).unwrap();
        assert!(!crypto::is_plaintext_json(&stored));
        let plain = crypto::decrypt_bytes(&stored, "correct horse battery staple").unwrap();
        let doc: CombinedDocument = serde_json::from_slice(&plain).unwrap();
        assert_eq!(doc.total_articles, 3);
    }

    #[cfg(not(feature = "encryption"))]
    #[tokio::test]
    async fn test_required_encryption_without_cipher() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(tmp.path());
        config.encryption.mode = EncryptionMode::Required;
        seed_snapshots(&config.layout);

        let err = combine_from_snapshots(&config).await.unwrap_err();
        assert!(matches!(err, PipelineError::Crypto(crate::error::CryptoError::Unavailable)));
    }
}
