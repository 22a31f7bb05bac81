//! Read-only reports over the data directory.
//!
//! | Report            | Reads                               |
//! |-------------------|-------------------------------------|
//! | [`inspect`]       | newest `news_response_*.json`       |
//! | [`compare`]       | both scratch snapshots              |
//! | [`summarize`]     | the canonical document              |
//!
//! Each report is a plain value with a `Display` impl; the binary prints it.

use super::combine::{latest_news_response, load_news_api_snapshot, load_rss_snapshot};
use crate::config::DataLayout;
use crate::crypto::{decrypt_bytes, is_plaintext_json};
use crate::error::ReportError;
use crate::models::{NewsApiResponse, SourceCounts};
use serde::Deserialize;
use serde::de::IgnoredAny;
use crate::utils::truncate_for_log;
use std::fmt;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument};

const SAMPLE_SIZE: usize = 3;

/// One article as shown in a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleSample {
    pub title: String,
    pub source: String,
    pub author: String,
    pub published_at: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct InspectReport {
    pub path: PathBuf,
    pub status: String,
    pub total_results: Option<u64>,
    pub count: usize,
    pub samples: Vec<ArticleSample>,
}

#[derive(Debug, Clone)]
pub struct CompareReport {
    pub news_api_file: Option<PathBuf>,
    pub news_api_count: usize,
    pub news_api_titles: Vec<String>,
    pub rss_count: usize,
    pub rss_titles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SummaryReport {
    pub path: PathBuf,
    /// Whether the document had to be decrypted to be read.
    pub encrypted: bool,
    pub combined_at: String,
    pub total_articles: usize,
    pub sources: SourceCounts,
}

/// The parts of a combined document a summary needs.
///
/// Articles are skipped unread, so documents whose articles predate the
/// current [`Article`](crate::models::Article) shape still summarize.
#[derive(Debug, Deserialize)]
struct DocumentHeader {
    combined_at: String,
    total_articles: usize,
    sources: SourceCounts,
    #[allow(dead_code)]
    articles: IgnoredAny,
}

fn or_na(value: Option<&str>) -> String {
    value.unwrap_or("N/A").to_string()
}

/// Summarize the newest news API scratch response.
#[instrument(level = "info", skip_all)]
pub async fn inspect(layout: &DataLayout) -> Result<InspectReport, ReportError> {
    let path = latest_news_response(layout)
        .await
        .ok_or_else(|| ReportError::NotFound("news_response_*.json file".to_string()))?;
    let bytes = fs::read(&path).await?;
    let response: NewsApiResponse = serde_json::from_slice(&bytes)?;

    let samples = response
        .articles
        .iter()
        .take(SAMPLE_SIZE)
        .map(|a| ArticleSample {
            title: or_na(a.title.as_deref()),
            source: or_na(a.source.name.as_deref()),
            author: or_na(a.author.as_deref()),
            published_at: or_na(a.publishedAt.as_deref()),
            description: truncate_for_log(a.description.as_deref().unwrap_or("N/A"), 100),
        })
        .collect();

    info!(
        path = %path.display(),
        count = response.articles.len(),
        "Inspected news API response"
    );
    Ok(InspectReport {
        path,
        status: response.status,
        total_results: response.totalResults,
        count: response.articles.len(),
        samples,
    })
}

/// Per-source counts and leading titles of the scratch snapshots.
///
/// A missing snapshot reports as zero articles.
#[instrument(level = "info", skip_all)]
pub async fn compare(layout: &DataLayout) -> CompareReport {
    let news_api_file = latest_news_response(layout).await;
    let news_api = load_news_api_snapshot(layout).await.unwrap_or_default();
    let rss = load_rss_snapshot(layout).await.unwrap_or_default();

    CompareReport {
        news_api_file,
        news_api_count: news_api.articles.len(),
        news_api_titles: news_api
            .articles
            .iter()
            .take(SAMPLE_SIZE)
            .map(|a| truncate_for_log(a.title.as_deref().unwrap_or("N/A"), 60))
            .collect(),
        rss_count: rss.articles.len(),
        rss_titles: rss
            .articles
            .iter()
            .take(SAMPLE_SIZE)
            .map(|i| truncate_for_log(&i.title, 60))
            .collect(),
    }
}

/// Read the canonical document, decrypting it in memory when it is not plaintext.
///
/// # Errors
///
/// - [`ReportError::NotFound`] if there is no canonical document
/// - [`ReportError::Encrypted`] if it is encrypted and `key` is `None`
/// - [`ReportError::Crypto`] if decryption fails
#[instrument(level = "info", skip_all)]
pub async fn summarize(
    layout: &DataLayout,
    key: Option<&str>,
) -> Result<SummaryReport, ReportError> {
    let path = layout.canonical_path();
    let bytes = match fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ReportError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let encrypted = !is_plaintext_json(&bytes);
    let plaintext = if encrypted {
        let key = key.ok_or(ReportError::Encrypted)?;
        decrypt_bytes(&bytes, key)?
    } else {
        bytes
    };
    let doc: DocumentHeader = serde_json::from_slice(&plaintext)?;

    Ok(SummaryReport {
        path,
        encrypted,
        combined_at: doc.combined_at,
        total_articles: doc.total_articles,
        sources: doc.sources,
    })
}

impl fmt::Display for InspectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File: {}", self.path.display())?;
        writeln!(f, "Status: {}", self.status)?;
        match self.total_results {
            Some(n) => writeln!(f, "Total results: {n}")?,
            None => writeln!(f, "Total results: N/A")?,
        }
        writeln!(f, "Articles in response: {}", self.count)?;
        for (i, a) in self.samples.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "Article {}:", i + 1)?;
            writeln!(f, "  Title: {}", a.title)?;
            writeln!(f, "  Source: {}", a.source)?;
            writeln!(f, "  Author: {}", a.author)?;
            writeln!(f, "  Published: {}", a.published_at)?;
            writeln!(f, "  Description: {}", a.description)?;
        }
        Ok(())
    }
}

impl fmt::Display for CompareReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.news_api_file {
            Some(p) => writeln!(
                f,
                "News API ({}): {} articles",
                p.display(),
                self.news_api_count
            )?,
            None => writeln!(f, "News API: no response file")?,
        }
        for title in &self.news_api_titles {
            writeln!(f, "  - {title}")?;
        }
        writeln!(f, "RSS: {} articles", self.rss_count)?;
        for title in &self.rss_titles {
            writeln!(f, "  - {title}")?;
        }
        write!(f, "Combined: {} articles", self.news_api_count + self.rss_count)
    }
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File: {}", self.path.display())?;
        writeln!(f, "Encrypted: {}", if self.encrypted { "yes" } else { "no" })?;
        writeln!(f, "Combined at: {}", self.combined_at)?;
        writeln!(f, "Total articles: {}", self.total_articles)?;
        writeln!(f, "  News API: {}", self.sources.news_api_count)?;
        write!(f, "  RSS: {}", self.sources.rss_count)
    }
}
