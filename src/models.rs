//! Data models for upstream documents and the combined output.
//!
//! This module defines the core data structures used throughout the application:
//! - [`NewsApiResponse`]: Raw body returned by the news API `top-headlines` endpoint
//! - [`RssFeed`]: Parsed RSS channel, also the on-disk shape of the RSS snapshot
//! - [`Article`]: Canonical article shape shared by every source
//! - [`CombinedDocument`]: Merged articles with provenance counts
//!
//! The upstream models keep the camelCase field names of the wire formats,
//! hence the `#[allow(non_snake_case)]` attributes.

use serde::{Deserialize, Serialize};

/// Body of a news API `top-headlines` response.
///
/// Only `articles` matters to the pipeline; everything else is kept for
/// diagnostics. Missing fields default so a partial body still parses.
#[allow(non_snake_case)]
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NewsApiResponse {
    /// `"ok"` or `"error"`.
    #[serde(default)]
    pub status: String,
    /// Total number of results the API claims to have.
    #[serde(default)]
    pub totalResults: Option<u64>,
    /// Articles on this page of results.
    #[serde(default)]
    pub articles: Vec<NewsApiArticle>,
    /// Error code, only present when `status` is `"error"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human readable error, only present when `status` is `"error"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One article as returned by the news API.
#[allow(non_snake_case)]
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct NewsApiArticle {
    #[serde(default)]
    pub source: NewsApiSource,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub urlToImage: Option<String>,
    #[serde(default)]
    pub publishedAt: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Publication an API article originates from.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct NewsApiSource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// A parsed RSS channel.
///
/// Written verbatim as the RSS snapshot file, so field names here are the
/// snapshot's on-disk schema.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct RssFeed {
    /// Channel `<title>`.
    #[serde(default)]
    pub title: String,
    /// Channel `<description>`.
    #[serde(default)]
    pub description: String,
    /// Channel `<link>`.
    #[serde(default)]
    pub link: String,
    /// Local RFC 3339 time the feed was fetched.
    #[serde(default)]
    pub updated: String,
    /// Channel `<item>` entries in document order.
    #[serde(default)]
    pub articles: Vec<RssItem>,
}

/// One `<item>` of an RSS channel.
#[allow(non_snake_case)]
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct RssItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pubDate: String,
    #[serde(default)]
    pub guid: String,
    /// Full body from a namespaced `<content:encoded>` element, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Which upstream feed an [`Article`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    NewsApi,
    Rss,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::NewsApi => "news_api",
            SourceType::Rss => "rss",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical article shape after normalization.
///
/// Every field is always serialized; absent values become `null` (or `""`
/// for `published_at`), never a missing key.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Article {
    /// Human readable provenance label, e.g. `"News API"` or `"Sweden RSS"`.
    pub source_name: String,
    /// Provenance tag.
    pub source_type: SourceType,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub content: Option<String>,
    /// Always `None` for RSS articles.
    pub author: Option<String>,
    /// Always `None` for RSS articles.
    pub image_url: Option<String>,
    /// Timestamp exactly as the source published it.
    pub published_at: String,
    /// `published_at` rendered as RFC 3339 UTC when it could be parsed.
    pub published_at_utc: Option<String>,
    /// Upstream publication (API `source.name`, RSS channel title).
    pub origin: Option<String>,
}

/// Per-source article counts of a [`CombinedDocument`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceCounts {
    pub news_api_count: usize,
    pub rss_count: usize,
}

impl SourceCounts {
    pub fn total(&self) -> usize {
        self.news_api_count + self.rss_count
    }
}

/// Result of merging every available source.
///
/// `total_articles == articles.len() == sources.total()` holds for every
/// document built by the merger.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CombinedDocument {
    /// Local RFC 3339 time of the merge.
    pub combined_at: String,
    pub total_articles: usize,
    pub sources: SourceCounts,
    /// News API articles first, then RSS, each in fetch order.
    pub articles: Vec<Article>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_news_api_response_deserialization() {
        let json = r#"{
            "status": "ok",
            "totalResults": 2,
            "articles": [
                {
                    "source": {"id": null, "name": "Reuters"},
                    "author": "Jane Doe",
                    "title": "Markets rally",
                    "description": "Stocks up",
                    "url": "https://example.com/a",
                    "urlToImage": "https://example.com/a.png",
                    "publishedAt": "2025-05-06T12:00:00Z",
                    "content": "Body"
                },
                {"title": "Sparse"}
            ]
        }"#;

        let response: NewsApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, "ok");
        assert_eq!(response.totalResults, Some(2));
        assert_eq!(response.articles.len(), 2);
        assert_eq!(response.articles[0].source.name.as_deref(), Some("Reuters"));
        assert_eq!(response.articles[1].author, None);
        assert_eq!(response.articles[1].source.name, None);
    }

    #[test]
    fn test_news_api_error_body() {
        let json =
            r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#;
        let response: NewsApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, "error");
        assert_eq!(response.code.as_deref(), Some("apiKeyInvalid"));
        assert!(response.articles.is_empty());
    }

    #[test]
    fn test_source_type_serialization() {
        assert_eq!(serde_json::to_string(&SourceType::NewsApi).unwrap(), "\"news_api\"");
        assert_eq!(serde_json::to_string(&SourceType::Rss).unwrap(), "\"rss\"");
        assert_eq!(SourceType::Rss.to_string(), "rss");
    }

    #[test]
    fn test_article_serializes_nulls() {
        let article = Article {
            source_name: "Sweden RSS".to_string(),
            source_type: SourceType::Rss,
            title: Some("Rubrik".to_string()),
            description: None,
            url: None,
            content: Some(String::new()),
            author: None,
            image_url: None,
            published_at: String::new(),
            published_at_utc: None,
            origin: None,
        };

        let value = serde_json::to_value(&article).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["author", "image_url", "description", "url", "published_at_utc", "origin"] {
            assert!(obj.contains_key(key), "missing key {key}");
            assert!(obj[key].is_null());
        }
        assert_eq!(obj["content"], "");
        assert_eq!(obj["source_type"], "rss");
    }

    #[test]
    fn test_rss_snapshot_content_optional() {
        let json = r#"{"title":"Barometern","articles":[{"title":"A","link":"https://x/a"}]}"#;
        let feed: RssFeed = serde_json::from_str(json).unwrap();
        assert_eq!(feed.articles.len(), 1);
        assert_eq!(feed.articles[0].content, None);
        assert_eq!(feed.articles[0].pubDate, "");
    }

    #[test]
    fn test_source_counts_total() {
        let counts = SourceCounts {
            news_api_count: 5,
            rss_count: 3,
        };
        assert_eq!(counts.total(), 8);
    }
}
