//! Mapping of source-native documents onto [`Article`].
//!
//! Both functions are total: missing optional fields fall back to `None`
//! (or `""` where the article shape requires a string) and never fail.

use crate::models::{Article, NewsApiResponse, RssFeed, SourceType};
use chrono::{DateTime, SecondsFormat, Utc};

/// Tag every news API article with its provenance.
///
/// Fields pass through unchanged apart from the renames
/// `urlToImage -> image_url` and `publishedAt -> published_at`.
pub fn from_news_api(response: &NewsApiResponse, label: &str) -> Vec<Article> {
    response
        .articles
        .iter()
        .map(|a| {
            let published_at = a.publishedAt.clone().unwrap_or_default();
            Article {
                source_name: label.to_string(),
                source_type: SourceType::NewsApi,
                title: a.title.clone(),
                description: a.description.clone(),
                url: a.url.clone(),
                content: a.content.clone(),
                author: a.author.clone(),
                image_url: a.urlToImage.clone(),
                published_at_utc: normalize_timestamp(&published_at),
                published_at,
                origin: a.source.name.clone(),
            }
        })
        .collect()
}

/// Remap RSS items field by field.
///
/// `author` and `image_url` have no RSS equivalent and are always `None`;
/// items without `<content:encoded>` get an empty `content`.
pub fn from_rss(feed: &RssFeed, label: &str) -> Vec<Article> {
    let origin = Some(feed.title.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    feed.articles
        .iter()
        .map(|item| Article {
            source_name: label.to_string(),
            source_type: SourceType::Rss,
            title: Some(item.title.clone()),
            description: Some(item.description.clone()),
            url: Some(item.link.clone()),
            content: Some(item.content.clone().unwrap_or_default()),
            author: None,
            image_url: None,
            published_at: item.pubDate.clone(),
            published_at_utc: normalize_timestamp(&item.pubDate),
            origin: origin.clone(),
        })
        .collect()
}

/// Render an RFC 3339 or RFC 2822 timestamp as RFC 3339 UTC.
///
/// The news API uses ISO 8601 (`2025-05-06T10:00:00Z`) while RSS uses
/// RFC 822 style dates (`Tue, 06 May 2025 12:00:00 +0200`); this gives both
/// a common, sortable form. Unparseable input yields `None`.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|dt| {
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        })
}
