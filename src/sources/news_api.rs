//! News API top-headlines fetcher.
//!
//! Calls the [News API](https://newsapi.org) `top-headlines` endpoint with
//! fixed `country`, `category` and `apiKey` query parameters. Rate limiting
//! is not handled; the relevant response headers are only logged.
//!
//! # Artifacts
//!
//! - `news_response_YYYYMMDD_HHMMSS.json`: the full response body, written on success
//! - `error_response_YYYYMMDD_HHMMSS.json`: the JSON body of a non-2xx response, kept
//!   for diagnostics and never cleaned up

use super::write_snapshot;
use crate::config::{DataLayout, NewsApiConfig};
use crate::error::FetchError;
use crate::models::NewsApiResponse;
use crate::utils::{file_stamp_now, redact_query, truncate_for_log};
use itertools::Itertools;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Fetch top headlines and persist them as a scratch response.
///
/// # Returns
///
/// The parsed response, or `None` if the key is missing, the request fails,
/// the status is not 2xx or the body is not JSON. A response with zero
/// articles is returned as-is.
#[instrument(
    level = "info",
    skip_all,
    fields(country = %config.country, category = %config.category)
)]
pub async fn fetch(
    client: &Client,
    config: &NewsApiConfig,
    layout: &DataLayout,
) -> Option<NewsApiResponse> {
    match request(client, config, layout).await {
        Ok(response) => {
            info!(count = response.articles.len(), "Fetched news API headlines");
            if response.articles.is_empty() {
                warn!("News API returned no articles (quota exhausted or inactive key?)");
            }
            Some(response)
        }
        Err(e) => {
            error!(error = %e, "News API fetch failed");
            None
        }
    }
}

/// Build the request URL from the configured endpoint and filters.
pub fn request_url(config: &NewsApiConfig, api_key: &str) -> Result<Url, FetchError> {
    let url = Url::parse_with_params(
        &config.endpoint,
        [
            ("country", config.country.as_str()),
            ("category", config.category.as_str()),
            ("apiKey", api_key),
        ],
    )?;
    Ok(url)
}

/// Parse a response body.
///
/// Returns the raw JSON value too so the snapshot keeps fields the model
/// does not know about.
pub fn parse_body(body: &str) -> Result<(serde_json::Value, NewsApiResponse), FetchError> {
    let raw: serde_json::Value = serde_json::from_str(body)?;
    let response = NewsApiResponse::deserialize(&raw)?;
    Ok((raw, response))
}

async fn request(
    client: &Client,
    config: &NewsApiConfig,
    layout: &DataLayout,
) -> Result<NewsApiResponse, FetchError> {
    let api_key = config.require_key()?;
    let url = request_url(config, api_key)?;
    info!(url = %redact_query(&url, "apiKey"), "Requesting top headlines");

    let response = client.get(url).send().await?;
    let status = response.status();
    info!(%status, "News API responded");
    log_rate_limit_headers(response.headers());

    let body = response.text().await?;
    if !status.is_success() {
        warn!(%status, body = %truncate_for_log(&body, 300), "News API returned an error status");
        save_error_body(layout, &body).await;
        return Err(FetchError::Status(status));
    }

    let (raw, parsed) = parse_body(&body)?;
    if parsed.status != "ok" {
        warn!(
            status = %parsed.status,
            code = ?parsed.code,
            message = ?parsed.message,
            "News API reported a non-ok status"
        );
    }

    let path = layout.news_response_path(&file_stamp_now());
    match write_snapshot(&path, &raw).await {
        Ok(()) => info!(path = %path.display(), "Saved news API response"),
        Err(e) => error!(path = %path.display(), error = %e, "Failed to save news API response"),
    }

    Ok(parsed)
}

/// Header names that describe quota or rate limits.
pub fn rate_limit_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            name.contains("rate") || name.contains("limit")
        })
        .map(|(name, value)| {
            let value = value.to_str().unwrap_or("<non-ascii>");
            (name.as_str().to_string(), value.to_string())
        })
        .collect()
}

fn log_rate_limit_headers(headers: &HeaderMap) {
    let limits = rate_limit_headers(headers);
    if limits.is_empty() {
        debug!("No rate limit headers in response");
    } else {
        let rendered = limits.iter().map(|(k, v)| format!("{k}={v}")).join(", ");
        info!(headers = %rendered, "Rate limit headers");
    }
}

async fn save_error_body(layout: &DataLayout, body: &str) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        debug!("Error body is not JSON; not saved");
        return;
    };
    let path = layout.error_response_path(&file_stamp_now());
    match write_snapshot(&path, &value).await {
        Ok(()) => info!(path = %path.display(), "Saved news API error response"),
        Err(e) => warn!(
            path = %path.display(),
            error = %e,
            "Failed to save news API error response"
        ),
    }
}
