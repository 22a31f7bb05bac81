//! Upstream news sources.
//!
//! Each fetcher follows the same contract:
//!
//! 1. **Fetch**: one HTTP GET against a fixed, configured endpoint
//! 2. **Snapshot**: persist the parsed document to the data directory as a
//!    scratch artifact (best effort, a failed write is only logged)
//! 3. **Return**: `Some(document)` on success, `None` on any failure
//!
//! # Supported Sources
//!
//! | Source | Module | Format | Scratch artifact |
//! |--------|--------|--------|------------------|
//! | News API | [`news_api`] | JSON | `news_response_YYYYMMDD_HHMMSS.json` |
//! | RSS feed | [`rss`] | RSS 2.0 XML | fixed name, `sweden.json` by default |
//!
//! Fetchers never return an error to their caller. A document with zero
//! articles is a success.

pub mod news_api;
pub mod rss;

use crate::error::FetchError;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, instrument};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by both fetchers.
///
/// Without a configured timeout the client default applies.
pub fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build()
}

/// Write `value` as pretty JSON, creating the parent directory if needed.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub(crate) async fn write_snapshot<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), FetchError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(path, &json).await?;
    debug!(bytes = json.len(), "Wrote snapshot");
    Ok(())
}

/// Local HTTP listener answering with canned responses, one per connection.
#[cfg(test)]
pub(crate) mod canned {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    pub struct Reply {
        pub status: u16,
        pub content_type: &'static str,
        pub body: String,
    }

    impl Reply {
        pub fn json(status: u16, body: impl Into<String>) -> Self {
            Self { status, content_type: "application/json", body: body.into() }
        }

        pub fn xml(status: u16, body: impl Into<String>) -> Self {
            Self { status, content_type: "application/rss+xml", body: body.into() }
        }
    }

    /// Bind `127.0.0.1:0` and answer the next `replies.len()` requests in
    /// order. Returns the base URL, without a trailing slash.
    pub async fn serve(replies: Vec<Reply>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for reply in replies {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: {}\r\nContent-Length: {}\r\n\
                     Connection: close\r\n\r\n",
                    reply.status,
                    reply.content_type,
                    reply.body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(reply.body.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    /// A top-headlines body with `count` articles.
    pub fn news_api_body(count: usize) -> String {
        let articles: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                serde_json::json!({
                    "source": {"id": null, "name": "Reuters"},
                    "title": format!("Headline {i}"),
                    "url": format!("https://example.com/{i}"),
                    "publishedAt": "2025-05-06T07:00:00Z"
                })
            })
            .collect();
        serde_json::json!({"status": "ok", "totalResults": count, "articles": articles}).to_string()
    }

    /// An RSS 2.0 channel with `count` items.
    pub fn rss_body(count: usize) -> String {
        let items: String = (0..count)
            .map(|i| {
                format!(
                    "<item><title>Nyhet {i}</title><link>https://www.barometern.se/{i}</link>\
                     <pubDate>Tue, 06 May 2025 09:00:00 +0200</pubDate></item>"
                )
            })
            .collect();
        format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Barometern</title>\
             <link>https://www.barometern.se</link>{items}</channel></rss>"
        )
    }
}
