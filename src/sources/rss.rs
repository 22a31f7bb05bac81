//! RSS 2.0 feed fetcher.
//!
//! Downloads a single RSS channel and parses it with `quick-xml`'s event
//! reader. Channel metadata (`title`, `description`, `link`) and every
//! `<item>` are kept; a namespaced `<content:encoded>` element inside an item
//! becomes its full `content`.
//!
//! The parsed feed is written to a fixed-name snapshot (`sweden.json` by
//! default) that the next successful run removes.

use super::write_snapshot;
use crate::config::{DataLayout, RssConfig};
use crate::error::FetchError;
use crate::models::{RssFeed, RssItem};
use chrono::Local;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;
use tracing::{debug, error, info, instrument, warn};

/// Fetch the feed and persist it as the RSS snapshot.
///
/// # Returns
///
/// The parsed feed, or `None` on network errors, non-2xx statuses and
/// malformed XML. A channel without items is returned as-is.
#[instrument(level = "info", skip_all, fields(url = %config.url))]
pub async fn fetch(client: &Client, config: &RssConfig, layout: &DataLayout) -> Option<RssFeed> {
    match request(client, config, layout).await {
        Ok(feed) => {
            info!(count = feed.articles.len(), title = %feed.title, "Fetched RSS feed");
            Some(feed)
        }
        Err(e) => {
            error!(error = %e, "RSS fetch failed");
            None
        }
    }
}

async fn request(
    client: &Client,
    config: &RssConfig,
    layout: &DataLayout,
) -> Result<RssFeed, FetchError> {
    let response = client.get(&config.url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }
    let body = response.bytes().await?;
    debug!(bytes = body.len(), "Downloaded RSS feed");

    let mut feed = parse_feed(&body)?;
    feed.updated = Local::now().to_rfc3339();

    let path = layout.rss_snapshot_path();
    match write_snapshot(&path, &feed).await {
        Ok(()) => info!(path = %path.display(), count = feed.articles.len(), "Saved RSS snapshot"),
        Err(e) => error!(path = %path.display(), error = %e, "Failed to save RSS snapshot"),
    }
    Ok(feed)
}

/// Parse an RSS document from raw XML bytes.
///
/// `updated` is left empty; the fetcher stamps it. Text is collected from
/// text, CDATA and entity reference events. Descriptions and
/// `content:encoded` keep their whitespace; other elements are trimmed.
pub fn parse_feed(xml: &[u8]) -> Result<RssFeed, FetchError> {
    let mut reader = Reader::from_reader(xml);

    let mut feed = RssFeed::default();
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut current_item: Option<RssItem> = None;
    let mut saw_root = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if path.is_empty() {
                    saw_root = true;
                }
                if name == "item" && parent_is(&path, "channel") {
                    current_item = Some(RssItem::default());
                }
                path.push(name);
                text.clear();
            }
            Ok(Event::Empty(_)) => {
                if path.is_empty() {
                    saw_root = true;
                }
            }
            Ok(Event::Text(e)) => text.push_str(&String::from_utf8_lossy(&e)),
            Ok(Event::CData(e)) => text.push_str(&String::from_utf8_lossy(&e)),
            Ok(Event::GeneralRef(e)) => {
                let name = String::from_utf8_lossy(&e).into_owned();
                match resolve_reference(&name) {
                    Some(resolved) => text.push_str(&resolved),
                    None => {
                        // Unknown entity: keep it verbatim rather than drop text.
                        text.push('&');
                        text.push_str(&name);
                        text.push(';');
                    }
                }
            }
            Ok(Event::End(_)) => {
                let Some(name) = path.pop() else {
                    return Err(FetchError::Xml("unbalanced end tag".to_string()));
                };
                let raw = std::mem::take(&mut text);
                let value = if keeps_whitespace(&name) {
                    raw
                } else {
                    raw.trim().to_string()
                };

                if let Some(item) = current_item.as_mut() {
                    if parent_is(&path, "item") {
                        assign_item_field(item, &name, value);
                        buf.clear();
                        continue;
                    }
                }
                if name == "item" && parent_is(&path, "channel") {
                    if let Some(item) = current_item.take() {
                        feed.articles.push(item);
                    }
                } else if parent_is(&path, "channel") {
                    match name.as_str() {
                        "title" => fill(&mut feed.title, value),
                        "description" => fill(&mut feed.description, value),
                        "link" => fill(&mut feed.link, value),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::Xml(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(FetchError::Xml("document has no root element".to_string()));
    }
    if !path.is_empty() {
        return Err(FetchError::Xml(format!(
            "unexpected end of document inside <{}>",
            path.join("/")
        )));
    }
    if feed.title.is_empty() && feed.articles.is_empty() {
        warn!("RSS document has no channel title and no items");
    }
    Ok(feed)
}

/// Article bodies keep their text verbatim; every other element is trimmed.
fn keeps_whitespace(name: &str) -> bool {
    name == "description" || is_encoded(name)
}

/// `content:encoded` or any other prefix bound to the content namespace.
fn is_encoded(name: &str) -> bool {
    name.rsplit(':').next() == Some("encoded")
}

fn parent_is(path: &[String], name: &str) -> bool {
    path.last().is_some_and(|p| p == name)
}

/// Keep the first non-empty occurrence of an element.
fn fill(field: &mut String, value: String) {
    if field.is_empty() {
        *field = value;
    }
}

fn assign_item_field(item: &mut RssItem, name: &str, value: String) {
    match name {
        "title" => fill(&mut item.title, value),
        "link" => fill(&mut item.link, value),
        "description" => fill(&mut item.description, value),
        "pubDate" => fill(&mut item.pubDate, value),
        "guid" => fill(&mut item.guid, value),
        other if is_encoded(other) => item.content = Some(value),
        _ => {}
    }
}

/// Resolve a predefined or numeric character reference (without `&`/`;`).
fn resolve_reference(name: &str) -> Option<String> {
    if let Some(code) = name.strip_prefix('#') {
        let parsed = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        return parsed.and_then(char::from_u32).map(String::from);
    }
    quick_xml::escape::resolve_predefined_entity(name).map(str::to_string)
}
