//! Now-playing lookup.
//!
//! Icecast publishes an XSPF playlist next to each mount (`<mount>.xspf`)
//! whose `<track><title>` carries the current song.  Any XML feed with a
//! non-empty `<title>` element works.

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::header::{HeaderValue, ACCEPT, CACHE_CONTROL, PRAGMA};

use crate::error::MetadataError;

/// Fetches the now-playing title behind a metadata URL.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch_title(&self, url: &str) -> Result<String, MetadataError>;
}

const FEED_ACCEPT: &str = "application/xspf+xml, application/xml;q=0.9, text/xml;q=0.9, */*;q=0.1";

pub struct HttpMetadataFetcher {
    client: reqwest::Client,
}

impl HttpMetadataFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, MetadataError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch_title(&self, url: &str) -> Result<String, MetadataError> {
        // `_=<millis>` defeats intermediary caches that ignore the headers
        let response = self
            .client
            .get(url)
            .query(&[("_", chrono::Utc::now().timestamp_millis())])
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .header(PRAGMA, HeaderValue::from_static("no-cache"))
            .header(ACCEPT, HeaderValue::from_static(FEED_ACCEPT))
            .send()
            .await
            .map_err(classify)?;

        if !response.status().is_success() {
            return Err(MetadataError::Status(response.status()));
        }

        let body = response.text().await.map_err(classify)?;
        parse_feed_title(&body)
    }
}

fn classify(err: reqwest::Error) -> MetadataError {
    if err.is_timeout() {
        MetadataError::Timeout
    } else {
        MetadataError::Request(err)
    }
}

/// Text of the first non-empty `<title>` element, trimmed.  Namespace
/// prefixes are ignored and entities unescaped.
pub fn parse_feed_title(xml: &str) -> Result<String, MetadataError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut depth_in_title = 0usize;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"title" {
                    depth_in_title += 1;
                    if depth_in_title == 1 {
                        text.clear();
                    }
                }
            }
            Ok(Event::Text(t)) if depth_in_title > 0 => match t.unescape() {
                Ok(s) => text.push_str(&s),
                Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
            },
            Ok(Event::CData(c)) if depth_in_title > 0 => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"title" && depth_in_title > 0 {
                    depth_in_title -= 1;
                    if depth_in_title == 0 {
                        let title = text.trim();
                        if !title.is_empty() {
                            return Ok(title.to_string());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(MetadataError::Parse(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Err(MetadataError::MissingTitle)
}
