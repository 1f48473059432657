//! Best-effort page metadata extraction.

use std::io::Read;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde::Serialize;

use super::client::EnrichmentError;

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(30);

/// Only the head of a page is needed for its metadata.
pub const MAX_PAGE_BYTES: u64 = 128 * 1024;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex is valid")
});

static META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<meta\b([^>]*)>").expect("static regex is valid")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z][a-z0-9:_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("static regex is valid")
});

/// Title and description hints scraped from a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    /// `og:title`, falling back to `twitter:title`.
    pub og_title: String,
    /// `og:description`, falling back to `twitter:description`.
    pub og_description: String,
}

impl PageMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.description.is_empty()
            && self.og_title.is_empty()
            && self.og_description.is_empty()
    }
}

/// Extracts metadata from raw HTML.
///
/// This is a tolerant scan of `<title>` and `<meta>` tags, not an HTML parser;
/// markup it cannot read simply yields empty fields.
pub fn extract_metadata(html: &str) -> PageMetadata {
    let mut metadata = PageMetadata::default();

    if let Some(caps) = TITLE_RE.captures(html) {
        metadata.title = decode_entities(caps[1].trim());
    }

    let mut twitter_title = String::new();
    let mut twitter_description = String::new();

    for meta in META_RE.captures_iter(html) {
        let mut name = String::new();
        let mut property = String::new();
        let mut content = String::new();

        for attr in ATTR_RE.captures_iter(&meta[1]) {
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map_or("", |m| m.as_str());
            match attr[1].to_ascii_lowercase().as_str() {
                "name" => name = value.to_ascii_lowercase(),
                "property" => property = value.to_ascii_lowercase(),
                "content" => content = decode_entities(value.trim()),
                _ => {}
            }
        }

        match (name.as_str(), property.as_str()) {
            (_, "og:title") => metadata.og_title = content,
            (_, "og:description") => metadata.og_description = content,
            ("description", _) => metadata.description = content,
            ("twitter:title", _) => twitter_title = content,
            ("twitter:description", _) => twitter_description = content,
            _ => {}
        }
    }

    if metadata.og_title.is_empty() {
        metadata.og_title = twitter_title;
    }
    if metadata.og_description.is_empty() {
        metadata.og_description = twitter_description;
    }

    metadata
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Fetches pages with browser-like headers and extracts their metadata.
#[derive(Debug, Clone)]
pub struct PageScraper {
    client: reqwest::blocking::Client,
}

impl PageScraper {
    pub fn new() -> Result<Self, EnrichmentError> {
        Self::with_timeout(SCRAPE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, EnrichmentError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(REFERER, HeaderValue::from_static("https://www.google.com/"));

        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(EnrichmentError::Network)?;
        Ok(Self { client })
    }

    /// Downloads at most [`MAX_PAGE_BYTES`] of `url` and extracts metadata.
    pub fn scrape(&self, url: &str) -> Result<PageMetadata, EnrichmentError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|e| EnrichmentError::InvalidUrl(format!("{url}: {e}")))?;

        let response = self.client.get(parsed).send()?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(EnrichmentError::Http {
                status: status.as_u16(),
            });
        }

        let mut raw = Vec::new();
        response
            .take(MAX_PAGE_BYTES)
            .read_to_end(&mut raw)
            .map_err(EnrichmentError::Body)?;

        Ok(extract_metadata(&String::from_utf8_lossy(&raw)))
    }
}
