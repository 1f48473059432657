//! Shared helpers for paths, URL normalization and CLI input parsing.

use std::path::{Path, PathBuf};

use anyhow::Context;
use reqwest::Url;

use crate::error::{Error, Result};

/// Gets the cross-platform database path.
///
/// Returns the path as `{data_dir}/marks/bookmarks.db` where `data_dir` is:
/// - Linux: `~/.local/share`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
///
/// # Errors
///
/// Returns an error if the data directory cannot be determined.
pub fn get_database_path() -> anyhow::Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))?;

    Ok(data_dir.join("marks").join("bookmarks.db"))
}

/// Ensures the parent directory of the database file exists.
///
/// # Errors
///
/// Returns an error if directory creation fails.
pub fn ensure_database_directory(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }
    Ok(())
}

/// Normalizes a user-supplied bookmark URL.
///
/// Adds `https://` when no scheme is present and accepts only http and https
/// URLs that have a host.
///
/// # Examples
///
/// ```
/// use marks::utils::normalize_url;
///
/// assert_eq!(normalize_url("example.com/a").unwrap(), "https://example.com/a");
/// assert!(normalize_url("mailto:me@example.com").is_err());
/// ```
pub fn normalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("URL is required"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else if let Some((scheme, _)) = trimmed.split_once(':')
        && is_bare_scheme(scheme)
    {
        return Err(Error::validation(format!(
            "unsupported URL scheme: {scheme}"
        )));
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate)
        .map_err(|e| Error::validation(format!("invalid URL {trimmed:?}: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::validation(format!(
                "unsupported URL scheme: {other}"
            )));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::validation(format!("URL has no host: {trimmed}")));
    }

    Ok(url.to_string())
}

/// `mailto:x` style schemes; `localhost:8080` is a host with a port.
fn is_bare_scheme(scheme: &str) -> bool {
    matches!(scheme, "mailto" | "javascript" | "data" | "file" | "tel")
}

/// Returns the last four characters of a secret prefixed with `***`.
///
/// Secrets of four characters or fewer are masked entirely.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}

/// Splits a comma-separated tag argument into trimmed, non-empty names.
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
