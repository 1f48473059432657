use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{BookmarkId, FolderId};
use crate::error::{Error, Result};
use crate::utils::normalize_url;

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 1000;
const MAX_NOTES_CHARS: usize = 2000;
const MAX_TAGS: usize = 50;
const MAX_TAG_CHARS: usize = 100;

/// A stored bookmark. The URL is unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: BookmarkId,
    pub url: String,
    pub title: String,
    pub description: String,
    pub notes: String,
    pub is_favorite: bool,
    pub unread: bool,
    pub shared: bool,
    /// Names of associated tags, sorted by name.
    pub tag_names: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Bookmark {
    /// Returns a draft carrying this bookmark's current values.
    ///
    /// Used to build full-replacement updates.
    pub fn to_draft(&self) -> BookmarkDraft {
        BookmarkDraft {
            url: self.url.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            notes: self.notes.clone(),
            is_favorite: self.is_favorite,
            unread: self.unread,
            shared: self.shared,
            tag_names: self.tag_names.clone(),
        }
    }
}

/// Input for creating or replacing a bookmark.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookmarkDraft {
    pub url: String,
    pub title: String,
    pub description: String,
    pub notes: String,
    pub is_favorite: bool,
    pub unread: bool,
    pub shared: bool,
    pub tag_names: Vec<String>,
}

impl BookmarkDraft {
    /// Creates a draft for `url` with every other field empty.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the notes.
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Sets the tag names.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_names = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the unread flag.
    pub fn unread(mut self, unread: bool) -> Self {
        self.unread = unread;
        self
    }

    /// Sets the shared flag.
    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// Validates the draft and returns its normalized form.
    ///
    /// - URL gets an `https://` scheme when missing; only http/https with a host are accepted
    /// - title, description and notes are length-limited
    /// - tag names are trimmed, empty ones dropped, exact duplicates removed
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] describing the first violated rule.
    pub fn validated(mut self) -> Result<Self> {
        self.url = normalize_url(&self.url)?;

        if self.title.chars().count() > MAX_TITLE_CHARS {
            return Err(Error::validation(format!(
                "title too long (max {MAX_TITLE_CHARS} characters)"
            )));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(Error::validation(format!(
                "description too long (max {MAX_DESCRIPTION_CHARS} characters)"
            )));
        }
        if self.notes.chars().count() > MAX_NOTES_CHARS {
            return Err(Error::validation(format!(
                "notes too long (max {MAX_NOTES_CHARS} characters)"
            )));
        }
        if self.tag_names.len() > MAX_TAGS {
            return Err(Error::validation(format!(
                "too many tags (max {MAX_TAGS})"
            )));
        }

        let mut tags: Vec<String> = Vec::with_capacity(self.tag_names.len());
        for tag in &self.tag_names {
            let trimmed = tag.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.chars().count() > MAX_TAG_CHARS {
                return Err(Error::validation(format!(
                    "tag name too long: {trimmed} (max {MAX_TAG_CHARS} characters)"
                )));
            }
            if !tags.iter().any(|t| t == trimmed) {
                tags.push(trimmed.to_string());
            }
        }
        self.tag_names = tags;

        Ok(self)
    }
}

/// Optional filters for listing and counting bookmarks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkFilter {
    /// Substring matched against title, description and URL.
    pub query: Option<String>,
    pub unread: Option<bool>,
    pub shared: Option<bool>,
    /// Exact, case-sensitive tag name.
    pub tag: Option<String>,
    pub folder: Option<FolderId>,
}

impl BookmarkFilter {
    /// Filter with no constraints.
    pub fn all() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validated_adds_https_scheme() {
        let draft = BookmarkDraft::new("example.com/page").validated().unwrap();
        assert_eq!(draft.url, "https://example.com/page");
    }

    #[test]
    fn validated_rejects_empty_url() {
        let err = BookmarkDraft::new("   ").validated().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn validated_rejects_non_http_scheme() {
        let err = BookmarkDraft::new("ftp://example.com")
            .validated()
            .unwrap_err();
        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn validated_trims_and_dedupes_tags() {
        let draft = BookmarkDraft::new("https://example.com")
            .tags([" rust ", "", "rust", "Rust"])
            .validated()
            .unwrap();
        assert_eq!(draft.tag_names, vec!["rust", "Rust"]);
    }

    #[test]
    fn validated_rejects_long_title() {
        let draft = BookmarkDraft::new("https://example.com").title("x".repeat(201));
        assert!(draft.validated().is_err());
    }

    #[test]
    fn validated_counts_characters_not_bytes() {
        let draft = BookmarkDraft::new("https://example.com").title("界".repeat(200));
        assert!(draft.validated().is_ok());
    }

    #[test]
    fn validated_rejects_too_many_tags() {
        let tags: Vec<String> = (0..51).map(|i| format!("tag{i}")).collect();
        let draft = BookmarkDraft::new("https://example.com").tags(tags);
        assert!(draft.validated().is_err());
    }

    #[test]
    fn draft_deserializes_with_missing_fields() {
        let draft: BookmarkDraft =
            serde_json::from_str(r#"{"url": "https://example.com"}"#).unwrap();
        assert_eq!(draft.url, "https://example.com");
        assert!(draft.tag_names.is_empty());
        assert!(!draft.unread);
    }
}
