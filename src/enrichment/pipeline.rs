use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::ai::{AiSuggestion, EnrichmentClient, PageMetadata};
use crate::error::{Error, Result};
use crate::models::{Bookmark, BookmarkDraft, BookmarkId};
use crate::store::BookmarkStore;

/// What a single enrichment task did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    Updated(Bookmark),
    /// The suggestion matched what was already stored.
    Unchanged,
}

/// Scrapes, prompts, merges and persists enrichment for one bookmark at a time.
pub struct Enricher {
    bookmarks: Arc<dyn BookmarkStore>,
    client: Arc<dyn EnrichmentClient>,
}

impl Enricher {
    pub fn new(bookmarks: Arc<dyn BookmarkStore>, client: Arc<dyn EnrichmentClient>) -> Self {
        Self { bookmarks, client }
    }

    /// Enriches the bookmark with the given id.
    ///
    /// A failed scrape degrades to a URL-only prompt. Any other failure aborts
    /// the task and is returned; nothing is retried.
    pub fn enrich(&self, id: BookmarkId) -> Result<EnrichmentOutcome> {
        let bookmark = self.bookmarks.get_bookmark(id)?.ok_or(Error::NotFound {
            entity: "bookmark",
            id: id.get(),
        })?;

        let metadata = match self.client.scrape_metadata(&bookmark.url) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(bookmark_id = %id, url = %bookmark.url, error = %e, "Scrape failed, prompting with URL only");
                PageMetadata::default()
            }
        };

        let prompt = build_prompt(&bookmark.url, &metadata);
        let suggestion = self.client.complete(&prompt)?;
        debug!(bookmark_id = %id, tags = suggestion.tags.len(), "Received suggestion");

        let current = bookmark.to_draft();
        let merged = merge_suggestion(&bookmark, &suggestion);
        if merged == current {
            info!(bookmark_id = %id, "Enrichment produced no changes");
            return Ok(EnrichmentOutcome::Unchanged);
        }

        let updated = self.bookmarks.update_bookmark(id, &merged)?;
        info!(bookmark_id = %id, "Bookmark enriched");
        Ok(EnrichmentOutcome::Updated(updated))
    }
}

/// Builds the completion prompt.
///
/// Open Graph title and description are preferred over the plain ones. With
/// no page text at all the prompt carries only the URL.
pub fn build_prompt(url: &str, metadata: &PageMetadata) -> String {
    let title = first_non_empty(&metadata.og_title, &metadata.title);
    let description = first_non_empty(&metadata.og_description, &metadata.description);

    let context = if title.is_empty() && description.is_empty() {
        format!("Analyze this web page URL and describe it as a bookmark.\n\nURL: {url}\n")
    } else {
        format!(
            "Analyze this web page and describe it as a bookmark.\n\nURL: {url}\nPage title: {title}\nPage description: {description}\n"
        )
    };

    format!(
        "{context}
Respond with JSON only, without Markdown code fences, in this shape:
{{
  \"title\": \"a concise title\",
  \"description\": \"a summary of the page's main content in two or three sentences\",
  \"tags\": [\"tag1\", \"tag2\", \"tag3\"]
}}

Use 3 to 5 accurate tags."
    )
}

fn first_non_empty<'a>(preferred: &'a str, fallback: &'a str) -> &'a str {
    if preferred.trim().is_empty() {
        fallback.trim()
    } else {
        preferred.trim()
    }
}

/// Applies a suggestion to a bookmark's current values.
///
/// Non-empty title and description replace the stored ones. Suggested tags
/// are appended unless an identically spelled tag is already present.
pub fn merge_suggestion(bookmark: &Bookmark, suggestion: &AiSuggestion) -> BookmarkDraft {
    let mut draft = bookmark.to_draft();

    let title = suggestion.title.trim();
    if !title.is_empty() {
        draft.title = title.to_string();
    }
    let description = suggestion.description.trim();
    if !description.is_empty() {
        draft.description = description.to_string();
    }

    for tag in &suggestion.tags {
        let tag = tag.trim();
        if !tag.is_empty() && !draft.tag_names.iter().any(|t| t == tag) {
            draft.tag_names.push(tag.to_string());
        }
    }

    draft
}
