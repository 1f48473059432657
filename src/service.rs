use std::sync::Arc;

use tracing::{info, warn};

use crate::ai::EnrichmentError;
use crate::enrichment::WorkerPool;
use crate::error::{Error, Result};
use crate::models::{Bookmark, BookmarkDraft, BookmarkFilter, BookmarkId};
use crate::store::BookmarkStore;
use crate::workflow::WorkflowEngine;

/// Default page size for [`ListOptions`].
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Service layer coordinating bookmark writes with automation.
///
/// Every create and update is validated and persisted, then run through the
/// workflow engine before the call returns. When an enrichment pool is
/// attached, the bookmark is also queued for enrichment. Neither step can
/// fail the write: workflow and queue problems are logged.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use marks::{BookmarkDraft, BookmarkService, Database, WorkflowEngine};
///
/// # fn main() -> marks::Result<()> {
/// let db = Arc::new(Database::in_memory()?);
/// let engine = WorkflowEngine::new(db.clone(), db.clone(), db.clone());
/// let service = BookmarkService::new(db, engine);
///
/// let bookmark = service.create(BookmarkDraft::new("example.com").title("Example"))?;
/// assert_eq!(bookmark.url, "https://example.com/");
/// # Ok(())
/// # }
/// ```
pub struct BookmarkService {
    bookmarks: Arc<dyn BookmarkStore>,
    workflows: WorkflowEngine,
    enrichment: Option<Arc<WorkerPool>>,
    enrich_on_write: bool,
}

/// Paging and filtering for [`BookmarkService::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub limit: usize,
    pub offset: usize,
    pub filter: BookmarkFilter,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
            filter: BookmarkFilter::all(),
        }
    }
}

impl BookmarkService {
    pub fn new(bookmarks: Arc<dyn BookmarkStore>, workflows: WorkflowEngine) -> Self {
        Self {
            bookmarks,
            workflows,
            enrichment: None,
            enrich_on_write: false,
        }
    }

    /// Attaches an enrichment pool.
    ///
    /// With `enrich_on_write` every create and update queues a task;
    /// otherwise the pool only serves [`enhance`](Self::enhance).
    pub fn with_enrichment(mut self, pool: Arc<WorkerPool>, enrich_on_write: bool) -> Self {
        self.enrichment = Some(pool);
        self.enrich_on_write = enrich_on_write;
        self
    }

    pub fn workflows(&self) -> &WorkflowEngine {
        &self.workflows
    }

    /// Validates and stores a bookmark. A URL that already exists is updated in place.
    pub fn create(&self, draft: BookmarkDraft) -> Result<Bookmark> {
        let draft = draft.validated()?;
        let bookmark = self.bookmarks.create_bookmark(&draft)?;
        info!(bookmark_id = %bookmark.id, url = %bookmark.url, "Bookmark saved");
        self.after_write(&bookmark);
        Ok(bookmark)
    }

    /// Validates the draft and replaces every field of bookmark `id`.
    pub fn update(&self, id: BookmarkId, draft: BookmarkDraft) -> Result<Bookmark> {
        let draft = draft.validated()?;
        let bookmark = self.bookmarks.update_bookmark(id, &draft)?;
        info!(bookmark_id = %id, "Bookmark updated");
        self.after_write(&bookmark);
        Ok(bookmark)
    }

    pub fn get(&self, id: BookmarkId) -> Result<Bookmark> {
        self.bookmarks.get_bookmark(id)?.ok_or(Error::NotFound {
            entity: "bookmark",
            id: id.get(),
        })
    }

    /// Bookmarks newest first.
    pub fn list(&self, options: &ListOptions) -> Result<Vec<Bookmark>> {
        self.bookmarks
            .list_bookmarks(options.limit, options.offset, &options.filter)
    }

    pub fn count(&self, filter: &BookmarkFilter) -> Result<usize> {
        self.bookmarks.count_bookmarks(filter)
    }

    pub fn delete(&self, id: BookmarkId) -> Result<()> {
        self.bookmarks.delete_bookmark(id)?;
        info!(bookmark_id = %id, "Bookmark deleted");
        Ok(())
    }

    /// Queues a manual enrichment of bookmark `id`.
    ///
    /// Returns whether the task was accepted; a full queue yields `false`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown bookmark, `Enrichment(Disabled)` when no
    /// pool is attached.
    pub fn enhance(&self, id: BookmarkId) -> Result<bool> {
        let pool = self
            .enrichment
            .as_ref()
            .ok_or(Error::Enrichment(EnrichmentError::Disabled))?;
        self.get(id)?;
        Ok(pool.submit(id))
    }

    fn after_write(&self, bookmark: &Bookmark) {
        match self.workflows.run_for_bookmark(bookmark) {
            Ok(report) if report.matches > 0 => {
                info!(
                    bookmark_id = %bookmark.id,
                    matches = report.matches,
                    actions = report.actions_executed,
                    "Workflows applied"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(bookmark_id = %bookmark.id, error = %e, "Workflow evaluation failed"),
        }

        if self.enrich_on_write
            && let Some(pool) = &self.enrichment
        {
            pool.submit(bookmark.id);
        }
    }
}
