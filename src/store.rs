//! Storage contracts consumed by the automation components.
//!
//! The optimizer, workflow engine and enrichment pool never talk to SQLite
//! directly; they hold these traits as `Arc<dyn ...>` so tests can substitute
//! in-memory fakes. [`Database`](crate::Database) implements all of them.

use std::collections::HashMap;

use crate::error::Result;
use crate::models::{
    Bookmark, BookmarkDraft, BookmarkFilter, BookmarkId, Folder, FolderId, Tag, TagCategory,
    TagId, Workflow, WorkflowDraft, WorkflowId,
};

/// Bookmark persistence.
pub trait BookmarkStore: Send + Sync {
    /// Inserts a bookmark, or replaces the existing record with the same URL.
    fn create_bookmark(&self, draft: &BookmarkDraft) -> Result<Bookmark>;

    /// Replaces every field of an existing bookmark, including its tag set.
    fn update_bookmark(&self, id: BookmarkId, draft: &BookmarkDraft) -> Result<Bookmark>;

    fn get_bookmark(&self, id: BookmarkId) -> Result<Option<Bookmark>>;

    fn get_bookmark_by_url(&self, url: &str) -> Result<Option<Bookmark>>;

    /// Lists bookmarks newest first.
    fn list_bookmarks(
        &self,
        limit: usize,
        offset: usize,
        filter: &BookmarkFilter,
    ) -> Result<Vec<Bookmark>>;

    /// Fails with `NotFound` when no bookmark has this id.
    fn delete_bookmark(&self, id: BookmarkId) -> Result<()>;

    fn count_bookmarks(&self, filter: &BookmarkFilter) -> Result<usize>;
}

/// Tag catalog persistence.
pub trait TagStore: Send + Sync {
    /// All tags ordered by name.
    fn list_tags(&self) -> Result<Vec<Tag>>;

    /// Tags in any of `categories`, in catalog order: usage descending, then
    /// name ascending.
    fn list_tags_by_categories(&self, categories: &[TagCategory]) -> Result<Vec<Tag>>;

    fn get_tag(&self, id: TagId) -> Result<Option<Tag>>;

    fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// Returns the existing tag named `name` or creates a `candidate` one.
    fn get_or_create_tag(&self, name: &str) -> Result<Tag>;

    fn update_tag_category(&self, id: TagId, category: TagCategory) -> Result<()>;

    /// Number of bookmarks associated with the tag.
    fn tag_bookmark_count(&self, id: TagId) -> Result<usize>;

    /// Re-points associations from `from` to `into`, skipping bookmarks that
    /// already carry `into`, then removes the remaining `from` associations.
    /// Returns the number of associations moved.
    fn merge_tag_bookmarks(&self, from: TagId, into: TagId) -> Result<usize>;

    fn record_synonym(
        &self,
        main: TagId,
        synonym: TagId,
        similarity_score: f64,
        auto_merged: bool,
    ) -> Result<()>;

    fn delete_tag(&self, id: TagId) -> Result<()>;

    fn increment_tag_usage(&self, id: TagId) -> Result<()>;

    /// Tags with non-zero usage, usage descending then name ascending.
    fn top_tags(&self, limit: usize) -> Result<Vec<Tag>>;

    fn count_tags_by_category(&self) -> Result<HashMap<TagCategory, usize>>;

    /// Folds `from` into `into` as a single unit: moves associations, records
    /// `from` as an auto-merged synonym of `into`, deletes `from` and bumps the
    /// usage of `into`. Either every step lands or none does.
    ///
    /// Returns the number of associations moved.
    fn merge_tags(&self, from: TagId, into: TagId) -> Result<usize>;
}

/// Folder persistence.
pub trait FolderStore: Send + Sync {
    fn create_folder(&self, name: &str) -> Result<Folder>;

    fn get_folder(&self, id: FolderId) -> Result<Option<Folder>>;

    fn list_folders(&self) -> Result<Vec<Folder>>;

    /// Fails with `NotFound` when no folder has this id.
    fn rename_folder(&self, id: FolderId, name: &str) -> Result<Folder>;

    /// Deletes the folder and its memberships; the bookmarks themselves stay.
    fn delete_folder(&self, id: FolderId) -> Result<()>;

    /// Adds a bookmark to a folder. Adding an existing member is a no-op.
    fn add_bookmark_to_folder(&self, bookmark: BookmarkId, folder: FolderId) -> Result<()>;

    fn remove_bookmark_from_folder(&self, bookmark: BookmarkId, folder: FolderId) -> Result<()>;

    fn folders_for_bookmark(&self, bookmark: BookmarkId) -> Result<Vec<Folder>>;

    /// Members of `folder`, newest first, with the folder's total member count.
    fn bookmarks_in_folder(
        &self,
        folder: FolderId,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Bookmark>, usize)>;
}

/// Workflow persistence.
pub trait WorkflowStore: Send + Sync {
    /// Persists a new workflow after every existing one in priority order.
    fn create_workflow(&self, draft: &WorkflowDraft) -> Result<Workflow>;

    fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>>;

    /// All workflows, ascending priority.
    fn list_workflows(&self) -> Result<Vec<Workflow>>;

    /// Replaces name, description, enabled flag, logic, triggers and actions.
    /// Priority is kept.
    fn update_workflow(&self, id: WorkflowId, draft: &WorkflowDraft) -> Result<Workflow>;

    fn delete_workflow(&self, id: WorkflowId) -> Result<()>;

    /// Flips the enabled flag and returns the updated workflow.
    fn toggle_workflow(&self, id: WorkflowId) -> Result<Workflow>;
}
