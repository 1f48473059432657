//! Rule engine: matches bookmarks against workflow triggers and runs actions.

mod matcher;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{Action, Bookmark, BookmarkFilter, BookmarkId, Workflow, WorkflowDraft, WorkflowId};
use crate::store::{BookmarkStore, FolderStore, WorkflowStore};

/// Bookmarks loaded per page when applying workflows to the whole store.
pub const APPLY_PAGE_SIZE: usize = 10_000;

/// Totals from one run of the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Workflows considered.
    pub workflows: usize,
    /// Bookmarks considered.
    pub bookmarks: usize,
    /// (bookmark, workflow) pairs that matched.
    pub matches: usize,
    pub actions_executed: usize,
    /// Actions that returned an error. Each is logged.
    pub failures: usize,
}

impl ApplyReport {
    fn absorb(&mut self, other: ApplyReport) {
        self.matches += other.matches;
        self.actions_executed += other.actions_executed;
        self.failures += other.failures;
    }
}

/// Evaluates workflows and executes their actions.
///
/// Constructed with the stores it reads and writes; holds no other state.
pub struct WorkflowEngine {
    workflows: Arc<dyn WorkflowStore>,
    bookmarks: Arc<dyn BookmarkStore>,
    folders: Arc<dyn FolderStore>,
    page_size: usize,
}

impl WorkflowEngine {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        bookmarks: Arc<dyn BookmarkStore>,
        folders: Arc<dyn FolderStore>,
    ) -> Self {
        Self {
            workflows,
            bookmarks,
            folders,
            page_size: APPLY_PAGE_SIZE,
        }
    }

    /// Overrides how many bookmarks a bulk apply loads at once (minimum 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Validates and stores a new workflow at the end of the priority order.
    pub fn create(&self, draft: &WorkflowDraft) -> Result<Workflow> {
        draft.validate()?;
        let workflow = self.workflows.create_workflow(draft)?;
        info!(workflow_id = %workflow.id, name = %workflow.name, "Workflow created");
        Ok(workflow)
    }

    pub fn get(&self, id: WorkflowId) -> Result<Workflow> {
        self.workflows.get_workflow(id)?.ok_or(Error::NotFound {
            entity: "workflow",
            id: id.get(),
        })
    }

    /// All workflows in ascending priority.
    pub fn list(&self) -> Result<Vec<Workflow>> {
        self.workflows.list_workflows()
    }

    /// Validates the draft and replaces the workflow's definition.
    pub fn update(&self, id: WorkflowId, draft: &WorkflowDraft) -> Result<Workflow> {
        draft.validate()?;
        self.workflows.update_workflow(id, draft)
    }

    pub fn delete(&self, id: WorkflowId) -> Result<()> {
        self.workflows.delete_workflow(id)?;
        info!(workflow_id = %id, "Workflow deleted");
        Ok(())
    }

    pub fn toggle(&self, id: WorkflowId) -> Result<Workflow> {
        let workflow = self.workflows.toggle_workflow(id)?;
        info!(workflow_id = %id, enabled = workflow.enabled, "Workflow toggled");
        Ok(workflow)
    }

    /// Runs every enabled workflow, in priority order, against one bookmark.
    ///
    /// Every matching workflow runs; matching one does not stop the others.
    pub fn run_for_bookmark(&self, bookmark: &Bookmark) -> Result<ApplyReport> {
        let workflows: Vec<Workflow> = self
            .workflows
            .list_workflows()?
            .into_iter()
            .filter(|w| w.enabled)
            .collect();

        let mut report = ApplyReport {
            workflows: workflows.len(),
            bookmarks: 1,
            ..Default::default()
        };
        for workflow in &workflows {
            report.absorb(self.run_workflow(workflow, bookmark));
        }
        Ok(report)
    }

    /// Applies workflows to bookmarks in bulk.
    ///
    /// An empty `workflow_ids` selects every enabled workflow; explicitly
    /// listed workflows run even when disabled. An empty `bookmark_ids`
    /// selects every bookmark, loaded and evaluated one page at a time. Ids
    /// that do not resolve are logged and skipped.
    pub fn apply_workflows_to_bookmarks(
        &self,
        workflow_ids: &[WorkflowId],
        bookmark_ids: &[BookmarkId],
    ) -> Result<ApplyReport> {
        let workflows = self.select_workflows(workflow_ids)?;
        let mut report = ApplyReport {
            workflows: workflows.len(),
            ..Default::default()
        };

        if bookmark_ids.is_empty() {
            let filter = BookmarkFilter::all();
            loop {
                let page = self
                    .bookmarks
                    .list_bookmarks(self.page_size, report.bookmarks, &filter)?;
                let last = page.len() < self.page_size;
                self.run_batch(&workflows, &page, &mut report);
                if last {
                    break;
                }
            }
        } else {
            let selected = self.select_bookmarks(bookmark_ids);
            self.run_batch(&workflows, &selected, &mut report);
        }

        info!(
            workflows = report.workflows,
            bookmarks = report.bookmarks,
            matches = report.matches,
            failures = report.failures,
            "Workflows applied"
        );
        Ok(report)
    }

    fn select_workflows(&self, ids: &[WorkflowId]) -> Result<Vec<Workflow>> {
        if ids.is_empty() {
            return Ok(self
                .workflows
                .list_workflows()?
                .into_iter()
                .filter(|w| w.enabled)
                .collect());
        }

        let mut selected = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.workflows.get_workflow(id) {
                Ok(Some(workflow)) => selected.push(workflow),
                Ok(None) => warn!(workflow_id = %id, "Workflow not found, skipping"),
                Err(e) => warn!(workflow_id = %id, error = %e, "Failed to load workflow, skipping"),
            }
        }
        Ok(selected)
    }

    fn run_batch(&self, workflows: &[Workflow], bookmarks: &[Bookmark], report: &mut ApplyReport) {
        report.bookmarks += bookmarks.len();
        for bookmark in bookmarks {
            for workflow in workflows {
                report.absorb(self.run_workflow(workflow, bookmark));
            }
        }
    }

    fn select_bookmarks(&self, ids: &[BookmarkId]) -> Vec<Bookmark> {
        let mut selected = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.bookmarks.get_bookmark(id) {
                Ok(Some(bookmark)) => selected.push(bookmark),
                Ok(None) => warn!(bookmark_id = %id, "Bookmark not found, skipping"),
                Err(e) => warn!(bookmark_id = %id, error = %e, "Failed to load bookmark, skipping"),
            }
        }
        selected
    }

    fn run_workflow(&self, workflow: &Workflow, bookmark: &Bookmark) -> ApplyReport {
        let mut report = ApplyReport::default();
        if !workflow.matches(bookmark) {
            return report;
        }

        debug!(workflow_id = %workflow.id, bookmark_id = %bookmark.id, "Workflow matched");
        report.matches = 1;
        for action in &workflow.actions {
            match self.execute(action, bookmark) {
                Ok(true) => report.actions_executed += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failures += 1;
                    warn!(
                        workflow_id = %workflow.id,
                        bookmark_id = %bookmark.id,
                        action = action.action_type(),
                        error = %e,
                        "Workflow action failed"
                    );
                }
            }
        }
        report
    }

    /// Returns whether the action did anything.
    fn execute(&self, action: &Action, bookmark: &Bookmark) -> Result<bool> {
        match action {
            Action::MoveToFolder { folder_id } => {
                self.folders.add_bookmark_to_folder(bookmark.id, *folder_id)?;
                Ok(true)
            }
            Action::Unknown { action_type, .. } => {
                debug!(%action_type, "Ignoring unknown workflow action");
                Ok(false)
            }
        }
    }
}
