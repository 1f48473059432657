pub mod ai;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod models;
pub mod optimizer;
pub mod service;
pub mod similarity;
pub mod store;
pub mod utils;
pub mod workflow;

pub use config::Config;
pub use db::Database;
pub use enrichment::{Enricher, WorkerPool};
pub use error::{Error, Result};
pub use models::{
    Action, Bookmark, BookmarkDraft, BookmarkFilter, BookmarkId, ConditionLogic, Folder, FolderId,
    KeywordField, LifecycleEvent, MatchMode, Tag, TagCategory, TagId, Trigger, Workflow,
    WorkflowDraft, WorkflowId,
};
pub use optimizer::{OptimizationAction, OptimizationResult, TagOptimizer, TagStats};
pub use service::{BookmarkService, ListOptions};
pub use similarity::similarity;
pub use store::{BookmarkStore, FolderStore, TagStore, WorkflowStore};
pub use workflow::{ApplyReport, WorkflowEngine};
