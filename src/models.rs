mod bookmark;
mod folder;
mod ids;
mod tag;
mod workflow;

pub use bookmark::{Bookmark, BookmarkDraft, BookmarkFilter};
pub use folder::Folder;
pub use ids::{BookmarkId, FolderId, TagId, WorkflowId};
pub use tag::{DYNAMIC_PROMOTION_THRESHOLD, FIXED_PROMOTION_THRESHOLD, Tag, TagCategory, TagSynonym};
pub use workflow::{
    Action, ConditionLogic, KeywordField, LifecycleEvent, MatchMode, TextMatch, Trigger, Workflow,
    WorkflowDraft,
};
