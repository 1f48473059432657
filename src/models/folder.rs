use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::FolderId;

/// A named folder grouping bookmarks. Membership is many-to-many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
