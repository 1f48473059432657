use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates a new ID.
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the underlying ID value.
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a bookmark.
    ///
    /// Wraps a database ID to provide type safety and prevent accidental
    /// mixing of different ID types.
    BookmarkId
);

define_id!(
    /// Unique identifier for a tag.
    TagId
);

define_id!(
    /// Unique identifier for a folder.
    FolderId
);

define_id!(
    /// Unique identifier for a workflow.
    WorkflowId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookmark_id_serializes_as_raw_integer() {
        let id = BookmarkId::new(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "42");

        let deserialized: BookmarkId = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, id);
    }

    #[test]
    fn folder_id_displays_inner_value() {
        assert_eq!(FolderId::new(7).to_string(), "7");
    }

    #[test]
    fn ids_are_not_interchangeable() {
        // These lines would fail to compile:
        // let bookmark_id: BookmarkId = TagId::new(1);
        // let tag_id: TagId = WorkflowId::new(1);
        let bookmark_id = BookmarkId::new(1);
        let tag_id = TagId::new(1);

        assert_eq!(bookmark_id.get(), tag_id.get());
    }
}
