//! Error types shared by the stores and the automation engines.

use thiserror::Error;

use crate::ai::EnrichmentError;
use crate::models::TagId;

/// Errors produced by storage and by the workflow, optimizer and enrichment layers.
#[derive(Debug, Error)]
pub enum Error {
    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// Caller supplied malformed input (bad URL, bad trigger config, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// SQLite failure, including busy-timeout expiry.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON encoding/decoding of persisted configuration failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A tag merge was rolled back; the source tag still exists with its associations.
    #[error("Merge of tag {from_tag} into {into_tag} was not completed: {cause}")]
    MergeIncomplete {
        from_tag: TagId,
        into_tag: TagId,
        #[source]
        cause: rusqlite::Error,
    },

    /// The external enrichment client failed.
    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),
}

impl Error {
    /// Shorthand for building a [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns true for errors caused by caller input rather than by the system.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Validation(_))
    }
}

/// Result alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn not_found_message_names_entity_and_id() {
        let err = Error::NotFound {
            entity: "bookmark",
            id: 42,
        };
        assert_eq!(err.to_string(), "bookmark not found: 42");
        assert!(err.is_user_error());
    }

    #[test]
    fn merge_incomplete_keeps_source_chain() {
        let err = Error::MergeIncomplete {
            from_tag: TagId::new(1),
            into_tag: TagId::new(2),
            cause: rusqlite::Error::QueryReturnedNoRows,
        };
        assert!(err.to_string().contains("not completed"));
        assert!(err.source().is_some());
        assert!(!err.is_user_error());
    }
}
