use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use super::TagId;

/// Usage count at which a `candidate` tag becomes `dynamic`.
pub const DYNAMIC_PROMOTION_THRESHOLD: i64 = 3;

/// Usage count at which a `dynamic` tag becomes `fixed`.
pub const FIXED_PROMOTION_THRESHOLD: i64 = 10;

/// Lifecycle state of a tag.
///
/// Tags move one way only: `candidate -> dynamic -> fixed`. `core` is assigned
/// externally and never touched by promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCategory {
    /// Curated by hand, never auto-managed.
    Core,
    /// Heavily used; stable.
    Fixed,
    /// Used often enough to be trusted, still eligible for merging.
    Dynamic,
    /// Newly seen tag.
    Candidate,
}

impl TagCategory {
    /// All categories, in display order.
    pub const ALL: [TagCategory; 4] = [Self::Core, Self::Fixed, Self::Dynamic, Self::Candidate];

    /// Returns the lowercase storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Fixed => "fixed",
            Self::Dynamic => "dynamic",
            Self::Candidate => "candidate",
        }
    }

    /// Returns the category a tag in this state moves to at `usage_count`, if any.
    ///
    /// Only one step is taken per call.
    ///
    /// # Examples
    ///
    /// ```
    /// use marks::TagCategory;
    ///
    /// assert_eq!(TagCategory::Candidate.promotion(2), None);
    /// assert_eq!(TagCategory::Candidate.promotion(3), Some(TagCategory::Dynamic));
    /// assert_eq!(TagCategory::Dynamic.promotion(10), Some(TagCategory::Fixed));
    /// assert_eq!(TagCategory::Core.promotion(1000), None);
    /// ```
    pub fn promotion(self, usage_count: i64) -> Option<TagCategory> {
        match self {
            Self::Candidate if usage_count >= DYNAMIC_PROMOTION_THRESHOLD => Some(Self::Dynamic),
            Self::Dynamic if usage_count >= FIXED_PROMOTION_THRESHOLD => Some(Self::Fixed),
            _ => None,
        }
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(Self::Core),
            "fixed" => Ok(Self::Fixed),
            "dynamic" => Ok(Self::Dynamic),
            "candidate" => Ok(Self::Candidate),
            other => Err(format!("unknown tag category: {other}")),
        }
    }
}

/// A shared tag referenced by bookmarks through an association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub category: TagCategory,
    /// Incremented on each new bookmark association and on each merge into this tag.
    pub usage_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_used: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Tag {
    /// Creates a `candidate` tag with zero usage, timestamped now.
    pub fn new(id: TagId, name: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            name: name.into(),
            category: TagCategory::Candidate,
            usage_count: 0,
            last_used: now,
            created_at: now,
        }
    }

    /// Sets the category.
    pub fn with_category(mut self, category: TagCategory) -> Self {
        self.category = category;
        self
    }

    /// Sets the usage count.
    pub fn with_usage(mut self, usage_count: i64) -> Self {
        self.usage_count = usage_count;
        self
    }
}

/// Records that one tag was folded into another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSynonym {
    pub main_tag_id: TagId,
    /// Id of the tag that no longer exists.
    pub synonym_tag_id: TagId,
    pub similarity_score: f64,
    pub auto_merged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_promotion_boundary() {
        assert_eq!(TagCategory::Candidate.promotion(2), None);
        assert_eq!(
            TagCategory::Candidate.promotion(3),
            Some(TagCategory::Dynamic)
        );
    }

    #[test]
    fn dynamic_promotion_boundary() {
        assert_eq!(TagCategory::Dynamic.promotion(9), None);
        assert_eq!(TagCategory::Dynamic.promotion(10), Some(TagCategory::Fixed));
    }

    #[test]
    fn candidate_with_high_usage_moves_one_step_only() {
        assert_eq!(
            TagCategory::Candidate.promotion(50),
            Some(TagCategory::Dynamic)
        );
    }

    #[test]
    fn fixed_and_core_are_terminal() {
        assert_eq!(TagCategory::Fixed.promotion(10_000), None);
        assert_eq!(TagCategory::Core.promotion(10_000), None);
    }

    #[test]
    fn category_round_trips_through_storage_name() {
        for category in TagCategory::ALL {
            assert_eq!(category.as_str().parse::<TagCategory>(), Ok(category));
        }
        assert!("archived".parse::<TagCategory>().is_err());
    }

    #[test]
    fn category_serializes_lowercase() {
        let json = serde_json::to_string(&TagCategory::Dynamic).unwrap();
        assert_eq!(json, r#""dynamic""#);
    }

    #[test]
    fn builder_helpers_set_fields() {
        let tag = Tag::new(TagId::new(1), "rust")
            .with_category(TagCategory::Fixed)
            .with_usage(12);
        assert_eq!(tag.name, "rust");
        assert_eq!(tag.category, TagCategory::Fixed);
        assert_eq!(tag.usage_count, 12);
    }
}
