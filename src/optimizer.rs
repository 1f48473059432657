//! Tag taxonomy maintenance: usage-based promotion and near-duplicate merging.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{Tag, TagCategory, TagId};
use crate::similarity::similarity;
use crate::store::TagStore;

/// Pairs scoring strictly above this are merged.
pub const MERGE_THRESHOLD: f64 = 0.80;

/// `stats()` flags the catalog once it holds more dynamic tags than this.
pub const DYNAMIC_TAG_LIMIT: usize = 50;

const TOP_TAG_COUNT: usize = 10;

/// Categories eligible for merging.
const MERGEABLE: [TagCategory; 2] = [TagCategory::Dynamic, TagCategory::Candidate];

/// One change made (or proposed) by an optimization pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OptimizationAction {
    /// `source` was folded into `target`.
    Merge {
        source: String,
        target: String,
        similarity: f64,
        /// Bookmarks carrying `source` when the merge was evaluated.
        affected_bookmarks: usize,
    },
    /// `tag` moved one step up the lifecycle.
    Promote {
        tag: String,
        from: TagCategory,
        to: TagCategory,
        usage_count: i64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptimizationSummary {
    pub total_merges: usize,
    pub total_promotions: usize,
    pub tags_before: usize,
    pub tags_after: usize,
}

/// Outcome of [`TagOptimizer::optimize`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    /// True when nothing was persisted.
    pub preview: bool,
    /// Promotions first, then merges, each in evaluation order.
    pub actions: Vec<OptimizationAction>,
    pub summary: OptimizationSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopTag {
    pub name: String,
    pub count: i64,
    pub category: TagCategory,
}

/// Catalog overview returned by [`TagOptimizer::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagStats {
    pub total: usize,
    pub core: usize,
    pub fixed: usize,
    pub dynamic: usize,
    pub candidate: usize,
    pub optimization_needed: bool,
    pub top_tags: Vec<TopTag>,
}

/// Keeps the tag catalog small by promoting and merging tags.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use marks::{Database, TagOptimizer};
///
/// # fn main() -> marks::Result<()> {
/// let db = Arc::new(Database::in_memory()?);
/// let optimizer = TagOptimizer::new(db);
///
/// let result = optimizer.optimize(true, true, true)?;
/// assert!(result.preview);
/// assert!(result.actions.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct TagOptimizer {
    tags: Arc<dyn TagStore>,
}

impl TagOptimizer {
    pub fn new(tags: Arc<dyn TagStore>) -> Self {
        Self { tags }
    }

    /// Runs one optimization pass.
    ///
    /// Both steps work from a single snapshot of the catalog taken up front.
    /// Promotions move each tag at most one step, and the merge pass picks
    /// its dynamic and candidate tags by their category in that snapshot, so
    /// a promotion persisted earlier in the pass never changes the merge set.
    ///
    /// With `dry_run` nothing is written and the result lists what would
    /// change. Otherwise each change is persisted as it is found; a change
    /// that fails to persist is logged and left out of the result.
    ///
    /// # Errors
    ///
    /// Fails only when the initial catalog snapshot cannot be read.
    pub fn optimize(
        &self,
        dry_run: bool,
        enable_merge: bool,
        enable_promotion: bool,
    ) -> Result<OptimizationResult> {
        let snapshot = self.tags.list_tags()?;
        let mut summary = OptimizationSummary {
            tags_before: snapshot.len(),
            ..Default::default()
        };
        let mut actions = Vec::new();

        if enable_promotion {
            let promotions = self.promote(&snapshot, dry_run);
            summary.total_promotions = promotions.len();
            actions.extend(promotions);
        }

        if enable_merge {
            let merges = self.merge_similar(&snapshot, dry_run);
            summary.total_merges = merges.len();
            actions.extend(merges);
        }

        summary.tags_after = summary.tags_before.saturating_sub(summary.total_merges);

        info!(
            dry_run,
            promotions = summary.total_promotions,
            merges = summary.total_merges,
            tags_before = summary.tags_before,
            tags_after = summary.tags_after,
            "Tag optimization finished"
        );

        Ok(OptimizationResult {
            preview: dry_run,
            actions,
            summary,
        })
    }

    fn promote(&self, snapshot: &[Tag], dry_run: bool) -> Vec<OptimizationAction> {
        let mut actions = Vec::new();

        for tag in snapshot {
            let Some(to) = tag.category.promotion(tag.usage_count) else {
                continue;
            };

            if !dry_run {
                if let Err(e) = self.tags.update_tag_category(tag.id, to) {
                    warn!(tag = %tag.name, error = %e, "Tag promotion failed");
                    continue;
                }
                info!(tag = %tag.name, from = %tag.category, %to, usage = tag.usage_count, "Tag promoted");
            }

            actions.push(OptimizationAction::Promote {
                tag: tag.name.clone(),
                from: tag.category,
                to,
                usage_count: tag.usage_count,
            });
        }

        actions
    }

    /// Greedy first-match merging over unordered pairs in catalog order.
    ///
    /// A tag consumed as a merge source is skipped for the rest of the pass,
    /// in dry runs too, so a preview proposes exactly what an applied run
    /// would do.
    fn merge_similar(&self, snapshot: &[Tag], dry_run: bool) -> Vec<OptimizationAction> {
        let mut candidates: Vec<&Tag> = snapshot
            .iter()
            .filter(|tag| MERGEABLE.contains(&tag.category))
            .collect();
        let mut actions = Vec::new();
        if candidates.len() < 2 {
            return actions;
        }
        candidates.sort_by(|a, b| {
            b.usage_count
                .cmp(&a.usage_count)
                .then_with(|| a.name.cmp(&b.name))
        });

        debug!(count = candidates.len(), "Checking tags for near-duplicates");

        let mut consumed: HashSet<TagId> = HashSet::new();
        for (i, &first) in candidates.iter().enumerate() {
            if consumed.contains(&first.id) {
                continue;
            }

            for &second in &candidates[i + 1..] {
                if consumed.contains(&second.id) {
                    continue;
                }

                let score = similarity(&first.name, &second.name);
                if score <= MERGE_THRESHOLD {
                    continue;
                }

                // On equal usage the later tag in catalog order (usage desc,
                // name asc) is folded into the earlier one.
                let (source, target) = if first.usage_count >= second.usage_count {
                    (second, first)
                } else {
                    (first, second)
                };

                let affected_bookmarks = self.tags.tag_bookmark_count(source.id).unwrap_or_else(|e| {
                    warn!(tag = %source.name, error = %e, "Could not count tagged bookmarks");
                    0
                });

                if !dry_run {
                    if let Err(e) = self.tags.merge_tags(source.id, target.id) {
                        warn!(source = %source.name, target = %target.name, error = %e, "Tag merge failed");
                        continue;
                    }
                    info!(source = %source.name, target = %target.name, similarity = score, "Tags merged");
                }

                consumed.insert(source.id);
                actions.push(OptimizationAction::Merge {
                    source: source.name.clone(),
                    target: target.name.clone(),
                    similarity: score,
                    affected_bookmarks,
                });

                if source.id == first.id {
                    break;
                }
            }
        }

        actions
    }

    /// Summarizes the catalog by category and lists the most used tags.
    pub fn stats(&self) -> Result<TagStats> {
        let counts = self.tags.count_tags_by_category()?;
        let count = |category: TagCategory| counts.get(&category).copied().unwrap_or(0);

        let top_tags = self
            .tags
            .top_tags(TOP_TAG_COUNT)?
            .into_iter()
            .map(|tag| TopTag {
                name: tag.name,
                count: tag.usage_count,
                category: tag.category,
            })
            .collect();

        let dynamic = count(TagCategory::Dynamic);
        Ok(TagStats {
            total: counts.values().sum(),
            core: count(TagCategory::Core),
            fixed: count(TagCategory::Fixed),
            dynamic,
            candidate: count(TagCategory::Candidate),
            optimization_needed: dynamic > DYNAMIC_TAG_LIMIT,
            top_tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::models::BookmarkDraft;
    use crate::store::BookmarkStore;

    /// Creates `name` with the given category and usage, attached to one bookmark.
    fn seed(db: &Database, name: &str, category: TagCategory, usage: i64) -> Tag {
        db.create_bookmark(&BookmarkDraft::new(format!("https://{name}.example")).tags([name]))
            .unwrap();
        let tag = db.get_tag_by_name(name).unwrap().unwrap();
        db.connection()
            .execute(
                "UPDATE tags SET usage_count = ?2, category = ?3 WHERE id = ?1",
                rusqlite::params![tag.id.get(), usage, category.as_str()],
            )
            .unwrap();
        db.get_tag(tag.id).unwrap().unwrap()
    }

    fn setup() -> (Arc<Database>, TagOptimizer) {
        let db = Arc::new(Database::in_memory().unwrap());
        let optimizer = TagOptimizer::new(db.clone());
        (db, optimizer)
    }

    #[test]
    fn promotion_boundaries() {
        let (db, optimizer) = setup();
        seed(&db, "two", TagCategory::Candidate, 2);
        seed(&db, "three", TagCategory::Candidate, 3);
        seed(&db, "nine", TagCategory::Dynamic, 9);
        seed(&db, "ten", TagCategory::Dynamic, 10);

        let result = optimizer.optimize(false, false, true).unwrap();
        assert_eq!(result.summary.total_promotions, 2);

        let category = |name| db.get_tag_by_name(name).unwrap().unwrap().category;
        assert_eq!(category("two"), TagCategory::Candidate);
        assert_eq!(category("three"), TagCategory::Dynamic);
        assert_eq!(category("nine"), TagCategory::Dynamic);
        assert_eq!(category("ten"), TagCategory::Fixed);
    }

    #[test]
    fn promotion_takes_one_step_per_pass() {
        let (db, optimizer) = setup();
        seed(&db, "busy", TagCategory::Candidate, 25);

        optimizer.optimize(false, false, true).unwrap();
        assert_eq!(
            db.get_tag_by_name("busy").unwrap().unwrap().category,
            TagCategory::Dynamic
        );

        optimizer.optimize(false, false, true).unwrap();
        assert_eq!(
            db.get_tag_by_name("busy").unwrap().unwrap().category,
            TagCategory::Fixed
        );
    }

    #[test]
    fn core_tags_are_never_promoted_or_merged() {
        let (db, optimizer) = setup();
        seed(&db, "rust", TagCategory::Core, 100);
        seed(&db, "rustlang", TagCategory::Candidate, 1);

        let result = optimizer.optimize(false, true, true).unwrap();

        assert!(result.actions.is_empty());
        assert_eq!(
            db.get_tag_by_name("rust").unwrap().unwrap().category,
            TagCategory::Core
        );
    }

    #[test]
    fn dry_run_reports_without_writing() {
        let (db, optimizer) = setup();
        seed(&db, "react", TagCategory::Dynamic, 5);
        seed(&db, "reactjs", TagCategory::Dynamic, 2);
        seed(&db, "candidate", TagCategory::Candidate, 3);

        let result = optimizer.optimize(true, true, true).unwrap();

        assert!(result.preview);
        assert_eq!(result.summary.total_promotions, 1);
        assert_eq!(result.summary.total_merges, 1);
        assert_eq!(result.summary.tags_after, 2);
        assert!(db.get_tag_by_name("reactjs").unwrap().is_some());
        assert_eq!(
            db.get_tag_by_name("candidate").unwrap().unwrap().category,
            TagCategory::Candidate
        );
    }

    #[test]
    fn equal_usage_folds_later_name_into_earlier() {
        let (db, optimizer) = setup();
        seed(&db, "vue", TagCategory::Candidate, 1);
        seed(&db, "vuejs", TagCategory::Candidate, 1);

        let result = optimizer.optimize(false, true, false).unwrap();

        assert_eq!(
            result.actions,
            vec![OptimizationAction::Merge {
                source: "vuejs".into(),
                target: "vue".into(),
                similarity: 0.85,
                affected_bookmarks: 1,
            }]
        );
        assert!(db.get_tag_by_name("vuejs").unwrap().is_none());
    }

    #[test]
    fn consumed_tags_are_not_merged_twice() {
        let (db, optimizer) = setup();
        seed(&db, "go", TagCategory::Dynamic, 9);
        seed(&db, "golang", TagCategory::Dynamic, 4);
        seed(&db, "golangs", TagCategory::Candidate, 1);

        let result = optimizer.optimize(false, true, false).unwrap();

        // "golang" and "golangs" both fold into "go"; "golangs" is never
        // re-evaluated against "golang" once consumed.
        let sources: Vec<&str> = result
            .actions
            .iter()
            .filter_map(|a| match a {
                OptimizationAction::Merge { source, target, .. } if target == "go" => {
                    Some(source.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(sources, vec!["golang", "golangs"]);
        assert_eq!(result.summary.tags_after, 1);
        assert_eq!(db.list_tags().unwrap().len(), 1);
    }

    #[test]
    fn preview_matches_applied_run() {
        // Arrange: "react" crosses the fixed threshold in this pass
        let (db, optimizer) = setup();
        seed(&db, "react", TagCategory::Dynamic, 10);
        seed(&db, "reactjs", TagCategory::Dynamic, 2);

        // Act
        let preview = optimizer.optimize(true, true, true).unwrap();
        let applied = optimizer.optimize(false, true, true).unwrap();

        // Assert
        assert_eq!(preview.actions, applied.actions);
        assert_eq!(preview.summary, applied.summary);
        assert_eq!(applied.summary.total_promotions, 1);
        assert_eq!(applied.summary.total_merges, 1);
        assert!(db.get_tag_by_name("reactjs").unwrap().is_none());
        assert_eq!(
            db.get_tag_by_name("react").unwrap().unwrap().category,
            TagCategory::Fixed
        );
    }

    /// Delegates to a real database but fails writes touching `failing` ids.
    struct FlakyTags {
        inner: Arc<Database>,
        failing: HashSet<TagId>,
    }

    impl FlakyTags {
        fn check(&self, id: TagId) -> Result<()> {
            if self.failing.contains(&id) {
                return Err(crate::Error::validation("storage unavailable"));
            }
            Ok(())
        }
    }

    impl TagStore for FlakyTags {
        fn list_tags(&self) -> Result<Vec<Tag>> {
            self.inner.list_tags()
        }
        fn list_tags_by_categories(&self, categories: &[TagCategory]) -> Result<Vec<Tag>> {
            self.inner.list_tags_by_categories(categories)
        }
        fn get_tag(&self, id: TagId) -> Result<Option<Tag>> {
            self.inner.get_tag(id)
        }
        fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
            self.inner.get_tag_by_name(name)
        }
        fn get_or_create_tag(&self, name: &str) -> Result<Tag> {
            self.inner.get_or_create_tag(name)
        }
        fn update_tag_category(&self, id: TagId, category: TagCategory) -> Result<()> {
            self.check(id)?;
            self.inner.update_tag_category(id, category)
        }
        fn tag_bookmark_count(&self, id: TagId) -> Result<usize> {
            self.inner.tag_bookmark_count(id)
        }
        fn merge_tag_bookmarks(&self, from: TagId, into: TagId) -> Result<usize> {
            self.inner.merge_tag_bookmarks(from, into)
        }
        fn record_synonym(
            &self,
            main: TagId,
            synonym: TagId,
            similarity_score: f64,
            auto_merged: bool,
        ) -> Result<()> {
            self.inner
                .record_synonym(main, synonym, similarity_score, auto_merged)
        }
        fn delete_tag(&self, id: TagId) -> Result<()> {
            self.inner.delete_tag(id)
        }
        fn increment_tag_usage(&self, id: TagId) -> Result<()> {
            self.inner.increment_tag_usage(id)
        }
        fn top_tags(&self, limit: usize) -> Result<Vec<Tag>> {
            self.inner.top_tags(limit)
        }
        fn count_tags_by_category(&self) -> Result<std::collections::HashMap<TagCategory, usize>> {
            self.inner.count_tags_by_category()
        }
        fn merge_tags(&self, from: TagId, into: TagId) -> Result<usize> {
            self.check(from)?;
            self.inner.merge_tags(from, into)
        }
    }

    #[test]
    fn failed_writes_are_skipped_and_the_pass_continues() {
        // Arrange: one promotion and one merge are set up to fail
        let db = Arc::new(Database::in_memory().unwrap());
        let stuck = seed(&db, "aaa", TagCategory::Candidate, 3);
        seed(&db, "bbb", TagCategory::Candidate, 3);
        seed(&db, "svelte", TagCategory::Candidate, 1);
        seed(&db, "sveltejs", TagCategory::Candidate, 1);
        seed(&db, "vue", TagCategory::Candidate, 1);
        let unmergeable = seed(&db, "vuejs", TagCategory::Candidate, 1);
        let optimizer = TagOptimizer::new(Arc::new(FlakyTags {
            inner: db.clone(),
            failing: HashSet::from([stuck.id, unmergeable.id]),
        }));

        // Act
        let result = optimizer.optimize(false, true, true).unwrap();

        // Assert: only the completed writes are reported
        assert_eq!(
            result.actions,
            vec![
                OptimizationAction::Promote {
                    tag: "bbb".into(),
                    from: TagCategory::Candidate,
                    to: TagCategory::Dynamic,
                    usage_count: 3,
                },
                OptimizationAction::Merge {
                    source: "sveltejs".into(),
                    target: "svelte".into(),
                    similarity: 0.85,
                    affected_bookmarks: 1,
                },
            ]
        );
        assert_eq!(result.summary.tags_before, 6);
        assert_eq!(result.summary.tags_after, 5);

        let category = |name| db.get_tag_by_name(name).unwrap().unwrap().category;
        assert_eq!(category("aaa"), TagCategory::Candidate);
        assert_eq!(category("bbb"), TagCategory::Dynamic);
        assert!(db.get_tag_by_name("vuejs").unwrap().is_some());
        assert!(db.get_tag_by_name("sveltejs").unwrap().is_none());
    }

    #[test]
    fn merge_pass_needs_two_tags() {
        let (db, optimizer) = setup();
        seed(&db, "solo", TagCategory::Dynamic, 4);

        let result = optimizer.optimize(false, true, false).unwrap();
        assert!(result.actions.is_empty());
        assert_eq!(result.summary.tags_after, 1);
    }

    #[test]
    fn action_json_is_tagged_by_type() {
        let action = OptimizationAction::Promote {
            tag: "x".into(),
            from: TagCategory::Candidate,
            to: TagCategory::Dynamic,
            usage_count: 3,
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "promote");
        assert_eq!(json["to"], "dynamic");
    }

    #[test]
    fn stats_counts_and_flags() {
        let (db, optimizer) = setup();
        for i in 0..51 {
            seed(&db, &format!("dyn{i:02}"), TagCategory::Dynamic, i);
        }
        seed(&db, "core", TagCategory::Core, 0);

        let stats = optimizer.stats().unwrap();

        assert_eq!(stats.total, 52);
        assert_eq!(stats.dynamic, 51);
        assert_eq!(stats.core, 1);
        assert!(stats.optimization_needed);
        assert_eq!(stats.top_tags.len(), 10);
        assert_eq!(stats.top_tags[0].name, "dyn50");
    }

    #[test]
    fn stats_not_flagged_at_fifty() {
        let (db, optimizer) = setup();
        for i in 0..50 {
            seed(&db, &format!("t{i:02}"), TagCategory::Dynamic, 1);
        }
        assert!(!optimizer.stats().unwrap().optimization_needed);
    }
}
