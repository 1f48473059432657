use std::collections::HashMap;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::{Database, now_unix, timestamp};
use crate::error::{Error, Result};
use crate::models::{Tag, TagCategory, TagId, TagSynonym};
use crate::store::TagStore;

const TAG_COLUMNS: &str = "id, name, category, usage_count, last_used, created_at";

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    let category: String = row.get(2)?;
    let category = category
        .parse::<TagCategory>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;

    Ok(Tag {
        id: TagId::new(row.get(0)?),
        name: row.get(1)?,
        category,
        usage_count: row.get(3)?,
        last_used: timestamp(row, 4)?,
        created_at: timestamp(row, 5)?,
    })
}

fn get_by_name_in(conn: &Connection, name: &str) -> rusqlite::Result<Option<Tag>> {
    conn.query_row(
        &format!("SELECT {TAG_COLUMNS} FROM tags WHERE name = ?1"),
        [name],
        tag_from_row,
    )
    .optional()
}

/// Looks a tag up by exact name, creating a zero-usage `candidate` if absent.
pub(super) fn get_or_create_in(conn: &Connection, name: &str, now: i64) -> Result<Tag> {
    if let Some(tag) = get_by_name_in(conn, name)? {
        return Ok(tag);
    }
    conn.execute(
        "INSERT INTO tags (name, category, usage_count, last_used, created_at)
         VALUES (?1, 'candidate', 0, ?2, ?2)",
        params![name, now],
    )?;
    get_by_name_in(conn, name)?.ok_or(Error::NotFound {
        entity: "tag",
        id: conn.last_insert_rowid(),
    })
}

fn merge_bookmarks_in(conn: &Connection, from: TagId, into: TagId) -> rusqlite::Result<usize> {
    let moved = conn.execute(
        "INSERT OR IGNORE INTO bookmark_tags (bookmark_id, tag_id)
         SELECT bookmark_id, ?2 FROM bookmark_tags WHERE tag_id = ?1",
        params![from.get(), into.get()],
    )?;
    conn.execute(
        "DELETE FROM bookmark_tags WHERE tag_id = ?1",
        [from.get()],
    )?;
    Ok(moved)
}

fn record_synonym_in(
    conn: &Connection,
    main: TagId,
    synonym: TagId,
    similarity_score: f64,
    auto_merged: bool,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO tag_synonyms
         (main_tag_id, synonym_tag_id, similarity_score, auto_merged, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![main.get(), synonym.get(), similarity_score, auto_merged, now_unix()],
    )?;
    Ok(())
}

/// Runs an UPDATE/DELETE that must touch exactly one tag row.
fn execute_on_tag(conn: &Connection, sql: &str, id: TagId) -> rusqlite::Result<()> {
    match conn.execute(sql, [id.get()])? {
        0 => Err(rusqlite::Error::QueryReturnedNoRows),
        _ => Ok(()),
    }
}

fn not_found(id: TagId) -> Error {
    Error::NotFound {
        entity: "tag",
        id: id.get(),
    }
}

/// Maps "no row touched" to `NotFound` for single-tag operations.
fn require_row(result: rusqlite::Result<()>, id: TagId) -> Result<()> {
    match result {
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(not_found(id)),
        other => Ok(other?),
    }
}

const DELETE_TAG: &str = "DELETE FROM tags WHERE id = ?1";
const INCREMENT_USAGE: &str =
    "UPDATE tags SET usage_count = usage_count + 1, last_used = strftime('%s', 'now') WHERE id = ?1";

impl Database {
    /// Returns the synonym records whose main tag is `main`.
    pub fn list_synonyms(&self, main: TagId) -> Result<Vec<TagSynonym>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT main_tag_id, synonym_tag_id, similarity_score, auto_merged
             FROM tag_synonyms WHERE main_tag_id = ?1
             ORDER BY synonym_tag_id",
        )?;
        let synonyms = stmt
            .query_map([main.get()], |row| {
                Ok(TagSynonym {
                    main_tag_id: TagId::new(row.get(0)?),
                    synonym_tag_id: TagId::new(row.get(1)?),
                    similarity_score: row.get(2)?,
                    auto_merged: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(synonyms)
    }
}

impl TagStore for Database {
    fn list_tags(&self) -> Result<Vec<Tag>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!("SELECT {TAG_COLUMNS} FROM tags ORDER BY name"))?;
        let tags = stmt
            .query_map([], tag_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    fn list_tags_by_categories(&self, categories: &[TagCategory]) -> Result<Vec<Tag>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; categories.len()].join(", ");
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TAG_COLUMNS} FROM tags
             WHERE category IN ({placeholders})
             ORDER BY usage_count DESC, name ASC"
        ))?;
        let tags = stmt
            .query_map(
                params_from_iter(categories.iter().map(|c| c.as_str())),
                tag_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    fn get_tag(&self, id: TagId) -> Result<Option<Tag>> {
        let tag = self
            .connection()
            .query_row(
                &format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?1"),
                [id.get()],
                tag_from_row,
            )
            .optional()?;
        Ok(tag)
    }

    fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        Ok(get_by_name_in(&self.connection(), name)?)
    }

    fn get_or_create_tag(&self, name: &str) -> Result<Tag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("tag name cannot be empty"));
        }
        get_or_create_in(&self.connection(), name, now_unix())
    }

    fn update_tag_category(&self, id: TagId, category: TagCategory) -> Result<()> {
        let updated = self.connection().execute(
            "UPDATE tags SET category = ?2 WHERE id = ?1",
            params![id.get(), category.as_str()],
        )?;
        if updated == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn tag_bookmark_count(&self, id: TagId) -> Result<usize> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM bookmark_tags WHERE tag_id = ?1",
            [id.get()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn merge_tag_bookmarks(&self, from: TagId, into: TagId) -> Result<usize> {
        Ok(merge_bookmarks_in(&self.connection(), from, into)?)
    }

    fn record_synonym(
        &self,
        main: TagId,
        synonym: TagId,
        similarity_score: f64,
        auto_merged: bool,
    ) -> Result<()> {
        Ok(record_synonym_in(
            &self.connection(),
            main,
            synonym,
            similarity_score,
            auto_merged,
        )?)
    }

    fn delete_tag(&self, id: TagId) -> Result<()> {
        require_row(execute_on_tag(&self.connection(), DELETE_TAG, id), id)
    }

    fn increment_tag_usage(&self, id: TagId) -> Result<()> {
        require_row(execute_on_tag(&self.connection(), INCREMENT_USAGE, id), id)
    }

    fn top_tags(&self, limit: usize) -> Result<Vec<Tag>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TAG_COLUMNS} FROM tags
             WHERE usage_count > 0
             ORDER BY usage_count DESC, name ASC
             LIMIT ?1"
        ))?;
        let tags = stmt
            .query_map([i64::try_from(limit).unwrap_or(i64::MAX)], tag_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    fn count_tags_by_category(&self) -> Result<HashMap<TagCategory, usize>> {
        let mut counts: HashMap<TagCategory, usize> =
            TagCategory::ALL.iter().map(|c| (*c, 0)).collect();

        let conn = self.connection();
        let mut stmt = conn.prepare("SELECT category, COUNT(*) FROM tags GROUP BY category")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (category, count) = row?;
            if let Ok(category) = category.parse::<TagCategory>() {
                counts.insert(category, usize::try_from(count).unwrap_or(0));
            }
        }
        Ok(counts)
    }

    fn merge_tags(&self, from: TagId, into: TagId) -> Result<usize> {
        let mut conn = self.connection();
        let mut merge = || -> rusqlite::Result<usize> {
            let tx = conn.transaction()?;
            let moved = merge_bookmarks_in(&tx, from, into)?;
            record_synonym_in(&tx, into, from, 0.0, true)?;
            execute_on_tag(&tx, DELETE_TAG, from)?;
            execute_on_tag(&tx, INCREMENT_USAGE, into)?;
            tx.commit()?;
            Ok(moved)
        };
        merge().map_err(|cause| Error::MergeIncomplete {
            from_tag: from,
            into_tag: into,
            cause,
        })
    }
}
