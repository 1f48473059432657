use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::tags::get_or_create_in;
use super::{Database, now_unix, timestamp};
use crate::error::{Error, Result};
use crate::models::{Bookmark, BookmarkDraft, BookmarkFilter, BookmarkId};
use crate::store::BookmarkStore;

const BOOKMARK_COLUMNS: &str =
    "id, url, title, description, notes, is_favorite, unread, shared, created_at, updated_at";

fn bookmark_from_row(row: &Row<'_>) -> rusqlite::Result<Bookmark> {
    Ok(Bookmark {
        id: BookmarkId::new(row.get(0)?),
        url: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        notes: row.get(4)?,
        is_favorite: row.get(5)?,
        unread: row.get(6)?,
        shared: row.get(7)?,
        tag_names: Vec::new(),
        created_at: timestamp(row, 8)?,
        updated_at: timestamp(row, 9)?,
    })
}

fn tag_names_in(conn: &Connection, id: BookmarkId) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name FROM bookmark_tags bt
         JOIN tags t ON t.id = bt.tag_id
         WHERE bt.bookmark_id = ?1
         ORDER BY t.name",
    )?;
    let names = stmt
        .query_map([id.get()], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

fn load_in(conn: &Connection, id: BookmarkId) -> Result<Option<Bookmark>> {
    let bookmark = conn
        .query_row(
            &format!("SELECT {BOOKMARK_COLUMNS} FROM bookmarks WHERE id = ?1"),
            [id.get()],
            bookmark_from_row,
        )
        .optional()?;

    match bookmark {
        Some(mut bookmark) => {
            bookmark.tag_names = tag_names_in(conn, bookmark.id)?;
            Ok(Some(bookmark))
        }
        None => Ok(None),
    }
}

fn require_in(conn: &Connection, id: BookmarkId) -> Result<Bookmark> {
    load_in(conn, id)?.ok_or(Error::NotFound {
        entity: "bookmark",
        id: id.get(),
    })
}

/// Makes the bookmark's tag set equal to `names`.
///
/// Associations that already exist are left alone; each newly created
/// association bumps the tag's usage and last-used time.
fn replace_tags_in(conn: &Connection, id: BookmarkId, names: &[String], now: i64) -> Result<()> {
    let current = tag_names_in(conn, id)?;

    for stale in current.iter().filter(|name| !names.contains(name)) {
        conn.execute(
            "DELETE FROM bookmark_tags
             WHERE bookmark_id = ?1 AND tag_id = (SELECT id FROM tags WHERE name = ?2)",
            params![id.get(), stale],
        )?;
    }

    for name in names.iter().filter(|name| !current.contains(name)) {
        let tag = get_or_create_in(conn, name, now)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO bookmark_tags (bookmark_id, tag_id) VALUES (?1, ?2)",
            params![id.get(), tag.id.get()],
        )?;
        if inserted > 0 {
            conn.execute(
                "UPDATE tags SET usage_count = usage_count + 1, last_used = ?2 WHERE id = ?1",
                params![tag.id.get(), now],
            )?;
        }
    }

    Ok(())
}

fn id_for_url_in(conn: &Connection, url: &str) -> Result<Option<BookmarkId>> {
    let id = conn
        .query_row("SELECT id FROM bookmarks WHERE url = ?1", [url], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id.map(BookmarkId::new))
}

fn update_in(conn: &Connection, id: BookmarkId, draft: &BookmarkDraft, now: i64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE bookmarks
         SET url = ?2, title = ?3, description = ?4, notes = ?5,
             is_favorite = ?6, unread = ?7, shared = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            id.get(),
            draft.url,
            draft.title,
            draft.description,
            draft.notes,
            draft.is_favorite,
            draft.unread,
            draft.shared,
            now
        ],
    )?;
    if updated == 0 {
        return Err(Error::NotFound {
            entity: "bookmark",
            id: id.get(),
        });
    }
    replace_tags_in(conn, id, &draft.tag_names, now)
}

/// Builds the WHERE clause and its parameters for a filter.
fn filter_clause(filter: &BookmarkFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(query) = filter.query.as_deref().filter(|q| !q.is_empty()) {
        conditions.push("(title LIKE ? OR description LIKE ? OR url LIKE ?)");
        let pattern = format!("%{query}%");
        for _ in 0..3 {
            values.push(Value::Text(pattern.clone()));
        }
    }
    if let Some(unread) = filter.unread {
        conditions.push("unread = ?");
        values.push(Value::Integer(unread.into()));
    }
    if let Some(shared) = filter.shared {
        conditions.push("shared = ?");
        values.push(Value::Integer(shared.into()));
    }
    if let Some(tag) = &filter.tag {
        conditions.push(
            "id IN (SELECT bt.bookmark_id FROM bookmark_tags bt
                    JOIN tags t ON t.id = bt.tag_id WHERE t.name = ?)",
        );
        values.push(Value::Text(tag.clone()));
    }
    if let Some(folder) = filter.folder {
        conditions.push("id IN (SELECT bookmark_id FROM bookmark_folders WHERE folder_id = ?)");
        values.push(Value::Integer(folder.get()));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", conditions.join(" AND ")), values)
    }
}

impl BookmarkStore for Database {
    fn create_bookmark(&self, draft: &BookmarkDraft) -> Result<Bookmark> {
        let now = now_unix();
        self.with_transaction(|tx| {
            let id = match id_for_url_in(tx, &draft.url)? {
                Some(existing) => {
                    update_in(tx, existing, draft, now)?;
                    existing
                }
                None => {
                    tx.execute(
                        "INSERT INTO bookmarks
                         (url, title, description, notes, is_favorite, unread, shared, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                        params![
                            draft.url,
                            draft.title,
                            draft.description,
                            draft.notes,
                            draft.is_favorite,
                            draft.unread,
                            draft.shared,
                            now
                        ],
                    )?;
                    let id = BookmarkId::new(tx.last_insert_rowid());
                    replace_tags_in(tx, id, &draft.tag_names, now)?;
                    id
                }
            };
            require_in(tx, id)
        })
    }

    fn update_bookmark(&self, id: BookmarkId, draft: &BookmarkDraft) -> Result<Bookmark> {
        let now = now_unix();
        self.with_transaction(|tx| {
            if let Some(owner) = id_for_url_in(tx, &draft.url)?
                && owner != id
            {
                return Err(Error::validation(format!(
                    "URL already bookmarked: {}",
                    draft.url
                )));
            }
            update_in(tx, id, draft, now)?;
            require_in(tx, id)
        })
    }

    fn get_bookmark(&self, id: BookmarkId) -> Result<Option<Bookmark>> {
        load_in(&self.connection(), id)
    }

    fn get_bookmark_by_url(&self, url: &str) -> Result<Option<Bookmark>> {
        let conn = self.connection();
        match id_for_url_in(&conn, url)? {
            Some(id) => load_in(&conn, id),
            None => Ok(None),
        }
    }

    fn list_bookmarks(
        &self,
        limit: usize,
        offset: usize,
        filter: &BookmarkFilter,
    ) -> Result<Vec<Bookmark>> {
        let conn = self.connection();
        let (clause, mut values) = filter_clause(filter);
        values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        values.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

        let mut stmt = conn.prepare(&format!(
            "SELECT {BOOKMARK_COLUMNS} FROM bookmarks {clause}
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?"
        ))?;
        let mut bookmarks = stmt
            .query_map(params_from_iter(values), bookmark_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for bookmark in &mut bookmarks {
            bookmark.tag_names = tag_names_in(&conn, bookmark.id)?;
        }
        Ok(bookmarks)
    }

    fn delete_bookmark(&self, id: BookmarkId) -> Result<()> {
        let deleted = self
            .connection()
            .execute("DELETE FROM bookmarks WHERE id = ?1", [id.get()])?;
        if deleted == 0 {
            return Err(Error::NotFound {
                entity: "bookmark",
                id: id.get(),
            });
        }
        Ok(())
    }

    fn count_bookmarks(&self, filter: &BookmarkFilter) -> Result<usize> {
        let (clause, values) = filter_clause(filter);
        let count: i64 = self.connection().query_row(
            &format!("SELECT COUNT(*) FROM bookmarks {clause}"),
            params_from_iter(values),
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
