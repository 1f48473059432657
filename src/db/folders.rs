use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{Database, now_unix, timestamp};
use crate::error::{Error, Result};
use crate::models::{Bookmark, BookmarkFilter, BookmarkId, Folder, FolderId};
use crate::store::{BookmarkStore, FolderStore};

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: FolderId::new(row.get(0)?),
        name: row.get(1)?,
        created_at: timestamp(row, 2)?,
    })
}

fn folder_in(conn: &Connection, id: FolderId) -> Result<Option<Folder>> {
    let folder = conn
        .query_row(
            "SELECT id, name, created_at FROM folders WHERE id = ?1",
            [id.get()],
            folder_from_row,
        )
        .optional()?;
    Ok(folder)
}

fn not_found(id: FolderId) -> Error {
    Error::NotFound {
        entity: "folder",
        id: id.get(),
    }
}

fn checked_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("folder name cannot be empty"));
    }
    Ok(name)
}

impl FolderStore for Database {
    fn create_folder(&self, name: &str) -> Result<Folder> {
        let name = checked_name(name)?;

        let conn = self.connection();
        conn.execute(
            "INSERT INTO folders (name, created_at) VALUES (?1, ?2)",
            params![name, now_unix()],
        )?;
        let id = FolderId::new(conn.last_insert_rowid());
        folder_in(&conn, id)?.ok_or_else(|| not_found(id))
    }

    fn get_folder(&self, id: FolderId) -> Result<Option<Folder>> {
        folder_in(&self.connection(), id)
    }

    fn rename_folder(&self, id: FolderId, name: &str) -> Result<Folder> {
        let name = checked_name(name)?;

        let conn = self.connection();
        let updated = conn.execute(
            "UPDATE folders SET name = ?2 WHERE id = ?1",
            params![id.get(), name],
        )?;
        if updated == 0 {
            return Err(not_found(id));
        }
        folder_in(&conn, id)?.ok_or_else(|| not_found(id))
    }

    fn delete_folder(&self, id: FolderId) -> Result<()> {
        let deleted = self
            .connection()
            .execute("DELETE FROM folders WHERE id = ?1", [id.get()])?;
        if deleted == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn list_folders(&self) -> Result<Vec<Folder>> {
        let conn = self.connection();
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM folders ORDER BY name, id")?;
        let folders = stmt
            .query_map([], folder_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    fn add_bookmark_to_folder(&self, bookmark: BookmarkId, folder: FolderId) -> Result<()> {
        let conn = self.connection();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM folders WHERE id = ?1)",
            [folder.get()],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(not_found(folder));
        }

        conn.execute(
            "INSERT OR IGNORE INTO bookmark_folders (bookmark_id, folder_id) VALUES (?1, ?2)",
            params![bookmark.get(), folder.get()],
        )?;
        Ok(())
    }

    fn remove_bookmark_from_folder(&self, bookmark: BookmarkId, folder: FolderId) -> Result<()> {
        self.connection().execute(
            "DELETE FROM bookmark_folders WHERE bookmark_id = ?1 AND folder_id = ?2",
            params![bookmark.get(), folder.get()],
        )?;
        Ok(())
    }

    fn folders_for_bookmark(&self, bookmark: BookmarkId) -> Result<Vec<Folder>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT f.id, f.name, f.created_at FROM folders f
             JOIN bookmark_folders bf ON bf.folder_id = f.id
             WHERE bf.bookmark_id = ?1
             ORDER BY f.name, f.id",
        )?;
        let folders = stmt
            .query_map([bookmark.get()], folder_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    fn bookmarks_in_folder(
        &self,
        folder: FolderId,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Bookmark>, usize)> {
        if self.get_folder(folder)?.is_none() {
            return Err(not_found(folder));
        }

        let filter = BookmarkFilter {
            folder: Some(folder),
            ..BookmarkFilter::all()
        };
        let total = self.count_bookmarks(&filter)?;
        let bookmarks = self.list_bookmarks(limit, offset, &filter)?;
        Ok((bookmarks, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookmarkDraft;
    use crate::store::BookmarkStore;

    #[test]
    fn add_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let bookmark = db
            .create_bookmark(&BookmarkDraft::new("https://example.com"))
            .unwrap();
        let folder = db.create_folder("Reading").unwrap();

        db.add_bookmark_to_folder(bookmark.id, folder.id).unwrap();
        db.add_bookmark_to_folder(bookmark.id, folder.id).unwrap();

        let folders = db.folders_for_bookmark(bookmark.id).unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, "Reading");
    }

    #[test]
    fn add_to_missing_folder_is_not_found() {
        let db = Database::in_memory().unwrap();
        let bookmark = db
            .create_bookmark(&BookmarkDraft::new("https://example.com"))
            .unwrap();

        let err = db
            .add_bookmark_to_folder(bookmark.id, FolderId::new(7))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "folder", .. }));
    }

    #[test]
    fn remove_and_cascade_on_bookmark_delete() {
        let db = Database::in_memory().unwrap();
        let a = db.create_bookmark(&BookmarkDraft::new("https://a.example")).unwrap();
        let b = db.create_bookmark(&BookmarkDraft::new("https://b.example")).unwrap();
        let folder = db.create_folder("Inbox").unwrap();
        db.add_bookmark_to_folder(a.id, folder.id).unwrap();
        db.add_bookmark_to_folder(b.id, folder.id).unwrap();

        db.remove_bookmark_from_folder(a.id, folder.id).unwrap();
        db.delete_bookmark(b.id).unwrap();

        let members: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM bookmark_folders", [], |row| row.get(0))
            .unwrap();
        assert_eq!(members, 0);
    }

    #[test]
    fn bookmarks_in_folder_pages_members() {
        let db = Database::in_memory().unwrap();
        let folder = db.create_folder("Reading").unwrap();
        let other = db.create_folder("Other").unwrap();
        for i in 0..3 {
            let bookmark = db
                .create_bookmark(&BookmarkDraft::new(format!("https://{i}.example")))
                .unwrap();
            db.add_bookmark_to_folder(bookmark.id, folder.id).unwrap();
        }
        let outside = db
            .create_bookmark(&BookmarkDraft::new("https://outside.example"))
            .unwrap();
        db.add_bookmark_to_folder(outside.id, other.id).unwrap();

        let (page, total) = db.bookmarks_in_folder(folder.id, 2, 0).unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        assert!(page.iter().all(|b| b.id != outside.id));

        let (rest, _) = db.bookmarks_in_folder(folder.id, 2, 2).unwrap();
        assert_eq!(rest.len(), 1);

        let err = db.bookmarks_in_folder(FolderId::new(99), 10, 0).unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "folder", .. }));
    }

    #[test]
    fn rename_and_delete_folder() {
        let db = Database::in_memory().unwrap();
        let bookmark = db
            .create_bookmark(&BookmarkDraft::new("https://example.com"))
            .unwrap();
        let folder = db.create_folder("Inbox").unwrap();
        db.add_bookmark_to_folder(bookmark.id, folder.id).unwrap();

        let renamed = db.rename_folder(folder.id, "  Later ").unwrap();
        assert_eq!(renamed.name, "Later");
        assert_eq!(db.get_folder(folder.id).unwrap(), Some(renamed));
        assert!(db.rename_folder(folder.id, "").is_err());

        db.delete_folder(folder.id).unwrap();

        assert!(db.get_folder(folder.id).unwrap().is_none());
        assert!(db.folders_for_bookmark(bookmark.id).unwrap().is_empty());
        assert!(db.get_bookmark(bookmark.id).unwrap().is_some());
        assert!(matches!(
            db.delete_folder(folder.id).unwrap_err(),
            Error::NotFound { .. }
        ));
        assert!(matches!(
            db.rename_folder(folder.id, "Gone").unwrap_err(),
            Error::NotFound { .. }
        ));
    }

    #[test]
    fn blank_folder_name_is_rejected() {
        let db = Database::in_memory().unwrap();
        assert!(db.create_folder("  ").is_err());
        assert!(db.list_folders().unwrap().is_empty());
    }
}
