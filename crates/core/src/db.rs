//! SQLite-backed page and session store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, Row, params};
use time::OffsetDateTime;

use crate::error::{Result, SatchelError};
use crate::page::PageInfo;

/// Page/session store over a single SQLite file.
///
/// The connection sits behind a mutex: this is a single-user store and no
/// operation holds it across more than one statement.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `path`, creating tables as needed.
    pub fn open(path: &Path) -> Result<Database> {
        Self::init(Connection::open(path)?)
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Database> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Database> {
        for q in [
            "CREATE TABLE IF NOT EXISTS pages (
                id TEXT PRIMARY KEY NOT NULL,
                original_url TEXT NOT NULL,
                title TEXT NOT NULL,
                time_added INTEGER NOT NULL,
                token TEXT NOT NULL,
                archived INTEGER NOT NULL DEFAULT 0)",
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT NOT NULL,
                time_added INTEGER,
                ip_address TEXT)",
        ] {
            conn.execute(q, [])?;
        }
        Ok(Database { conn: Mutex::new(conn) })
    }

    /// Insert or replace a page row. Re-adding a page resets its archived
    /// state.
    pub fn add_page(&self, pi: &PageInfo) -> Result<()> {
        self.lock().execute(
            "INSERT OR REPLACE INTO pages (id, original_url, title, time_added, token)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![pi.id, pi.original_url, pi.title, pi.time_added, pi.token],
        )?;
        Ok(())
    }

    /// Look up one page by id.
    pub fn page(&self, id: &str) -> Result<PageInfo> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT id, original_url, title, time_added, token FROM pages WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], row_to_page)?;
        match rows.next() {
            Some(row) => Ok(row?),
            None => Err(SatchelError::PageNotFound(id.to_string())),
        }
    }

    /// List pages by archived state, newest first.
    pub fn pages(&self, archived: bool, limit: usize) -> Result<Vec<PageInfo>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, original_url, title, time_added, token FROM pages
             WHERE archived = ?1 ORDER BY time_added DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![archived, limit as i64], row_to_page)?;
        let mut pages = Vec::new();
        for row in rows {
            pages.push(row?);
        }
        Ok(pages)
    }

    /// Flip a page's archived flag.
    pub fn toggle_archived(&self, id: &str) -> Result<()> {
        let changed = self
            .lock()
            .execute("UPDATE pages SET archived = (archived != 1) WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(SatchelError::PageNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Record an authenticated session.
    pub fn add_session(&self, id: &str, ip: &str) -> Result<()> {
        self.lock().execute(
            "INSERT OR REPLACE INTO sessions (id, time_added, ip_address) VALUES (?1, ?2, ?3)",
            params![id, OffsetDateTime::now_utc().unix_timestamp(), ip],
        )?;
        Ok(())
    }

    /// Check a session cookie value.
    pub fn valid_session(&self, id: &str) -> Result<bool> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT 1 FROM sessions WHERE id = ?1")?;
        Ok(stmt.exists(params![id])?)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn row_to_page(row: &Row<'_>) -> rusqlite::Result<PageInfo> {
    Ok(PageInfo {
        id: row.get(0)?,
        original_url: row.get(1)?,
        title: row.get(2)?,
        time_added: row.get(3)?,
        token: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: &str, time_added: i64) -> PageInfo {
        PageInfo {
            id: id.to_string(),
            original_url: format!("http://example.com/{id}"),
            title: format!("Page {id}"),
            time_added,
            token: format!("token-{id}"),
        }
    }

    #[test]
    fn test_add_and_get_page() {
        let db = Database::open_in_memory().unwrap();
        let pi = page("abc123", 1000);
        db.add_page(&pi).unwrap();
        assert_eq!(db.page("abc123").unwrap(), pi);
    }

    #[test]
    fn test_missing_page() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.page("nope"), Err(SatchelError::PageNotFound(_))));
    }

    #[test]
    fn test_pages_ordered_newest_first_with_limit() {
        let db = Database::open_in_memory().unwrap();
        for (id, added) in [("a", 1), ("b", 3), ("c", 2)] {
            db.add_page(&page(id, added)).unwrap();
        }

        let pages = db.pages(false, 50).unwrap();
        let ids: Vec<_> = pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);

        let pages = db.pages(false, 2).unwrap();
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn test_toggle_archived_moves_between_lists() {
        let db = Database::open_in_memory().unwrap();
        db.add_page(&page("a", 1)).unwrap();

        db.toggle_archived("a").unwrap();
        assert!(db.pages(false, 50).unwrap().is_empty());
        assert_eq!(db.pages(true, 50).unwrap().len(), 1);

        db.toggle_archived("a").unwrap();
        assert_eq!(db.pages(false, 50).unwrap().len(), 1);
    }

    #[test]
    fn test_toggle_archived_missing_page() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.toggle_archived("nope"), Err(SatchelError::PageNotFound(_))));
    }

    #[test]
    fn test_sessions() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.valid_session("s1").unwrap());
        db.add_session("s1", "127.0.0.1").unwrap();
        assert!(db.valid_session("s1").unwrap());
        assert!(!db.valid_session("s2").unwrap());
    }
}
