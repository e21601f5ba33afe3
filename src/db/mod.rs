//! SQLite persistence for the source registry, scrape error records and
//! the rule catalogue.
use rusqlite::{Connection, OpenFlags, Result};
use std::path::Path;
use tracing::info;

pub mod models;
pub mod rules;
pub mod sources;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    scraper_note TEXT,
    phase TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    last_scraped DATETIME,
    char_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_sources_queue ON sources(status, priority, id);
CREATE INDEX IF NOT EXISTS idx_sources_phase ON sources(phase);

CREATE TABLE IF NOT EXISTS scrape_errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT NOT NULL,
    url TEXT NOT NULL,
    message TEXT NOT NULL,
    occurred_at DATETIME NOT NULL,
    FOREIGN KEY (source_id) REFERENCES sources(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_scrape_errors_source ON scrape_errors(source_id);

CREATE TABLE IF NOT EXISTS rules (
    id TEXT PRIMARY KEY,
    body TEXT NOT NULL,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;

/// A wrapper around a SQLite connection initialized with the application schema.
pub struct Db {
    pub(crate) conn: Connection,
}

impl Db {
    /// Open a database connection at the given path and initialize the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Initializing database: {}", path.display());

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    /// Open an existing database without write access. Returns `None` when
    /// the file does not exist; nothing is created on disk.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Some(Self { conn }))
    }

    /// Open an in-memory database connection (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_init() {
        let db = Db::open_in_memory().expect("Failed to open in-memory DB");
        let tables: usize = db
            .conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('sources', 'scrape_errors', 'rules');",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[test]
    fn test_db_open_on_disk_is_reentrant() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("ziwei.db");
        drop(Db::open(&path).unwrap());
        assert!(Db::open(&path).is_ok());
    }

    #[test]
    fn test_read_only_open_creates_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("absent.db");
        assert!(Db::open_read_only(&path).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_read_only_open_rejects_writes() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("ziwei.db");
        drop(Db::open(&path).unwrap());

        let db = Db::open_read_only(&path).unwrap().unwrap();
        assert!(db.list_sources().unwrap().is_empty());
        assert!(db.conn.execute("DELETE FROM sources", []).is_err());
    }
}
