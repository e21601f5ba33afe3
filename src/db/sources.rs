use super::{Db, models::*};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result, Row, params};

const SOURCE_COLUMNS: &str =
    "id, name, url, priority, scraper_note, phase, status, last_scraped, char_count";

fn row_to_source(row: &Row<'_>) -> Result<Source> {
    let char_count: i64 = row.get(8)?;
    Ok(Source {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        priority: row.get(3)?,
        scraper_note: row.get(4)?,
        phase: row.get(5)?,
        status: row.get(6)?,
        last_scraped: row.get(7)?,
        char_count: u64::try_from(char_count).unwrap_or(0),
    })
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl Db {
    /// Insert or update registry entries. Metadata is always refreshed;
    /// lifecycle fields are only written for new rows or when the incoming
    /// record carries a non-pending status. Every entry is validated first;
    /// one bad entry rejects the whole batch.
    pub fn upsert_sources(&mut self, sources: &[Source]) -> Result<usize> {
        for s in sources {
            s.validate()
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        }
        let tx = self.conn.transaction()?;
        for s in sources {
            tx.execute(
                r#"
                INSERT INTO sources (id, name, url, priority, scraper_note, phase, status, last_scraped, char_count)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    url = excluded.url,
                    priority = excluded.priority,
                    scraper_note = excluded.scraper_note,
                    phase = excluded.phase
                "#,
                params![
                    s.id,
                    s.name,
                    s.url,
                    s.priority,
                    s.scraper_note,
                    s.phase,
                    s.status,
                    s.last_scraped,
                    to_i64(s.char_count),
                ],
            )?;
            if s.status != SourceStatus::Pending {
                tx.execute(
                    "UPDATE sources SET status = ?2, last_scraped = ?3, char_count = ?4 WHERE id = ?1",
                    params![s.id, s.status, s.last_scraped, to_i64(s.char_count)],
                )?;
            }
        }
        tx.commit()?;
        Ok(sources.len())
    }

    /// All sources in queue order.
    pub fn list_sources(&self) -> Result<Vec<Source>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources ORDER BY priority, id"
        ))?;
        let rows = stmt.query_map([], row_to_source)?;
        rows.collect()
    }

    pub fn get_source(&self, id: &str) -> Result<Option<Source>> {
        self.conn
            .query_row(
                &format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?"),
                params![id],
                row_to_source,
            )
            .optional()
    }

    /// The default ingestion queue: everything not yet scraped, optionally
    /// narrowed to one phase, ordered by priority then id.
    pub fn source_queue(&self, phase: Option<Phase>) -> Result<Vec<Source>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources
             WHERE status != 'scraped' AND (?1 IS NULL OR phase = ?1)
             ORDER BY priority, id"
        ))?;
        let rows = stmt.query_map(params![phase], row_to_source)?;
        rows.collect()
    }

    /// Per-row status transition. Returns false when the id is unknown.
    pub fn set_source_status(&mut self, id: &str, status: SourceStatus) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE sources SET status = ?2 WHERE id = ?1",
            params![id, status],
        )?;
        Ok(rows > 0)
    }

    pub fn mark_scraped(&mut self, id: &str, at: DateTime<Utc>, char_count: u64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE sources SET status = 'scraped', last_scraped = ?2, char_count = ?3 WHERE id = ?1",
            params![id, at, to_i64(char_count)],
        )?;
        Ok(rows > 0)
    }

    /// Record a failure and flip the source to `error` in one transaction.
    pub fn mark_error(&mut self, record: &ScrapeErrorRecord) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO scrape_errors (source_id, url, message, occurred_at) VALUES (?1, ?2, ?3, ?4)",
            params![record.source_id, record.url, record.message, record.occurred_at],
        )?;
        tx.execute(
            "UPDATE sources SET status = ?2 WHERE id = ?1",
            params![record.source_id, SourceStatus::Error],
        )?;
        tx.commit()
    }

    /// Error records, newest first, optionally for one source.
    pub fn scrape_errors(&self, source_id: Option<&str>) -> Result<Vec<ScrapeErrorRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, url, message, occurred_at FROM scrape_errors
             WHERE ?1 IS NULL OR source_id = ?1
             ORDER BY occurred_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![source_id], |row| {
            Ok(ScrapeErrorRecord {
                source_id: row.get(0)?,
                url: row.get(1)?,
                message: row.get(2)?,
                occurred_at: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    /// Aggregate progress, computed from the registry rows.
    pub fn progress(&self) -> Result<Progress> {
        self.conn.query_row(
            "SELECT COUNT(*), MAX(last_scraped) FROM sources WHERE status = 'scraped'",
            [],
            |row| {
                let count: i64 = row.get(0)?;
                Ok(Progress {
                    scraped_count: u64::try_from(count).unwrap_or(0),
                    last_scraped_at: row.get(1)?,
                })
            },
        )
    }

    pub fn export_registry(&self) -> Result<Registry> {
        Ok(Registry {
            sources: self.list_sources()?,
            progress: self.progress()?,
        })
    }
}
