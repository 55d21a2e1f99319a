//! Run history: which titles were queued, which items were enriched.
//!
//! Backed by a small sqlite database so repeat runs (cron) never re-queue
//! a torrent or re-apply the same enrichment.

use anyhow::Result;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use crate::matching::Confidence;
use crate::normalize::{normalize_author, normalize_title};

#[derive(Debug, Clone)]
pub struct SnatchRecord {
    pub title: String,
    pub author: String,
    pub source: String,
    pub torrent_id: Option<String>,
    pub queued_at: String,
}

pub struct History {
    conn: Mutex<Connection>,
}

impl History {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join("history.db"))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS snatches (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                title_key TEXT NOT NULL,
                author_key TEXT NOT NULL,
                source TEXT NOT NULL,
                torrent_id TEXT,
                queued_at TEXT NOT NULL,
                UNIQUE(title_key, author_key)
            );
            CREATE TABLE IF NOT EXISTS enrichments (
                id INTEGER PRIMARY KEY,
                item_id TEXT NOT NULL,
                title TEXT NOT NULL,
                confidence TEXT NOT NULL,
                score REAL NOT NULL,
                applied INTEGER NOT NULL,
                run_at TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn record_snatch(
        &self,
        title: &str,
        author: &str,
        source: &str,
        torrent_id: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO snatches
                (title, author, title_key, author_key, source, torrent_id, queued_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                title,
                author,
                normalize_title(title),
                normalize_author(author),
                source,
                torrent_id,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Has this title/author pair already been queued in a previous run?
    pub fn is_snatched(&self, title: &str, author: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM snatches WHERE title_key = ?1 AND author_key = ?2",
            params![normalize_title(title), normalize_author(author)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_snatches(&self, limit: usize) -> Result<Vec<SnatchRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT title, author, source, torrent_id, queued_at
             FROM snatches ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(SnatchRecord {
                title: row.get(0)?,
                author: row.get(1)?,
                source: row.get(2)?,
                torrent_id: row.get(3)?,
                queued_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn record_enrichment(
        &self,
        item_id: &str,
        title: &str,
        confidence: Confidence,
        score: f64,
        applied: bool,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO enrichments (item_id, title, confidence, score, applied, run_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item_id,
                title,
                confidence.as_str(),
                score,
                applied as i64,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Item ids already enriched with an applied write; skipped on later runs.
    pub fn enriched_item_ids(&self) -> Result<std::collections::HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT DISTINCT item_id FROM enrichments WHERE applied = 1")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn counts(&self) -> Result<(i64, i64)> {
        let conn = self.conn.lock().unwrap();
        let snatches: i64 =
            conn.query_row("SELECT COUNT(*) FROM snatches", [], |row| row.get(0))?;
        let enrichments: i64 =
            conn.query_row("SELECT COUNT(*) FROM enrichments", [], |row| row.get(0))?;
        Ok((snatches, enrichments))
    }

    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("DELETE FROM snatches; DELETE FROM enrichments;")?;
        Ok(())
    }
}
