use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;

pub mod models;
use models::*;

/// Thread-safe SQLite connection (single connection with mutex).
///
/// Holds one row per `(league, data_type)`; every upsert replaces the
/// previous generation.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// In-memory database, used by tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Harvests ──────────────────────────────────────────────────────────────

    /// Insert or replace the current payload for `(league, data_type)`.
    pub fn upsert_harvest(
        &self,
        league: &str,
        data_type: &str,
        harvested_at: DateTime<Utc>,
        data_json: &str,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO harvests (league, data_type, harvested_at, data_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(league, data_type) DO UPDATE SET
                harvested_at=excluded.harvested_at,
                data_json=excluded.data_json",
            params![league, data_type, harvested_at, data_json],
        )?;
        Ok(())
    }

    /// Load the stored payload for `(league, data_type)`.
    pub fn get_harvest(
        &self,
        league: &str,
        data_type: &str,
    ) -> Result<Option<(DateTime<Utc>, String)>> {
        let row = self
            .conn()
            .query_row(
                "SELECT harvested_at, data_json FROM harvests
                 WHERE league=?1 AND data_type=?2",
                params![league, data_type],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    /// List every mirrored record, newest first.
    pub fn list_harvests(&self) -> Result<Vec<MirrorEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT league, data_type, harvested_at, LENGTH(data_json)
             FROM harvests ORDER BY harvested_at DESC",
        )?;
        let rows = stmt
            .query_map([], map_mirror_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn map_mirror_entry(row: &rusqlite::Row) -> rusqlite::Result<MirrorEntry> {
    Ok(MirrorEntry {
        league: row.get(0)?,
        data_type: row.get(1)?,
        harvested_at: row.get(2)?,
        payload_bytes: row.get(3)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS harvests (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    league       TEXT    NOT NULL,
    data_type    TEXT    NOT NULL,
    harvested_at TEXT    NOT NULL,
    data_json    TEXT    NOT NULL,
    UNIQUE(league, data_type)
);
"#;
