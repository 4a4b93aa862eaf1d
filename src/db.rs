use crate::engine::{OverrideKind, Source};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::info;

/// Shared handle to the gravity database.
///
/// All writes that touch more than one row run in a single transaction, so a
/// failure part-way through leaves the previous state in place.
pub struct DbClient {
    db_path: String,
    conn: Mutex<Connection>,
}

impl DbClient {
    pub fn new(db_path: String) -> Result<Self> {
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            db_path,
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            db_path: ":memory:".to_string(),
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the schema if needed. Returns `true` when the database was
    /// empty before this call.
    pub fn initialize(&self) -> Result<bool> {
        let conn = self.conn();

        let existed: bool = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sources'",
            [],
            |row| row.get::<_, i64>(0),
        )? > 0;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uri TEXT NOT NULL UNIQUE,
                last_modified INTEGER,
                etag TEXT
            );
            CREATE TABLE IF NOT EXISTS source_domains (
                uri TEXT NOT NULL REFERENCES sources(uri) ON DELETE CASCADE,
                domain TEXT NOT NULL,
                UNIQUE(uri, domain)
            );
            CREATE TABLE IF NOT EXISTS overrides (
                domain TEXT NOT NULL,
                kind TEXT NOT NULL,
                PRIMARY KEY(domain, kind)
            );
            CREATE TABLE IF NOT EXISTS compiled_domains (
                domain TEXT PRIMARY KEY
            );
            CREATE INDEX IF NOT EXISTS idx_source_domains_uri ON source_domains(uri);",
        )?;

        if !existed {
            info!("SQLite database initialized at {}", self.db_path);
        }
        Ok(!existed)
    }

    // --- sources ---

    pub fn insert_source(&self, uri: &str) -> Result<bool> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO sources (uri, last_modified, etag) VALUES (?1, NULL, NULL)",
            params![uri],
        )?;
        Ok(inserted == 1)
    }

    pub fn delete_source(&self, uri: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM source_domains WHERE uri = ?1", params![uri])?;
        let deleted = tx.execute("DELETE FROM sources WHERE uri = ?1", params![uri])?;
        tx.commit()?;
        Ok(deleted == 1)
    }

    /// All sources in registration order.
    pub fn load_sources(&self) -> Result<Vec<Source>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare_cached("SELECT uri, last_modified, etag FROM sources ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let last_modified: Option<i64> = row.get(1)?;
            Ok(Source {
                uri: row.get(0)?,
                last_modified: last_modified.and_then(|s| DateTime::from_timestamp(s, 0)),
                etag: row.get(2)?,
            })
        })?;
        rows.collect()
    }

    pub fn load_source_domains(&self, uri: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached("SELECT domain FROM source_domains WHERE uri = ?1")?;
        let rows = stmt.query_map(params![uri], |row| row.get(0))?;
        rows.collect()
    }

    /// Swaps the stored domains and freshness metadata of `uri` in one
    /// transaction. Returns `false` (and writes nothing) if `uri` is not
    /// registered.
    pub fn replace_source_domains(
        &self,
        uri: &str,
        domains: &[String],
        last_modified: Option<DateTime<Utc>>,
        etag: Option<&str>,
    ) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE sources SET last_modified = ?1, etag = ?2 WHERE uri = ?3",
            params![last_modified.map(|t| t.timestamp()), etag, uri],
        )?;
        if updated == 0 {
            return Ok(false);
        }

        tx.execute("DELETE FROM source_domains WHERE uri = ?1", params![uri])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO source_domains (uri, domain) VALUES (?1, ?2)",
            )?;
            for domain in domains {
                stmt.execute(params![uri, domain])?;
            }
        }
        tx.commit()?;
        Ok(true)
    }

    // --- overrides ---

    pub fn insert_override(&self, domain: &str, kind: OverrideKind) -> Result<bool> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO overrides (domain, kind) VALUES (?1, ?2)",
            params![domain, kind.as_str()],
        )?;
        Ok(inserted == 1)
    }

    pub fn delete_override(&self, domain: &str, kind: OverrideKind) -> Result<bool> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM overrides WHERE domain = ?1 AND kind = ?2",
            params![domain, kind.as_str()],
        )?;
        Ok(deleted == 1)
    }

    pub fn has_override(&self, domain: &str, kind: OverrideKind) -> Result<bool> {
        let conn = self.conn();
        let found = conn
            .prepare_cached("SELECT 1 FROM overrides WHERE domain = ?1 AND kind = ?2")?
            .query_row(params![domain, kind.as_str()], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn load_overrides(&self, kind: OverrideKind) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare_cached("SELECT domain FROM overrides WHERE kind = ?1 ORDER BY rowid")?;
        let rows = stmt.query_map(params![kind.as_str()], |row| row.get(0))?;
        rows.collect()
    }

    // --- compiled snapshot ---

    pub fn store_compiled<'a>(&self, domains: impl IntoIterator<Item = &'a String>) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM compiled_domains", [])?;
        {
            let mut stmt =
                tx.prepare_cached("INSERT OR IGNORE INTO compiled_domains (domain) VALUES (?1)")?;
            for domain in domains {
                stmt.execute(params![domain])?;
            }
        }
        tx.commit()
    }

    pub fn load_compiled(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached("SELECT domain FROM compiled_domains ORDER BY domain")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }
}
