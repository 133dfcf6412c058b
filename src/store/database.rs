//! SQLite database wrapper with WAL mode and migration support.

use crate::store::error::StoreResult;
use crate::store::schema;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// The agenthub state database.
///
/// All data-access functions live in `impl Database` blocks spread across
/// the per-model modules in this directory.
pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL for concurrent readers; FK enforcement is per-connection.
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Run schema creation and migrations.
    fn migrate(&mut self) -> StoreResult<()> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating database schema v{}", schema::SCHEMA_VERSION);
            self.conn.execute_batch(schema::CREATE_SCHEMA)?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
        } else {
            if version < 2 {
                info!("Migrating database v1 -> v2");
                self.conn.execute_batch(schema::MIGRATE_V1_TO_V2)?;
            }
            if version < schema::SCHEMA_VERSION {
                self.conn.execute(
                    "UPDATE schema_version SET version = ?1",
                    params![schema::SCHEMA_VERSION],
                )?;
            }
        }

        Ok(())
    }

    /// Get the current schema version (0 if uninitialized).
    fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Row-mapping helpers shared by the per-model modules
// ---------------------------------------------------------------------------

/// Fresh ULID for a new row.
pub(crate) fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Parse an RFC 3339 timestamp column.
pub(crate) fn parse_ts(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse an optional RFC 3339 timestamp column.
pub(crate) fn parse_ts_opt(
    idx: usize,
    value: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(idx, v)).transpose()
}

/// Parse a closed-enum column via its `FromStr` impl.
pub(crate) fn parse_enum<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse a JSON column.
pub(crate) fn parse_json(idx: usize, value: String) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(&value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse an optional JSON column.
pub(crate) fn parse_json_opt(
    idx: usize,
    value: Option<String>,
) -> rusqlite::Result<Option<serde_json::Value>> {
    value.map(|v| parse_json(idx, v)).transpose()
}

/// Parse a JSON string-array column (`tags`).
pub(crate) fn parse_tags(idx: usize, value: String) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(&value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Encode a tag list for storage.
pub(crate) fn encode_tags(tags: &[String]) -> StoreResult<String> {
    Ok(serde_json::to_string(tags)?)
}

/// Encode an optional JSON value for storage.
pub(crate) fn encode_json_opt(value: Option<&serde_json::Value>) -> StoreResult<Option<String>> {
    value.map(|v| serde_json::to_string(v).map_err(Into::into)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_memory_creates_schema() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.schema_version(), schema::SCHEMA_VERSION);
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut db = Database::open_memory().unwrap();
        db.migrate().unwrap();
        assert_eq!(db.schema_version(), schema::SCHEMA_VERSION);
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = std::env::temp_dir().join(format!("agenthub-test-{}", new_id()));
        let path = dir.join("nested").join("state.db");
        let db = Database::open(&path).unwrap();
        assert_eq!(db.schema_version(), schema::SCHEMA_VERSION);
        drop(db);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
