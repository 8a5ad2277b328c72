use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};

use crate::error::AppError;
use crate::store::KeyValueStore;

/// Schema files in order; a database at `user_version = n` has the first `n` applied.
const SCHEMA: &[&str] = &[include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../migrations/0001_init.sql"
))];

pub fn open(path: &Path) -> Result<Connection, AppError> {
    Connection::open(path).map_err(|e| {
        AppError::new("DB_OPEN_FAILED", "Failed to open SQLite database")
            .with_details(e.to_string())
    })
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    Connection::open_in_memory().map_err(|e| {
        AppError::new("DB_OPEN_FAILED", "Failed to open in-memory SQLite database")
            .with_details(e.to_string())
    })
}

pub fn schema_version(conn: &Connection) -> Result<usize, AppError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
        .map(|v| v.max(0) as usize)
        .map_err(|e| {
            AppError::new("DB_SCHEMA_FAILED", "Failed to read schema version")
                .with_details(e.to_string())
        })
}

/// Bring the `kv` schema up to date, tracking progress in `PRAGMA user_version`.
pub fn migrate(conn: &mut Connection) -> Result<(), AppError> {
    let current = schema_version(conn)?;
    if current > SCHEMA.len() {
        return Err(AppError::new(
            "DB_SCHEMA_TOO_NEW",
            "Database was written by a newer schema",
        )
        .with_details(format!("user_version={current}; known={}", SCHEMA.len())));
    }

    for (idx, sql) in SCHEMA.iter().enumerate().skip(current) {
        let version = idx + 1;
        let tx = conn.transaction().map_err(|e| {
            AppError::new("DB_TX_FAILED", "Failed to start schema transaction")
                .with_details(e.to_string())
        })?;
        tx.execute_batch(&format!("{sql}\nPRAGMA user_version = {version};"))
            .map_err(|e| {
                AppError::new("DB_MIGRATION_FAILED", format!("Schema step {version} failed"))
                    .with_details(e.to_string())
            })?;
        tx.commit().map_err(|e| {
            AppError::new("DB_TX_FAILED", "Failed to commit schema transaction")
                .with_details(e.to_string())
        })?;
    }

    Ok(())
}

/// Durable store backed by a single SQLite `kv` table.
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
}

impl SqliteKvStore {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let mut conn = open(path)?;
        migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let mut conn = open_in_memory()?;
        migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl KeyValueStore for SqliteKvStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
            row.get::<_, String>(0)
        })
        .optional()
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to read key")
                .with_details(format!("key={key}; err={e}"))
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            r#"
      INSERT INTO kv(key, value, updated_at)
      VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ','now'))
      ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
      "#,
            [key, value],
        )
        .map_err(|e| {
            AppError::new("DB_WRITE_FAILED", "Failed to write key")
                .with_details(format!("key={key}; err={e}"))
        })?;
        Ok(())
    }
}
