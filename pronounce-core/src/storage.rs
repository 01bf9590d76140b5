//! SQLite storage layer: a durable key-value slot for the ledger and settings

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;

/// Storage backend using SQLite
pub struct Storage {
    conn: Mutex<Connection>,
}

/// Key holding the persisted ledger record
pub const LEDGER_KEY: &str = "pronounce_stats";

pub const SETTING_GEMINI_API_KEY: &str = "gemini_api_key";
pub const SETTING_ANALYSIS_MODEL: &str = "analysis_model";
pub const SETTING_SPEECH_MODEL: &str = "speech_model";
pub const SETTING_FEEDBACK_LANGUAGE: &str = "feedback_language";
pub const SETTING_ANALYSIS_TIMEOUT_SECS: &str = "analysis_timeout_secs";
pub const SETTING_DEFAULT_VOICE: &str = "default_voice";

/// Default database location under the per-user data directory
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pronounce")
        .join("pronounce.db")
}

impl Storage {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        info!("Opened storage at {}", path.as_ref().display());
        Ok(storage)
    }

    /// Create an in-memory database (useful for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Save or overwrite a value
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Get a value
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(Into::into)
    }

    /// Remove a value, returning whether it existed
    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }
}
