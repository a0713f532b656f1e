// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Database module for persistent storage
//!
//! The analytics engine only reads tracking data; writes exist for seeding
//! and for the key-value signals used by cross-context invalidation.

mod memory;

pub use memory::MemoryStorage;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::AnalyticsError;
use crate::invalidation::SignalStore;
use crate::tracking::{Goal, TrackingEntry};

/// Read access to tracking data
#[async_trait]
pub trait DataStorage: Send + Sync {
    async fn entries_for_student(&self, student_id: &str) -> crate::error::Result<Vec<TrackingEntry>>;

    async fn goals_for_student(&self, student_id: &str) -> crate::error::Result<Vec<Goal>>;

    /// Students with at least one entry
    async fn students(&self) -> crate::error::Result<Vec<String>>;
}

/// Database manager
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.path)?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        let db = Self::from_connection(conn)?;
        info!("Database opened at {:?}", config.path);
        Ok(db)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tracking_entries (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_entries_student ON tracking_entries(student_id, timestamp);

            CREATE TABLE IF NOT EXISTS goals (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_goals_student ON goals(student_id);

            -- Key-value settings, also carries invalidation signals
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        )?;

        Ok(())
    }

    /// Insert or replace a tracking entry
    pub fn store_entry(&self, entry: &TrackingEntry) -> Result<()> {
        let conn = self.conn.lock();
        let data = serde_json::to_string(entry)?;

        conn.execute(
            "INSERT OR REPLACE INTO tracking_entries (id, student_id, timestamp, data) VALUES (?1, ?2, ?3, ?4)",
            params![entry.id, entry.student_id, entry.timestamp.to_rfc3339(), data],
        )?;

        Ok(())
    }

    /// Store multiple entries in one transaction
    pub fn store_entries_batch(&self, entries: &[TrackingEntry]) -> Result<usize> {
        let conn = self.conn.lock();

        let tx = conn.unchecked_transaction()?;
        let mut count = 0;

        for entry in entries {
            let data = serde_json::to_string(entry)?;
            tx.execute(
                "INSERT OR REPLACE INTO tracking_entries (id, student_id, timestamp, data) VALUES (?1, ?2, ?3, ?4)",
                params![entry.id, entry.student_id, entry.timestamp.to_rfc3339(), data],
            )?;
            count += 1;
        }

        tx.commit()?;
        debug!("Stored {} tracking entries", count);
        Ok(count)
    }

    pub fn store_goal(&self, goal: &Goal) -> Result<()> {
        let conn = self.conn.lock();
        let data = serde_json::to_string(goal)?;

        conn.execute(
            "INSERT OR REPLACE INTO goals (id, student_id, data, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![goal.id, goal.student_id, data, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    /// Entries for a student, oldest first
    pub fn query_entries(&self, student_id: &str) -> Result<Vec<TrackingEntry>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT data FROM tracking_entries WHERE student_id = ?1 ORDER BY timestamp ASC")?;

        let rows = stmt.query_map(params![student_id], |row| row.get::<_, String>(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(serde_json::from_str(&row?)?);
        }

        Ok(results)
    }

    pub fn query_goals(&self, student_id: &str) -> Result<Vec<Goal>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT data FROM goals WHERE student_id = ?1 ORDER BY id ASC")?;

        let rows = stmt.query_map(params![student_id], |row| row.get::<_, String>(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(serde_json::from_str(&row?)?);
        }

        Ok(results)
    }

    pub fn query_students(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT student_id FROM tracking_entries ORDER BY student_id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Remove all data for a student. Returns the number of rows deleted.
    pub fn delete_student(&self, student_id: &str) -> Result<usize> {
        let conn = self.conn.lock();

        let entries = conn.execute("DELETE FROM tracking_entries WHERE student_id = ?1", params![student_id])?;
        let goals = conn.execute("DELETE FROM goals WHERE student_id = ?1", params![student_id])?;

        info!("Deleted {} entries and {} goals for student {}", entries, goals, student_id);
        Ok(entries + goals)
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn.lock();

        let entry_count: i64 = conn.query_row("SELECT COUNT(*) FROM tracking_entries", [], |row| row.get(0))?;
        let goal_count: i64 = conn.query_row("SELECT COUNT(*) FROM goals", [], |row| row.get(0))?;
        let student_count: i64 =
            conn.query_row("SELECT COUNT(DISTINCT student_id) FROM tracking_entries", [], |row| row.get(0))?;

        let size_bytes: i64 = conn
            .query_row(
                "SELECT page_count * page_size as size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(DatabaseStats {
            entry_count: entry_count as usize,
            goal_count: goal_count as usize,
            student_count: student_count as usize,
            size_bytes: size_bytes as u64,
        })
    }

    /// Store a setting
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    /// Get a setting
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();

        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;

        Ok(value)
    }
}

fn storage_error(e: anyhow::Error) -> AnalyticsError {
    AnalyticsError::Storage(e.to_string())
}

#[async_trait]
impl DataStorage for Database {
    async fn entries_for_student(&self, student_id: &str) -> crate::error::Result<Vec<TrackingEntry>> {
        self.query_entries(student_id).map_err(storage_error)
    }

    async fn goals_for_student(&self, student_id: &str) -> crate::error::Result<Vec<Goal>> {
        self.query_goals(student_id).map_err(storage_error)
    }

    async fn students(&self) -> crate::error::Result<Vec<String>> {
        self.query_students().map_err(storage_error)
    }
}

impl SignalStore for Database {
    fn write_signal(&self, key: &str, value: &str) -> crate::error::Result<()> {
        self.set_setting(key, value).map_err(storage_error)
    }

    fn read_signal(&self, key: &str) -> crate::error::Result<Option<String>> {
        self.get_setting(key).map_err(storage_error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    pub entry_count: usize,
    pub goal_count: usize,
    pub student_count: usize,
    pub size_bytes: u64,
}
