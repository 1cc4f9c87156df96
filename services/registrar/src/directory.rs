//! Shared discovery directory.
//!
//! One row per task name, keyed by the normalized name. Writes are
//! replace-on-conflict so the last registrar to start owns the row.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlConnectOptions;
use sqlx::{ConnectOptions, Connection};
use tracing::{debug, info};

use crate::error::RegistrarError;

/// One directory row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Address peers should use, as a bare IP string.
    pub endpoint: String,
    /// Normalized task name (primary key).
    pub task_name: String,
}

impl DirectoryEntry {
    pub fn new(endpoint: impl Into<String>, task_name: &str) -> Self {
        Self {
            endpoint: endpoint.into(),
            task_name: normalize_task_name(task_name),
        }
    }
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn normalize_task_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Whether `name` can be interpolated into SQL as a table name.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Durable store for directory rows.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Upsert every entry. Either all rows are written or none are.
    async fn upsert(
        &self,
        entries: &[DirectoryEntry],
        registered_at: DateTime<Utc>,
    ) -> Result<(), RegistrarError>;
}

/// Directory table in a MySQL database.
///
/// Each upsert opens its own connection and closes it once the transaction
/// commits; nothing is held while the registrar idles.
#[derive(Debug, Clone)]
pub struct MySqlDirectory {
    options: MySqlConnectOptions,
    table: String,
    record_timestamp: bool,
}

impl MySqlDirectory {
    pub fn new(
        options: MySqlConnectOptions,
        table: impl Into<String>,
        record_timestamp: bool,
    ) -> Result<Self, RegistrarError> {
        let table = table.into();
        if !is_plain_identifier(&table) {
            return Err(RegistrarError::InvalidTable(table));
        }

        Ok(Self {
            options,
            table,
            record_timestamp,
        })
    }

    /// The upsert statement for one row.
    pub fn statement(&self) -> String {
        replace_statement(&self.table, self.record_timestamp)
    }
}

fn replace_statement(table: &str, record_timestamp: bool) -> String {
    if record_timestamp {
        format!("REPLACE INTO {table} VALUES (?, ?, ?)")
    } else {
        format!("REPLACE INTO {table} VALUES (?, ?)")
    }
}

#[async_trait]
impl Directory for MySqlDirectory {
    async fn upsert(
        &self,
        entries: &[DirectoryEntry],
        registered_at: DateTime<Utc>,
    ) -> Result<(), RegistrarError> {
        let sql = self.statement();

        let mut conn = self
            .options
            .connect()
            .await
            .map_err(RegistrarError::ConnectFailed)?;
        debug!(table = %self.table, "connected to directory");

        let mut tx = conn.begin().await.map_err(RegistrarError::WriteFailed)?;
        for entry in entries {
            let mut query = sqlx::query(&sql)
                .bind(&entry.endpoint)
                .bind(&entry.task_name);
            if self.record_timestamp {
                query = query.bind(registered_at);
            }
            query
                .execute(&mut *tx)
                .await
                .map_err(RegistrarError::WriteFailed)?;
        }
        tx.commit().await.map_err(RegistrarError::WriteFailed)?;

        conn.close().await.map_err(RegistrarError::WriteFailed)?;
        info!(table = %self.table, rows = entries.len(), "directory updated");

        Ok(())
    }
}

/// A stored row in [`MemoryDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub endpoint: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<String, StoredRow>,
    writes: usize,
    fail_writes: bool,
}

/// In-memory directory for tests. Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory whose every upsert fails without writing.
    pub fn failing() -> Self {
        let dir = Self::default();
        dir.lock().fail_writes = true;
        dir
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current rows keyed by task name.
    pub fn rows(&self) -> BTreeMap<String, StoredRow> {
        self.lock().rows.clone()
    }

    /// Endpoint currently registered for `task_name`.
    pub fn endpoint(&self, task_name: &str) -> Option<String> {
        self.lock().rows.get(task_name).map(|r| r.endpoint.clone())
    }

    /// Number of row writes that have been committed.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn upsert(
        &self,
        entries: &[DirectoryEntry],
        registered_at: DateTime<Utc>,
    ) -> Result<(), RegistrarError> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(RegistrarError::WriteFailed(sqlx::Error::PoolClosed));
        }

        for entry in entries {
            state.rows.insert(
                entry.task_name.clone(),
                StoredRow {
                    endpoint: entry.endpoint.clone(),
                    registered_at,
                },
            );
            state.writes += 1;
        }
        Ok(())
    }
}
