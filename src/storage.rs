use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite, sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous}};

use crate::error::StorageError;

/// Key/value slot store scoped to one local profile.
#[async_trait]
pub trait DurableStorage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

#[derive(Clone)]
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

impl SqliteStorage {
    pub async fn initialize(database_url: Option<String>) -> anyhow::Result<Self> {
        let url = match database_url {
            Some(u) => u,
            None => resolve_default_db_url()?,
        };
        let options = url.parse::<SqliteConnectOptions>()?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
        let pool = Pool::<Sqlite>::connect_with(options).await?;
        sqlx::query("PRAGMA busy_timeout = 5000;").execute(&pool).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &Pool<Sqlite> { &self.pool }
}

fn resolve_default_db_url() -> anyhow::Result<String> {
    let base = std::env::var("XDG_DATA_HOME").ok().map(PathBuf::from).unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".local").join("share")
    });
    let dir = base.join("routine_assist");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("selection.db");
    Ok(format!("sqlite://{}", path.to_string_lossy()))
}

#[async_trait]
impl DurableStorage for SqliteStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Read(e.to_string()))?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Write(e.to_string()))?;
        Ok(())
    }
}

/// Process-local storage. `reject_writes` simulates an exhausted quota and
/// `reject_reads` an unavailable store.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<String, String>>,
    reject_reads: AtomicBool,
    reject_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    pub fn with_value(key: &str, value: &str) -> Self {
        let s = Self::default();
        s.put(key, value);
        s
    }

    pub fn put(&self, key: &str, value: &str) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.insert(key.to_string(), value.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.slots.lock().ok().and_then(|s| s.get(key).cloned())
    }

    pub fn set_reject_reads(&self, reject: bool) {
        self.reject_reads.store(reject, Ordering::SeqCst);
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl DurableStorage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.reject_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Read("storage unavailable".into()));
        }
        let slots = self.slots.lock().map_err(|e| StorageError::Read(e.to_string()))?;
        Ok(slots.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Write("quota exceeded".into()));
        }
        let mut slots = self.slots.lock().map_err(|e| StorageError::Write(e.to_string()))?;
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl<T: DurableStorage + ?Sized> DurableStorage for std::sync::Arc<T> {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).read(key).await
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).write(key, value).await
    }
}
