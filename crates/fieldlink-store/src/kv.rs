//! # Key-Value Backends
//!
//! The narrow persistence collaborator interface and its two backends.
//!
//! ## Interface Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       KeyValue Contract                                 │
//! │                                                                         │
//! │  get / set / remove       single-key atomicity ONLY                     │
//! │  scan_prefix              read-only enumeration, no snapshot guarantee  │
//! │                                                                         │
//! │  NO cross-key transactions. Layers above must be correct with           │
//! │  record-per-key writes (and they are: see fieldlink-store docs).        │
//! │                                                                         │
//! │  BACKENDS                                                               │
//! │  SqliteKeyValue  - production; one table, WAL-friendly                  │
//! │  MemoryKeyValue  - tests and storage-degraded sessions                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::StoreResult;

// =============================================================================
// Trait
// =============================================================================

/// Narrow persisted-storage collaborator: single-key atomicity, no
/// cross-key transactions.
#[async_trait]
pub trait KeyValue: Send + Sync {
    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value atomically.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Enumerates `(key, value)` pairs whose key starts with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>>;
}

// =============================================================================
// SQLite Backend
// =============================================================================

/// SQLite-backed key-value store. One table, one row per key; every write
/// is a single-row statement, which is the whole atomicity story.
#[derive(Clone)]
pub struct SqliteKeyValue {
    pool: SqlitePool,
}

impl SqliteKeyValue {
    /// Opens (and if needed creates) the store at the given SQLite path.
    ///
    /// Pass `":memory:"` for an in-memory store.
    pub async fn open(path: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        // A single connection: the store has one logical writer (the sync
        // engine) and in-memory databases are per-connection anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!(path, "Opened key-value store");
        Ok(SqliteKeyValue { pool })
    }
}

#[async_trait]
impl KeyValue for SqliteKeyValue {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(key, "kv set");
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>> {
        // LIKE needs its wildcards escaped; a range scan over the ordered
        // primary key does the same job without escaping rules.
        let upper = format!("{}\u{10FFFF}", prefix);

        let rows = sqlx::query(
            "SELECT key, value FROM kv_store WHERE key >= ?1 AND key < ?2 ORDER BY key",
        )
        .bind(prefix)
        .bind(&upper)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>(0), r.get::<String, _>(1)))
            .collect())
    }
}

// =============================================================================
// In-Memory Backend
// =============================================================================

/// In-memory key-value store for tests and storage-degraded sessions.
#[derive(Default)]
pub struct MemoryKeyValue {
    inner: RwLock<BTreeMap<String, String>>,
}

impl MemoryKeyValue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValue for MemoryKeyValue {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.inner.write().await.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>> {
        let map = self.inner.read().await;
        Ok(map
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(kv: &dyn KeyValue) {
        assert_eq!(kv.get("a").await.unwrap(), None);

        kv.set("a", "1").await.unwrap();
        kv.set("a", "2").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some("2".to_string()));

        kv.set("case/c-1", "x").await.unwrap();
        kv.set("case/c-2", "y").await.unwrap();
        kv.set("mutation/m-1", "z").await.unwrap();

        let cases = kv.scan_prefix("case/").await.unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].0, "case/c-1");

        kv.remove("a").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), None);
        // Removing again is fine.
        kv.remove("a").await.unwrap();
    }

    #[tokio::test]
    async fn memory_backend_contract() {
        let kv = MemoryKeyValue::new();
        exercise(&kv).await;
    }

    #[tokio::test]
    async fn sqlite_backend_contract() {
        let kv = SqliteKeyValue::open(":memory:").await.unwrap();
        exercise(&kv).await;
    }
}
