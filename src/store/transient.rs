//! Short-lived key/value storage for state tokens, PKCE verifiers and
//! credentials waiting to be picked up.
//!
//! Two backends share the [`KeyValueStore`] trait:
//! - [`MemoryStore`]: sharded in-process map, lazily expired plus a sweeper task
//! - [`SqliteKvStore`]: `kv_entries` table next to the token table, survives restarts

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::AuthError;

/// Keyed store with optional per-entry TTL.
///
/// Operations on different keys never interfere. Concurrent writers to the
/// same key resolve as last-writer-wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Insert or overwrite. `None` means the entry never expires.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AuthError>;

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError>;

    /// Remove the entry. Absent keys are a no-op.
    async fn delete(&self, key: &str) -> Result<(), AuthError>;

    /// Read and remove in one step. At most one caller observes the value.
    async fn take(&self, key: &str) -> Result<Option<String>, AuthError>;

    /// Remove the entry only if its live value equals `expected`.
    /// Returns whether an entry was removed.
    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, AuthError>;

    /// Drop every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64, AuthError>;
}

/// Run `purge_expired` on a fixed interval for the lifetime of the process.
pub fn spawn_sweeper(store: Arc<dyn KeyValueStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(n) => debug!("Purged {n} expired transient entries"),
                Err(e) => tracing::error!("Transient sweep failed: {e}"),
            }
        }
    })
}

// ── In-memory backend ───────────────────────────────────────────────────────

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |t| now < t)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AuthError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let now = Instant::now();
        let live = match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };

        if live.is_none() {
            // expired; the read guard is released above
            self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        }
        Ok(live)
    }

    async fn delete(&self, key: &str) -> Result<(), AuthError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, AuthError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(_, entry)| entry.value))
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, AuthError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove_if(key, |_, entry| entry.is_live(now) && entry.value == expected)
            .is_some())
    }

    async fn purge_expired(&self) -> Result<u64, AuthError> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}

// ── SQLite backend ──────────────────────────────────────────────────────────

/// Transient entries persisted in the `kv_entries` table.
/// `expires_at` is epoch milliseconds, NULL for entries without a TTL.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// The table is created by [`crate::store::TokenStore::migrate`].
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AuthError> {
        let expires_at = ttl.map(|ttl| now_millis() + ttl.as_millis() as i64);
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let row = sqlx::query(
            "SELECT value FROM kv_entries WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
        )
        .bind(key)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get(0)))
    }

    async fn delete(&self, key: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, AuthError> {
        let row = sqlx::query(
            r#"
            DELETE FROM kv_entries
            WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)
            RETURNING value
            "#,
        )
        .bind(key)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get(0)))
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, AuthError> {
        let affected = sqlx::query(
            r#"
            DELETE FROM kv_entries
            WHERE key = ?1 AND value = ?2 AND (expires_at IS NULL OR expires_at > ?3)
            "#,
        )
        .bind(key)
        .bind(expected)
        .bind(now_millis())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected > 0)
    }

    async fn purge_expired(&self) -> Result<u64, AuthError> {
        let affected =
            sqlx::query("DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1")
                .bind(now_millis())
                .execute(&self.pool)
                .await?
                .rows_affected();
        Ok(affected)
    }
}
