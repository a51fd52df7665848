//! SQLite-backed token store for OAuth connections and audit events.
//!
//! Tables:
//! - `oauth_tokens`: latest tokens per (provider, user_id, org_id)
//! - `kv_entries`: transient entries when the SQLite transient backend is used
//! - `auth_events`: audit log for connect / refresh / disconnect

use crate::error::AuthError;
use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

/// Token store backed by SQLite.
#[derive(Debug, Clone)]
pub struct TokenStore {
    pool: SqlitePool,
}

impl TokenStore {
    /// Open (creating if needed) the database at `db_url`.
    ///
    /// In-memory URLs get a single, never-recycled connection so every query
    /// sees the same database.
    pub async fn connect(db_url: &str) -> Result<Self, AuthError> {
        let options = SqliteConnectOptions::from_str(db_url)
            .map_err(|e| AuthError::Database(format!("Invalid DATABASE_URL: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let in_memory = db_url.contains(":memory:") || db_url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AuthError::Database(format!("Failed to open SQLite database: {e}")))?;

        Ok(Self { pool })
    }

    /// Run schema migrations.
    pub async fn migrate(&self) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS oauth_tokens (
                provider      TEXT NOT NULL,
                user_id       TEXT NOT NULL,
                org_id        TEXT NOT NULL,
                access_token  TEXT NOT NULL,
                refresh_token TEXT,
                expires_at    INTEGER,
                updated_at    INTEGER NOT NULL,
                PRIMARY KEY (provider, user_id, org_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                expires_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS auth_events (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                org_id     TEXT NOT NULL,
                user_id    TEXT NOT NULL DEFAULT '',
                event_type TEXT NOT NULL,
                provider   TEXT NOT NULL DEFAULT '',
                metadata   TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth_tokens_identity ON oauth_tokens(org_id, user_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_auth_events_org ON auth_events(org_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or update the token row for an identity.
    ///
    /// `access_token` and `expires_at` are always overwritten; a missing
    /// refresh token keeps the one already stored. An `expires_in` too large
    /// to represent is stored as no expiry.
    pub async fn upsert_tokens(&self, tokens: &TokenUpsert) -> Result<(), AuthError> {
        let now = Utc::now().timestamp();
        let expires_at = tokens.expires_in.and_then(|secs| now.checked_add(secs));

        sqlx::query(
            r#"
            INSERT INTO oauth_tokens
                (provider, user_id, org_id, access_token, refresh_token, expires_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (provider, user_id, org_id)
            DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, oauth_tokens.refresh_token),
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&tokens.provider)
        .bind(&tokens.user_id)
        .bind(&tokens.org_id)
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the token row for an identity.
    pub async fn get_token(
        &self,
        provider: &str,
        user_id: &str,
        org_id: &str,
    ) -> Result<Option<TokenRow>, AuthError> {
        let row = sqlx::query(
            r#"
            SELECT access_token, refresh_token, expires_at, updated_at
            FROM oauth_tokens
            WHERE provider = ?1 AND user_id = ?2 AND org_id = ?3
            "#,
        )
        .bind(provider)
        .bind(user_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        Ok(Some(TokenRow {
            provider: provider.to_string(),
            user_id: user_id.to_string(),
            org_id: org_id.to_string(),
            access_token: row.get(0),
            refresh_token: row.get(1),
            expires_at: row.get(2),
            updated_at: row.get(3),
        }))
    }

    /// List connected providers for an identity (metadata only, no tokens).
    pub async fn list_connections(
        &self,
        user_id: &str,
        org_id: &str,
    ) -> Result<Vec<ConnectionInfo>, AuthError> {
        let rows = sqlx::query(
            r#"
            SELECT provider, expires_at, refresh_token IS NOT NULL, updated_at
            FROM oauth_tokens
            WHERE user_id = ?1 AND org_id = ?2
            ORDER BY provider
            "#,
        )
        .bind(user_id)
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        let conns = rows
            .iter()
            .map(|row| ConnectionInfo {
                provider: row.get(0),
                expires_at: row.get(1),
                has_refresh_token: row.get(2),
                updated_at: row.get(3),
            })
            .collect();

        Ok(conns)
    }

    /// Delete the token row for an identity.
    pub async fn delete_token(
        &self,
        provider: &str,
        user_id: &str,
        org_id: &str,
    ) -> Result<(), AuthError> {
        let affected = sqlx::query(
            "DELETE FROM oauth_tokens WHERE provider = ?1 AND user_id = ?2 AND org_id = ?3",
        )
        .bind(provider)
        .bind(user_id)
        .bind(org_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(AuthError::NotFound("connection".into()));
        }

        Ok(())
    }

    /// Log an audit event.
    pub async fn log_event(
        &self,
        org_id: &str,
        user_id: &str,
        event_type: &str,
        provider: &str,
        metadata: serde_json::Value,
    ) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO auth_events (org_id, user_id, event_type, provider, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .bind(event_type)
        .bind(provider)
        .bind(metadata.to_string())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Count audit events of one type for an identity.
    pub async fn count_events(
        &self,
        org_id: &str,
        user_id: &str,
        event_type: &str,
    ) -> Result<i64, AuthError> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM auth_events WHERE org_id = ?1 AND user_id = ?2 AND event_type = ?3",
        )
        .bind(org_id)
        .bind(user_id)
        .bind(event_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get(0))
    }

    /// Expose the pool so the SQLite transient backend can share it.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TokenUpsert {
    pub provider: String,
    pub user_id: String,
    pub org_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds from now; `None` records no expiry.
    pub expires_in: Option<i64>,
}

/// Latest known tokens for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRow {
    pub provider: String,
    pub user_id: String,
    pub org_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry in epoch seconds.
    pub expires_at: Option<i64>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub provider: String,
    pub expires_at: Option<i64>,
    pub has_refresh_token: bool,
    pub updated_at: i64,
}
