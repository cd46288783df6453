//! Users and session tokens.
//!
//! Session tokens are opaque random strings handed to the client once.
//! Only their SHA-256 hash is stored, so a leaked database does not leak
//! usable tokens. [`SqliteIdentityStore`] implements `IdentityResolver`
//! from `stacks-core` for the WebSocket handshake and REST extractors.

use chrono::{Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use sqlx::Row;
use stacks_core::identity::IdentityResolver;
use stacks_types::error::{AuthError, RepositoryError};
use stacks_types::identity::{Identity, Role, UserId};

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// Prefix of every issued session token.
pub const TOKEN_PREFIX: &str = "stk_";

/// SQLite-backed user directory and session store.
pub struct SqliteIdentityStore {
    pool: DatabasePool,
}

impl SqliteIdentityStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Create a user and return its identity.
    pub async fn create_user(
        &self,
        display_name: &str,
        role: Role,
    ) -> Result<Identity, RepositoryError> {
        let result = sqlx::query("INSERT INTO users (display_name, role, created_at) VALUES (?, ?, ?)")
            .bind(display_name)
            .bind(role.to_string())
            .bind(format_datetime(&Utc::now()))
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        let user_id = result.last_insert_rowid() as UserId;
        tracing::info!(user_id, %role, "User created");
        Ok(Identity::new(user_id, role, display_name))
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<Option<Identity>, RepositoryError> {
        let row = sqlx::query("SELECT id, display_name, role FROM users WHERE id = ?")
            .bind(user_id as i64)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.map(|row| identity_from_row(&row)).transpose()
    }

    /// Issue a session token for `user_id`, valid for `ttl`.
    ///
    /// Returns the plaintext token. It is not recoverable afterwards.
    pub async fn issue_session(
        &self,
        user_id: UserId,
        ttl: Duration,
    ) -> Result<String, RepositoryError> {
        if self.get_user(user_id).await?.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let mut token_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut token_bytes);
        let token = format!(
            "{TOKEN_PREFIX}{}",
            token_bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
        );

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(hash_token(&token))
        .bind(user_id as i64)
        .bind(format_datetime(&now))
        .bind(format_datetime(&(now + ttl)))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        tracing::info!(user_id, ttl_hours = ttl.num_hours(), "Session issued");
        Ok(token)
    }

    /// Delete the session behind `token`. Returns `false` if it did not exist.
    pub async fn revoke_session(&self, token: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(hash_token(token))
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }
}

fn identity_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Identity, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(query_error)?;
    let display_name: String = row.try_get("display_name").map_err(query_error)?;
    let role: String = row.try_get("role").map_err(query_error)?;
    let role: Role = role.parse().map_err(|e: String| RepositoryError::Query(e))?;
    Ok(Identity::new(id as UserId, role, display_name))
}

/// Compute SHA-256 hash of a session token (lowercase hex).
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{:x}", digest)
}

impl IdentityResolver for SqliteIdentityStore {
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        if !token.starts_with(TOKEN_PREFIX) {
            return Err(AuthError::InvalidToken);
        }

        let row = sqlx::query(
            r#"SELECT u.id, u.display_name, u.role, s.expires_at
               FROM sessions s JOIN users u ON u.id = s.user_id
               WHERE s.token_hash = ?"#,
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| AuthError::Lookup(e.to_string()))?;

        let Some(row) = row else {
            return Err(AuthError::InvalidToken);
        };

        let expires_at: String = row
            .try_get("expires_at")
            .map_err(|e| AuthError::Lookup(e.to_string()))?;
        let expires_at = parse_datetime(&expires_at).map_err(|e| AuthError::Lookup(e.to_string()))?;
        if expires_at <= Utc::now() {
            return Err(AuthError::Expired);
        }

        identity_from_row(&row).map_err(|e| AuthError::Lookup(e.to_string()))
    }
}
