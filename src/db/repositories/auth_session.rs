//! Login token repository
//!
//! Database operations for `auth_sessions`.

use super::{parse_sqlite_time, sqlite_time};
use crate::config::DatabaseDriver;
use crate::db::{mysql_pool, sqlite_pool, DynDatabasePool};
use crate::models::AuthSession;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

/// Login token repository trait
#[async_trait]
pub trait AuthSessionRepository: Send + Sync {
    /// Store a newly issued token
    async fn create(&self, session: &AuthSession) -> Result<AuthSession>;

    /// Get a token by its value
    async fn get_by_id(&self, id: &str) -> Result<Option<AuthSession>>;

    /// Delete a token
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete expired tokens, returning how many were removed
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based login token repository implementation
pub struct SqlxAuthSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxAuthSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AuthSessionRepository> {
        Arc::new(Self::new(pool))
    }
}

const INSERT_SQL: &str =
    "INSERT INTO auth_sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
const SELECT_SQL: &str =
    "SELECT id, user_id, expires_at, created_at FROM auth_sessions WHERE id = ?";

#[async_trait]
impl AuthSessionRepository for SqlxAuthSessionRepository {
    async fn create(&self, session: &AuthSession) -> Result<AuthSession> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(INSERT_SQL)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(sqlite_time(&session.expires_at))
                    .bind(sqlite_time(&session.created_at))
                    .execute(sqlite_pool(&self.pool)?)
                    .await
                    .context("Failed to create auth session")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(INSERT_SQL)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(mysql_pool(&self.pool)?)
                    .await
                    .context("Failed to create auth session")?;
            }
        }
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<AuthSession>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(SELECT_SQL)
                    .bind(id)
                    .fetch_optional(sqlite_pool(&self.pool)?)
                    .await
                    .context("Failed to get auth session")?;
                row.map(|row| {
                    let expires_at: String = row.get("expires_at");
                    let created_at: String = row.get("created_at");
                    Ok(AuthSession {
                        id: row.get("id"),
                        user_id: row.get("user_id"),
                        expires_at: parse_sqlite_time(&expires_at)?,
                        created_at: parse_sqlite_time(&created_at)?,
                    })
                })
                .transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(SELECT_SQL)
                    .bind(id)
                    .fetch_optional(mysql_pool(&self.pool)?)
                    .await
                    .context("Failed to get auth session")?;
                Ok(row.map(|row| AuthSession {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    expires_at: row.get("expires_at"),
                    created_at: row.get("created_at"),
                }))
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let sql = "DELETE FROM auth_sessions WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(sqlite_pool(&self.pool)?)
                    .await
                    .context("Failed to delete auth session")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(mysql_pool(&self.pool)?)
                    .await
                    .context("Failed to delete auth session")?;
            }
        }
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let sql = "DELETE FROM auth_sessions WHERE expires_at < ?";
        let removed = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(sqlite_time(&now))
                .execute(sqlite_pool(&self.pool)?)
                .await
                .context("Failed to delete expired auth sessions")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(now)
                .execute(mysql_pool(&self.pool)?)
                .await
                .context("Failed to delete expired auth sessions")?
                .rows_affected(),
        };
        Ok(removed)
    }
}
