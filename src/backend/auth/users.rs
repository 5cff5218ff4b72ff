/**
 * User Directory
 *
 * The chat core does not own user accounts; it only needs to know whether a
 * user ID exists and how to display it. `UserDirectory` is that lookup, with
 * an in-memory implementation for development and tests and a PostgreSQL
 * implementation backed by the `users` table.
 */

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backend::error::{ChatError, ChatResult};

/// Identity facts the chat core consumes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> ChatResult<Option<UserIdentity>>;

    /// Add a user; usernames are unique
    async fn register_user(&self, username: &str, display_name: &str)
        -> ChatResult<UserIdentity>;

    /// Make sure a user issued by an outside identity provider exists under
    /// its own id. Returns the stored record, which wins over `user` when
    /// the id is already known.
    async fn provision_user(&self, user: &UserIdentity) -> ChatResult<UserIdentity>;

    async fn user_exists(&self, user_id: Uuid) -> ChatResult<bool> {
        Ok(self.find_user(user_id).await?.is_some())
    }
}

fn validate_username(username: &str) -> ChatResult<String> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ChatError::bad_request("username cannot be empty"));
    }
    Ok(username.to_string())
}

fn display_name_or(display_name: &str, username: &str) -> String {
    match display_name.trim() {
        "" => username.to_string(),
        name => name.to_string(),
    }
}

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<Uuid, UserIdentity>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_user(&self, user_id: Uuid) -> ChatResult<Option<UserIdentity>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn register_user(
        &self,
        username: &str,
        display_name: &str,
    ) -> ChatResult<UserIdentity> {
        let username = validate_username(username)?;
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == username) {
            return Err(ChatError::bad_request(format!(
                "username '{}' is already taken",
                username
            )));
        }

        let user = UserIdentity {
            id: Uuid::new_v4(),
            display_name: display_name.trim().to_string(),
            username,
        };
        users.insert(user.id, user.clone());
        tracing::debug!("[Auth] Registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    async fn provision_user(&self, user: &UserIdentity) -> ChatResult<UserIdentity> {
        let username = validate_username(&user.username)?;
        let mut users = self.users.write().await;
        if let Some(existing) = users.get(&user.id) {
            return Ok(existing.clone());
        }
        if users.values().any(|u| u.username == username) {
            return Err(ChatError::bad_request(format!(
                "username '{}' is already taken",
                username
            )));
        }

        let user = UserIdentity {
            id: user.id,
            display_name: display_name_or(&user.display_name, &username),
            username,
        };
        users.insert(user.id, user.clone());
        tracing::info!("[Auth] Provisioned user {} ({})", user.username, user.id);
        Ok(user)
    }
}

pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_user(&self, user_id: Uuid) -> ChatResult<Option<UserIdentity>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, display_name
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| UserIdentity {
            id: row.get("id"),
            username: row.get("username"),
            display_name: row.get("display_name"),
        }))
    }

    async fn register_user(
        &self,
        username: &str,
        display_name: &str,
    ) -> ChatResult<UserIdentity> {
        let username = validate_username(username)?;
        let user = UserIdentity {
            id: Uuid::new_v4(),
            display_name: display_name.trim().to_string(),
            username,
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO users (id, username, display_name, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (username) DO NOTHING
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(ChatError::bad_request(format!(
                "username '{}' is already taken",
                user.username
            )));
        }
        Ok(user)
    }

    async fn provision_user(&self, user: &UserIdentity) -> ChatResult<UserIdentity> {
        let username = validate_username(&user.username)?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO users (id, username, display_name, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user.id)
        .bind(&username)
        .bind(display_name_or(&user.display_name, &username))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        if inserted.rows_affected() == 1 {
            tracing::info!("[Auth] Provisioned user {} ({})", username, user.id);
        }

        // either the id was already known, or the username belongs to someone else
        self.find_user(user.id).await?.ok_or_else(|| {
            ChatError::bad_request(format!("username '{}' is already taken", username))
        })
    }
}
