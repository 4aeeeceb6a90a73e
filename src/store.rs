use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, Row, SqlitePool};
use std::{path::Path, str::FromStr};

/// Namespace for authentication state (token, user profile).
pub const NS_AUTH: &str = "auth";
/// Namespace for app settings.
pub const NS_SETTINGS: &str = "settings";

pub const KEY_AUTH_TOKEN: &str = "auth_token";
pub const KEY_USER_PROFILE: &str = "user_profile";

/// Durable key/value preferences, namespaced per concern.
///
/// Only authentication and settings live here. Conversation messages are
/// deliberately excluded: the chat log dies with the process.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a new Store instance.
    /// This will automatically create the database file if it doesn't exist.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        Ok(Self { pool })
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at DATETIME NOT NULL,
                PRIMARY KEY (namespace, key)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize database schema")?;

        Ok(())
    }

    pub async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO preferences (namespace, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(namespace)
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to save preference")?;

        Ok(())
    }

    pub async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT value FROM preferences
            WHERE namespace = ? AND key = ?
            "#,
        )
        .bind(namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch preference")?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    pub async fn remove(&self, namespace: &str, key: &str) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM preferences
            WHERE namespace = ? AND key = ?
            "#,
        )
        .bind(namespace)
        .bind(key)
        .execute(&self.pool)
        .await
        .context("Failed to delete preference")?;

        Ok(())
    }

    pub async fn set_json<T: Serialize>(&self, namespace: &str, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value).context("Failed to serialize preference")?;
        self.set(namespace, key, &raw).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<T>> {
        match self.get(namespace, key).await? {
            Some(raw) => {
                let value = serde_json::from_str(&raw).context("Failed to parse preference")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("elisa.db")).await.unwrap();
        store.init().await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn set_overwrites_within_a_namespace() {
        let (store, _dir) = store().await;

        store.set(NS_AUTH, KEY_AUTH_TOKEN, "token-1").await.unwrap();
        store.set(NS_AUTH, KEY_AUTH_TOKEN, "token-2").await.unwrap();
        assert_eq!(
            store.get(NS_AUTH, KEY_AUTH_TOKEN).await.unwrap().as_deref(),
            Some("token-2")
        );

        // Same key in another namespace stays independent.
        store
            .set(NS_SETTINGS, KEY_AUTH_TOKEN, "not-a-token")
            .await
            .unwrap();
        assert_eq!(
            store.get(NS_AUTH, KEY_AUTH_TOKEN).await.unwrap().as_deref(),
            Some("token-2")
        );
    }

    #[tokio::test]
    async fn remove_clears_the_entry() {
        let (store, _dir) = store().await;
        store.set(NS_AUTH, KEY_AUTH_TOKEN, "token").await.unwrap();
        store.remove(NS_AUTH, KEY_AUTH_TOKEN).await.unwrap();
        assert_eq!(store.get(NS_AUTH, KEY_AUTH_TOKEN).await.unwrap(), None);
    }
}
