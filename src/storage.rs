use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StorageError;
use crate::models::{Language, User};
use crate::utils;

const KEY_USER: &str = "user_data";
const KEY_FAVORITES: &str = "favorite_events";
const KEY_LANGUAGE: &str = "language";
const KEY_AUTH_TOKEN: &str = "auth_token";

/// Durable scoped storage: four independent string keys in one sqlite
/// table, each value an opaque serialized blob. Missing or malformed
/// entries read back as their documented default; write failures propagate
/// to the direct caller.
#[derive(Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> Self {
        Self::new(utils::database_path())
    }

    pub async fn get_user(&self) -> Result<Option<User>, StorageError> {
        let raw = self.get_raw(KEY_USER).await?;
        Ok(raw.and_then(|payload| decode_or_default(KEY_USER, &payload)))
    }

    pub async fn save_user(&self, user: &User) -> Result<(), StorageError> {
        let payload = serde_json::to_string(user)?;
        self.set_raw(KEY_USER, payload).await
    }

    pub async fn delete_user(&self) -> Result<(), StorageError> {
        self.delete_raw(KEY_USER).await
    }

    pub async fn get_favorites(&self) -> Result<Vec<String>, StorageError> {
        let raw = self.get_raw(KEY_FAVORITES).await?;
        Ok(raw
            .and_then(|payload| decode_or_default(KEY_FAVORITES, &payload))
            .unwrap_or_default())
    }

    pub async fn save_favorites(&self, ids: &[String]) -> Result<(), StorageError> {
        let payload = serde_json::to_string(ids)?;
        self.set_raw(KEY_FAVORITES, payload).await
    }

    pub async fn get_language(&self) -> Result<Language, StorageError> {
        let raw = self.get_raw(KEY_LANGUAGE).await?;
        Ok(raw
            .as_deref()
            .and_then(Language::from_code)
            .unwrap_or_default())
    }

    pub async fn save_language(&self, language: Language) -> Result<(), StorageError> {
        self.set_raw(KEY_LANGUAGE, language.code().to_string())
            .await
    }

    pub async fn get_auth_token(&self) -> Result<Option<String>, StorageError> {
        self.get_raw(KEY_AUTH_TOKEN).await
    }

    pub async fn save_auth_token(&self, token: &str) -> Result<(), StorageError> {
        self.set_raw(KEY_AUTH_TOKEN, token.to_string()).await
    }

    pub async fn delete_auth_token(&self) -> Result<(), StorageError> {
        self.delete_raw(KEY_AUTH_TOKEN).await
    }

    /// Removes all four keys in one transaction.
    pub async fn clear_all(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            for key in [KEY_USER, KEY_FAVORITES, KEY_LANGUAGE, KEY_AUTH_TOKEN] {
                tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_raw(&self, key: &'static str) -> Result<Option<String>, StorageError> {
        self.with_conn(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM kv WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set_raw(&self, key: &'static str, value: String) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO kv (key, value, updated_at_utc)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at_utc = excluded.updated_at_utc",
                params![key, value, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_raw(&self, key: &'static str) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    // sqlite work is blocking; each operation opens its own connection on
    // a blocking thread
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open(&path)?;
            f(&conn)
        })
        .await?
    }
}

fn open(path: &Path) -> Result<Connection, StorageError> {
    utils::ensure_parent(path);
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at_utc TEXT NOT NULL
        );",
    )?;
    Ok(conn)
}

fn decode_or_default<T: serde::de::DeserializeOwned>(key: &str, payload: &str) -> Option<T> {
    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("malformed {key} entry, falling back to default: {err}");
            None
        }
    }
}
