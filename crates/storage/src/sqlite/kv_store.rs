use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use crate::keys::StorageKey;
use crate::repository::{KeyValueStore, StorageError};

use super::SqliteKvStore;

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &StorageKey) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM local_store WHERE key = ?1")
            .bind(key.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.map(|row| {
            row.try_get::<String, _>("value")
                .map_err(|err| StorageError::Serialization(err.to_string()))
        })
        .transpose()
    }

    async fn set(&self, key: &StorageKey, value: String) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO local_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(key.to_string())
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn remove(&self, key: &StorageKey) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM local_store WHERE key = ?1")
            .bind(key.to_string())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
