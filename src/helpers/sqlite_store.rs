use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::str::FromStr;

use crate::helpers::store::{Backend, StoreError};

/// Keeps every document as one row, for deployments that already run a
/// SQLite database next to the bot.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                name TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#
        ).execute(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn load(&self, doc: &str) -> Result<Option<Value>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT body FROM documents WHERE name = ?"
        )
            .bind(doc)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((body,)) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, doc: &str, body: &Value) -> Result<(), StoreError> {
        let body = serde_json::to_string(body)?;

        sqlx::query(
            r#"
            INSERT INTO documents (name, body, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(name) DO UPDATE SET
                body = excluded.body,
                updated_at = CURRENT_TIMESTAMP
            "#
        )
            .bind(doc)
            .bind(body)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn documents_upsert_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("desk.db").display());
        let backend = SqliteBackend::new(&url).await.unwrap();

        assert_eq!(backend.load("premiumKeys").await.unwrap(), None);
        backend.save("premiumKeys", &json!({ "A": 1 })).await.unwrap();
        backend.save("premiumKeys", &json!({ "A": 2 })).await.unwrap();
        assert_eq!(backend.load("premiumKeys").await.unwrap(), Some(json!({ "A": 2 })));
    }
}
