//! Webhook subscription rows.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};

/// A subscriber endpoint and the events it wants.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Webhook {
    pub id: i64,
    pub url: String,
    #[sqlx(json)]
    pub events: Vec<String>,
    pub enabled: bool,
}

/// Fields for creating or replacing a webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWebhook {
    pub url: String,
    pub events: Vec<String>,
    pub enabled: bool,
}

impl Webhook {
    /// Whether this webhook should receive `event`.
    #[must_use]
    pub fn wants(&self, event: &str) -> bool {
        self.enabled && self.events.iter().any(|e| e == event)
    }

    /// Insert a webhook and return its id.
    pub async fn create(pool: &SqlitePool, data: &NewWebhook) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO webhooks (url, events, enabled) VALUES ($1, $2, $3)")
            .bind(&data.url)
            .bind(Json(&data.events))
            .bind(data.enabled)
            .execute(pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// All webhooks, oldest first.
    pub async fn list(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT id, url, events, enabled FROM webhooks ORDER BY id")
            .fetch_all(pool)
            .await
    }

    /// Fetch one webhook.
    pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT id, url, events, enabled FROM webhooks WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Replace every field of webhook `id`. Returns whether it existed.
    pub async fn update(
        pool: &SqlitePool,
        id: i64,
        data: &NewWebhook,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE webhooks
            SET url = $1, events = $2, enabled = $3
            WHERE id = $4
            ",
        )
        .bind(&data.url)
        .bind(Json(&data.events))
        .bind(data.enabled)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete webhook `id`. Returns whether it existed.
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
