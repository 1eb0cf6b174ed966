//! Error types for webhook dispatch.
//!
//! Nothing here ever reaches the business operation that emitted an event;
//! these errors exist for construction and for logging.

use thiserror::Error;

/// Webhook system error variants.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Subscriber source unavailable: {0}")]
    Source(String),

    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            WebhookError::Source("disk full".into()).to_string(),
            "Subscriber source unavailable: disk full"
        );
        let db: WebhookError = sqlx::Error::PoolClosed.into();
        assert!(db.to_string().starts_with("Database error"));
    }
}
