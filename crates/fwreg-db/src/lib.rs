//! SQLite persistence for the firmware registry.
//!
//! Two tables: firmware metadata keyed by `(type, version)` and webhook
//! subscriptions. Binaries themselves live on disk, not here.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use models::{Firmware, NewWebhook, Webhook};
pub use pool::DbPool;

/// Open an in-memory database with the schema applied. Test helper.
///
/// # Errors
///
/// Returns an error if SQLite or the migrations fail.
pub async fn test_pool() -> Result<DbPool, DbError> {
    let pool = DbPool::in_memory().await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
