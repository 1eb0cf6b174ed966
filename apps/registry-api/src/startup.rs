//! Service assembly: storage, database, access gate and webhook dispatcher.

use crate::config::Config;
use crate::state::AppState;
use crate::storage::FirmwareStore;
use fwreg_auth::{AccessGate, RoleVerifier};
use fwreg_db::{run_migrations, DbError, DbPool};
use fwreg_webhooks::{DeliveryWorker, WebhookDispatcher, WebhookError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Failures that stop the service from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Webhooks(#[from] WebhookError),
}

async fn ensure_dir(path: &std::path::Path) -> Result<(), StartupError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| StartupError::CreateDir {
            path: path.display().to_string(),
            source,
        })
}

/// Build the shared state from configuration.
///
/// OIDC discovery failure is not fatal: the gate is built without the
/// bearer-token strategy and a warning is logged.
pub async fn build_state(config: &Config) -> Result<AppState, StartupError> {
    ensure_dir(&config.storage_dir).await?;
    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent).await?;
    }

    info!(db_path = %config.db_path.display(), "Opening database");
    let db = DbPool::open(&config.db_path).await?;
    run_migrations(&db).await?;

    let policy = config.access_policy();
    if !policy.allowlist.rejected().is_empty() {
        warn!(
            rejected = ?policy.allowlist.rejected(),
            "Some no-auth allowlist entries were invalid and are ignored"
        );
    }
    if !policy.allowlist.is_empty() {
        info!(entries = policy.allowlist.len(), "No-auth IP/subnet allowlist configured");
    }

    let verifier = match policy.oidc.as_ref() {
        Some(params) => match RoleVerifier::discover(params).await {
            Ok(verifier) => {
                info!(
                    issuer = %params.issuer_url,
                    client_id = %params.client_id,
                    admin_role = %params.admin_role,
                    device_role = %params.device_role,
                    "OIDC authentication enabled"
                );
                Some(verifier)
            }
            Err(e) => {
                warn!(
                    issuer = %params.issuer_url,
                    error = %e,
                    "OIDC enabled but failed to initialize, falling back to API key authentication only"
                );
                None
            }
        },
        None => None,
    };
    let gate = AccessGate::from_policy(&policy, verifier);
    info!(methods = ?gate.methods(), "Access gate ready");

    let worker = DeliveryWorker::new(config.delivery_settings())?;
    let dispatcher =
        WebhookDispatcher::with_fan_out(Arc::new(db.clone()), worker, config.fan_out());

    Ok(AppState {
        db,
        gate: Arc::new(gate),
        webhooks: Arc::new(dispatcher),
        store: FirmwareStore::new(config.storage_dir.clone()),
        public_base_url: Arc::from(config.public_base_url.as_str()),
        max_upload_bytes: config.max_upload_bytes(),
    })
}
