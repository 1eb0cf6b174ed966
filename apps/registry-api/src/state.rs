//! Application state shared across all request handlers.

use crate::storage::FirmwareStore;
use axum::extract::FromRef;
use fwreg_auth::AccessGate;
use fwreg_db::DbPool;
use fwreg_webhooks::WebhookDispatcher;
use std::sync::Arc;

/// Application state shared across all handlers.
///
/// Cloned per request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub gate: Arc<AccessGate>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub store: FirmwareStore,
    /// Prefix for `downloadUrl`; empty disables the field.
    pub public_base_url: Arc<str>,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Absolute download URL for a version, or `None` without a public base URL.
    #[must_use]
    pub fn download_url(&self, firmware_type: &str, version: &str) -> Option<String> {
        let base = self.public_base_url.trim_end_matches('/');
        if base.is_empty() {
            return None;
        }
        Some(format!("{base}/api/firmware/{firmware_type}/{version}"))
    }
}

impl FromRef<AppState> for Arc<AccessGate> {
    fn from_ref(state: &AppState) -> Self {
        state.gate.clone()
    }
}
