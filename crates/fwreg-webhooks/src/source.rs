//! Where the dispatcher reads subscriptions from.

use crate::error::WebhookError;
use async_trait::async_trait;
use fwreg_db::{DbPool, Webhook};
use std::sync::Arc;

/// Lists the current webhook subscriptions.
///
/// Read once per dispatch with no caching, so admin changes apply to the
/// next event.
#[async_trait]
pub trait WebhookSource: Send + Sync {
    async fn list_webhooks(&self) -> Result<Vec<Webhook>, WebhookError>;
}

#[async_trait]
impl WebhookSource for DbPool {
    async fn list_webhooks(&self) -> Result<Vec<Webhook>, WebhookError> {
        Ok(Webhook::list(self.inner()).await?)
    }
}

#[async_trait]
impl<S: WebhookSource + ?Sized> WebhookSource for Arc<S> {
    async fn list_webhooks(&self) -> Result<Vec<Webhook>, WebhookError> {
        (**self).list_webhooks().await
    }
}

/// A fixed in-memory subscriber list.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    webhooks: Vec<Webhook>,
}

impl StaticSource {
    #[must_use]
    pub fn new(webhooks: Vec<Webhook>) -> Self {
        Self { webhooks }
    }
}

#[async_trait]
impl WebhookSource for StaticSource {
    async fn list_webhooks(&self) -> Result<Vec<Webhook>, WebhookError> {
        Ok(self.webhooks.clone())
    }
}
