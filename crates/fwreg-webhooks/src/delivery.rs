//! Per-subscriber delivery with bounded retries.
//!
//! One worker run owns one (subscriber, event) pair. It POSTs the shared
//! body, retries on transport errors and non-2xx responses with a linear
//! backoff of `(attempt + 1) * base_delay`, and gives up after
//! `max_retries + 1` attempts. Nothing is persisted.

use crate::crypto::{sign_payload, SIGNATURE_HEADER};
use crate::error::WebhookError;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff unit.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default redirect hop limit.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Delivery tuning shared by every worker.
#[derive(Clone, PartialEq, Eq)]
pub struct DeliverySettings {
    /// Service-wide signing secret. `None` sends no signature header.
    pub secret: Option<String>,
    /// Timeout for each individual request.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff unit; attempt `n` waits `(n + 1) * base_delay` before retrying.
    pub base_delay: Duration,
    /// Redirect hops followed per attempt. 0 treats a 3xx as the final answer.
    pub max_redirects: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            secret: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl std::fmt::Debug for DeliverySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliverySettings")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_redirects", &self.max_redirects)
            .finish()
    }
}

/// Wait after failed attempt `attempt` (0-based).
#[must_use]
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    base.saturating_mul(attempt.saturating_add(1))
}

/// One unit of work: deliver `body` for `event` to one subscriber.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub webhook_id: i64,
    pub url: String,
    pub event: String,
    pub body: Bytes,
}

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    NetworkError,
    Non2xx,
}

/// Record of one attempt.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryAttempt {
    pub webhook_id: i64,
    pub url: String,
    pub event: String,
    /// 0-based attempt index.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub status: Option<u16>,
    #[serde(serialize_with = "serialize_millis")]
    pub latency: Duration,
    pub error: Option<String>,
}

/// How a worker run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Exhausted,
}

/// Terminal record of one worker run.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub webhook_id: i64,
    pub url: String,
    pub event: String,
    pub outcome: DeliveryOutcome,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Receives attempt and completion records.
pub trait DeliveryObserver: Send + Sync {
    fn on_attempt(&self, _attempt: &DeliveryAttempt) {}
    fn on_complete(&self, _report: &DeliveryReport) {}
}

/// Writes delivery records as `tracing` events on the `webhook_delivery` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DeliveryObserver for TracingObserver {
    fn on_attempt(&self, a: &DeliveryAttempt) {
        match a.outcome {
            AttemptOutcome::Success => tracing::debug!(
                target: "webhook_delivery",
                webhook_id = a.webhook_id,
                url = %a.url,
                event = %a.event,
                attempt = a.attempt + 1,
                status = a.status,
                latency_ms = u64::try_from(a.latency.as_millis()).unwrap_or(u64::MAX),
                "Webhook attempt succeeded"
            ),
            AttemptOutcome::NetworkError => tracing::warn!(
                target: "webhook_delivery",
                webhook_id = a.webhook_id,
                url = %a.url,
                event = %a.event,
                attempt = a.attempt + 1,
                error = a.error.as_deref().unwrap_or(""),
                "Webhook delivery failed with error"
            ),
            AttemptOutcome::Non2xx => tracing::warn!(
                target: "webhook_delivery",
                webhook_id = a.webhook_id,
                url = %a.url,
                event = %a.event,
                attempt = a.attempt + 1,
                status = a.status,
                "Webhook delivery failed with non-2xx status"
            ),
        }
    }

    fn on_complete(&self, r: &DeliveryReport) {
        match r.outcome {
            DeliveryOutcome::Delivered => tracing::info!(
                target: "webhook_delivery",
                webhook_id = r.webhook_id,
                url = %r.url,
                event = %r.event,
                attempts = r.attempts,
                "Webhook delivered successfully"
            ),
            DeliveryOutcome::Exhausted => tracing::error!(
                target: "webhook_delivery",
                webhook_id = r.webhook_id,
                url = %r.url,
                event = %r.event,
                attempts = r.attempts,
                "Webhook delivery failed after all retries"
            ),
        }
    }
}

/// Executes delivery jobs.
#[derive(Clone)]
pub struct DeliveryWorker {
    http_client: Client,
    settings: DeliverySettings,
    observer: Arc<dyn DeliveryObserver>,
}

impl DeliveryWorker {
    /// Build a worker with its own HTTP client.
    ///
    /// Redirects are followed up to `max_redirects` hops and the final
    /// response decides the outcome.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::HttpClient` if the HTTP client cannot be built.
    pub fn new(settings: DeliverySettings) -> Result<Self, WebhookError> {
        let redirect = match settings.max_redirects {
            0 => reqwest::redirect::Policy::none(),
            hops => reqwest::redirect::Policy::limited(hops),
        };
        let http_client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("fwreg-webhooks/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect)
            .build()
            .map_err(|e| WebhookError::HttpClient(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            settings,
            observer: Arc::new(TracingObserver),
        })
    }

    /// Replace the observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &DeliverySettings {
        &self.settings
    }

    fn headers(&self, body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(secret) = self.settings.secret.as_deref().filter(|s| !s.is_empty()) {
            // Hex is always a valid header value.
            if let Ok(value) = HeaderValue::from_str(&sign_payload(secret, body)) {
                headers.insert(SIGNATURE_HEADER, value);
            }
        }
        headers
    }

    /// Run `job` to completion: success or retries exhausted.
    pub async fn deliver(&self, job: &DeliveryJob) -> DeliveryReport {
        let headers = self.headers(&job.body);
        let max_attempts = self.settings.max_retries.saturating_add(1);

        tracing::debug!(
            target: "webhook_delivery",
            webhook_id = job.webhook_id,
            url = %job.url,
            event = %job.event,
            max_retries = self.settings.max_retries,
            "Starting webhook delivery"
        );

        for attempt in 0..max_attempts {
            let record = self.attempt(job, headers.clone(), attempt).await;
            let succeeded = record.outcome == AttemptOutcome::Success;
            self.observer.on_attempt(&record);

            if succeeded {
                return self.finish(job, DeliveryOutcome::Delivered, attempt + 1);
            }
            if attempt + 1 < max_attempts {
                tokio::time::sleep(backoff_delay(attempt, self.settings.base_delay)).await;
            }
        }

        self.finish(job, DeliveryOutcome::Exhausted, max_attempts)
    }

    async fn attempt(&self, job: &DeliveryJob, headers: HeaderMap, attempt: u32) -> DeliveryAttempt {
        let started = Instant::now();
        let result = self
            .http_client
            .post(&job.url)
            .headers(headers)
            .body(job.body.clone())
            .send()
            .await;
        let latency = started.elapsed();

        let (outcome, status, error) = match result {
            Ok(response) if response.status().is_success() => {
                (AttemptOutcome::Success, Some(response.status().as_u16()), None)
            }
            Ok(response) => (AttemptOutcome::Non2xx, Some(response.status().as_u16()), None),
            Err(e) => {
                let message = if e.is_timeout() {
                    format!("Request timeout ({}ms)", self.settings.timeout.as_millis())
                } else if e.is_connect() {
                    format!("Connection failed: {e}")
                } else {
                    format!("Request error: {e}")
                };
                (AttemptOutcome::NetworkError, None, Some(message))
            }
        };

        DeliveryAttempt {
            webhook_id: job.webhook_id,
            url: job.url.clone(),
            event: job.event.clone(),
            attempt,
            outcome,
            status,
            latency,
            error,
        }
    }

    fn finish(&self, job: &DeliveryJob, outcome: DeliveryOutcome, attempts: u32) -> DeliveryReport {
        let report = DeliveryReport {
            webhook_id: job.webhook_id,
            url: job.url.clone(),
            event: job.event.clone(),
            outcome,
            attempts,
        };
        self.observer.on_complete(&report);
        report
    }
}

impl std::fmt::Debug for DeliveryWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryWorker")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_linear_in_attempt_index() {
        let base = DEFAULT_BASE_DELAY;
        assert_eq!(backoff_delay(0, base), Duration::from_millis(500));
        assert_eq!(backoff_delay(1, base), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2, base), Duration::from_millis(1500));
        assert_eq!(backoff_delay(u32::MAX, base), base.saturating_mul(u32::MAX));
    }

    #[test]
    fn test_defaults() {
        let settings = DeliverySettings::default();
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.max_redirects, 10);
        assert!(settings.secret.is_none());
    }

    #[test]
    fn test_secret_redacted_in_debug() {
        let settings = DeliverySettings {
            secret: Some("hunter2".to_string()),
            ..DeliverySettings::default()
        };
        assert!(!format!("{settings:?}").contains("hunter2"));
    }

    #[test]
    fn test_signature_header_only_with_secret() {
        let unsigned = DeliveryWorker::new(DeliverySettings::default()).unwrap();
        assert!(unsigned.headers(b"{}").get(SIGNATURE_HEADER).is_none());

        let empty = DeliveryWorker::new(DeliverySettings {
            secret: Some(String::new()),
            ..DeliverySettings::default()
        })
        .unwrap();
        assert!(empty.headers(b"{}").get(SIGNATURE_HEADER).is_none());

        let signed = DeliveryWorker::new(DeliverySettings {
            secret: Some("k".to_string()),
            ..DeliverySettings::default()
        })
        .unwrap();
        let headers = signed.headers(b"{}");
        assert_eq!(
            headers.get(SIGNATURE_HEADER).unwrap().to_str().unwrap(),
            sign_payload("k", b"{}")
        );
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }
}
