//! Webhook notifications for the firmware registry.
//!
//! Domain events are fanned out to every enabled subscriber of the event.
//! Delivery is fire-and-forget: each subscriber gets an independent task
//! that signs the body, POSTs it, and retries with linear backoff. Nothing
//! is persisted and no outcome flows back to the code that emitted the
//! event.
//!
//! # Example
//!
//! ```rust,ignore
//! use fwreg_webhooks::{DeliverySettings, DeliveryWorker, WebhookDispatcher, FIRMWARE_UPLOADED};
//!
//! let worker = DeliveryWorker::new(DeliverySettings::default())?;
//! let dispatcher = WebhookDispatcher::new(Arc::new(db_pool), worker);
//! dispatcher.dispatch(FIRMWARE_UPLOADED, &firmware_dto).await;
//! ```

pub mod crypto;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod source;

pub use crypto::{sign_payload, verify_signature, SIGNATURE_HEADER};
pub use delivery::{
    backoff_delay, AttemptOutcome, DeliveryAttempt, DeliveryJob, DeliveryObserver,
    DeliveryOutcome, DeliveryReport, DeliverySettings, DeliveryWorker, TracingObserver,
};
pub use dispatcher::{
    AbandonReason, DispatchOutcome, FanOut, WebhookDispatcher, MAX_QUEUE, MAX_WORKERS,
};
pub use error::WebhookError;
pub use models::{EventEnvelope, FIRMWARE_DELETED, FIRMWARE_UPLOADED};
pub use source::{StaticSource, WebhookSource};
