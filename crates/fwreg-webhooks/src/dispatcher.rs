//! Event fan-out.
//!
//! `dispatch` lists subscriptions, serializes one envelope, and launches one
//! delivery per eligible subscriber. It returns as soon as the deliveries
//! are launched; their outcomes are only observed through the worker's
//! [`DeliveryObserver`](crate::delivery::DeliveryObserver).

use crate::delivery::{DeliveryJob, DeliveryWorker};
use crate::models::EventEnvelope;
use crate::source::WebhookSource;
use bytes::Bytes;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

/// Largest worker count a bounded pool will spawn.
pub const MAX_WORKERS: usize = 1024;

/// Largest queue a bounded pool will allocate.
pub const MAX_QUEUE: usize = 1 << 20;

/// How deliveries are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanOut {
    /// One task per delivery.
    #[default]
    Unbounded,
    /// A fixed pool of `workers` tasks fed by a queue of `queue` jobs.
    /// Jobs that do not fit are dropped.
    Bounded { workers: usize, queue: usize },
}

/// Why a dispatch launched nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    ListFailed,
    SerializeFailed,
    NoSubscribers,
}

impl AbandonReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AbandonReason::ListFailed => "list_failed",
            AbandonReason::SerializeFailed => "serialize_failed",
            AbandonReason::NoSubscribers => "no_subscribers",
        }
    }
}

/// What `dispatch` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Deliveries were handed off. `dropped` counts jobs a full queue refused.
    Launched { deliveries: usize, dropped: usize },
    Abandoned(AbandonReason),
}

enum Lane {
    Unbounded,
    Bounded(Mutex<Option<mpsc::Sender<DeliveryJob>>>),
}

/// Fans domain events out to webhook subscribers.
pub struct WebhookDispatcher {
    source: Arc<dyn WebhookSource>,
    worker: Arc<DeliveryWorker>,
    tracker: TaskTracker,
    lane: Lane,
}

impl WebhookDispatcher {
    /// Dispatcher with one task per delivery.
    #[must_use]
    pub fn new(source: Arc<dyn WebhookSource>, worker: DeliveryWorker) -> Self {
        Self {
            source,
            worker: Arc::new(worker),
            tracker: TaskTracker::new(),
            lane: Lane::Unbounded,
        }
    }

    /// Dispatcher with the given fan-out mode.
    ///
    /// Bounded mode spawns its pool immediately, so this must run inside a
    /// Tokio runtime.
    #[must_use]
    pub fn with_fan_out(
        source: Arc<dyn WebhookSource>,
        worker: DeliveryWorker,
        fan_out: FanOut,
    ) -> Self {
        let mut dispatcher = Self::new(source, worker);
        if let FanOut::Bounded { workers, queue } = fan_out {
            let (tx, rx) = mpsc::channel(queue.clamp(1, MAX_QUEUE));
            let rx = Arc::new(tokio::sync::Mutex::new(rx));
            for _ in 0..workers.clamp(1, MAX_WORKERS) {
                let rx = rx.clone();
                let worker = dispatcher.worker.clone();
                dispatcher.tracker.spawn(pool_loop(worker, rx));
            }
            dispatcher.lane = Lane::Bounded(Mutex::new(Some(tx)));
        }
        dispatcher
    }

    /// Notify every enabled subscriber of `event` with `payload` as `data`.
    pub async fn dispatch<T>(&self, event: &str, payload: &T) -> DispatchOutcome
    where
        T: Serialize + ?Sized,
    {
        let webhooks = match self.source.list_webhooks().await {
            Ok(hooks) => hooks,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    event = %event,
                    error = %e,
                    "Failed to list webhooks for event dispatch"
                );
                return DispatchOutcome::Abandoned(AbandonReason::ListFailed);
            }
        };

        let body = match EventEnvelope::new(event, payload).to_body() {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    event = %event,
                    error = %e,
                    "Failed to serialize webhook payload"
                );
                return DispatchOutcome::Abandoned(AbandonReason::SerializeFailed);
            }
        };

        let jobs: Vec<DeliveryJob> = webhooks
            .into_iter()
            .filter(|hook| hook.wants(event))
            .map(|hook| DeliveryJob {
                webhook_id: hook.id,
                url: hook.url,
                event: event.to_string(),
                body: body.clone(),
            })
            .collect();

        if jobs.is_empty() {
            tracing::debug!(target: "webhook_delivery", event = %event, "No webhooks configured for event");
            return DispatchOutcome::Abandoned(AbandonReason::NoSubscribers);
        }

        let deliveries = jobs.len();
        let dropped = self.launch(jobs);

        tracing::info!(
            target: "webhook_delivery",
            event = %event,
            webhook_count = deliveries - dropped,
            dropped,
            "Dispatching webhook event"
        );

        DispatchOutcome::Launched {
            deliveries: deliveries - dropped,
            dropped,
        }
    }

    fn launch(&self, jobs: Vec<DeliveryJob>) -> usize {
        match &self.lane {
            Lane::Unbounded => {
                for job in jobs {
                    let worker = self.worker.clone();
                    self.tracker.spawn(async move {
                        worker.deliver(&job).await;
                    });
                }
                0
            }
            Lane::Bounded(sender) => {
                let Some(tx) = sender.lock().ok().and_then(|guard| guard.as_ref().cloned()) else {
                    tracing::warn!(target: "webhook_delivery", "Dispatcher is draining, dropping deliveries");
                    return jobs.len();
                };
                let mut dropped = 0;
                for job in jobs {
                    if let Err(e) = tx.try_send(job) {
                        let job = match e {
                            mpsc::error::TrySendError::Full(job)
                            | mpsc::error::TrySendError::Closed(job) => job,
                        };
                        tracing::warn!(
                            target: "webhook_delivery",
                            webhook_id = job.webhook_id,
                            url = %job.url,
                            event = %job.event,
                            "Delivery queue full, dropping delivery"
                        );
                        dropped += 1;
                    }
                }
                dropped
            }
        }
    }

    /// Deliveries (or pool workers) still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting queued work and wait up to `grace` for in-flight
    /// deliveries. Returns `true` if everything finished in time; anything
    /// still running afterwards is abandoned.
    pub async fn drain(&self, grace: Duration) -> bool {
        if let Lane::Bounded(sender) = &self.lane {
            if let Ok(mut guard) = sender.lock() {
                guard.take();
            }
        }
        self.tracker.close();

        let pending = self.tracker.len();
        let finished = tokio::time::timeout(grace, self.tracker.wait()).await.is_ok();
        if finished {
            tracing::info!(target: "webhook_delivery", pending, "Webhook deliveries drained");
        } else {
            tracing::warn!(
                target: "webhook_delivery",
                remaining = self.tracker.len(),
                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                "Abandoning in-flight webhook deliveries"
            );
        }
        self.tracker.reopen();
        finished
    }
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field("worker", &self.worker)
            .field("in_flight", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<DeliveryJob>>>;

async fn pool_loop(worker: Arc<DeliveryWorker>, rx: SharedReceiver) {
    loop {
        let job = { rx.lock().await.recv().await };
        match job {
            Some(job) => {
                worker.deliver(&job).await;
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DeliverySettings;
    use crate::error::WebhookError;
    use crate::source::StaticSource;
    use async_trait::async_trait;
    use fwreg_db::Webhook;

    struct BrokenSource;

    #[async_trait]
    impl WebhookSource for BrokenSource {
        async fn list_webhooks(&self) -> Result<Vec<Webhook>, WebhookError> {
            Err(WebhookError::Source("unavailable".to_string()))
        }
    }

    fn worker() -> DeliveryWorker {
        DeliveryWorker::new(DeliverySettings::default()).unwrap()
    }

    fn hook(id: i64, enabled: bool, events: &[&str]) -> Webhook {
        Webhook {
            id,
            url: format!("http://127.0.0.1:9/{id}"),
            events: events.iter().map(|e| (*e).to_string()).collect(),
            enabled,
        }
    }

    #[tokio::test]
    async fn test_list_failure_abandons() {
        let dispatcher = WebhookDispatcher::new(Arc::new(BrokenSource), worker());
        let outcome = dispatcher.dispatch("firmware.uploaded", &"x").await;
        assert_eq!(outcome, DispatchOutcome::Abandoned(AbandonReason::ListFailed));
    }

    #[tokio::test]
    async fn test_serialize_failure_abandons() {
        use std::collections::HashMap;
        let source = StaticSource::new(vec![hook(1, true, &["firmware.uploaded"])]);
        let dispatcher = WebhookDispatcher::new(Arc::new(source), worker());
        let payload: HashMap<(i32, i32), i32> = HashMap::from([((1, 1), 1)]);

        let outcome = dispatcher.dispatch("firmware.uploaded", &payload).await;
        assert_eq!(outcome, DispatchOutcome::Abandoned(AbandonReason::SerializeFailed));
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_ineligible_hooks_are_not_counted() {
        let source = StaticSource::new(vec![
            hook(1, false, &["firmware.uploaded"]),
            hook(2, true, &["firmware.deleted"]),
        ]);
        let dispatcher = WebhookDispatcher::new(Arc::new(source), worker());
        let outcome = dispatcher.dispatch("firmware.uploaded", &"x").await;
        assert_eq!(outcome, DispatchOutcome::Abandoned(AbandonReason::NoSubscribers));
    }

    #[tokio::test]
    async fn test_bounded_queue_drops_overflow() {
        let source = StaticSource::new((1..=5).map(|id| hook(id, true, &["e"])).collect());
        // No workers can start before the queue is filled: the test runtime is
        // single-threaded and dispatch does not yield between sends.
        let dispatcher = WebhookDispatcher::with_fan_out(
            Arc::new(source),
            worker(),
            FanOut::Bounded { workers: 1, queue: 2 },
        );

        let outcome = dispatcher.dispatch("e", &"x").await;
        assert_eq!(
            outcome,
            DispatchOutcome::Launched {
                deliveries: 2,
                dropped: 3
            }
        );
    }

    #[tokio::test]
    async fn test_oversized_pool_is_clamped() {
        let source = StaticSource::new(vec![hook(1, true, &["e"])]);
        let dispatcher = WebhookDispatcher::with_fan_out(
            Arc::new(source),
            worker(),
            FanOut::Bounded {
                workers: usize::MAX,
                queue: usize::MAX,
            },
        );
        assert_eq!(dispatcher.in_flight(), MAX_WORKERS);
    }

    #[test]
    fn test_abandon_reason_names() {
        assert_eq!(AbandonReason::NoSubscribers.as_str(), "no_subscribers");
        assert_eq!(AbandonReason::ListFailed.as_str(), "list_failed");
    }
}
