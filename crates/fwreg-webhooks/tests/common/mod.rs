//! Common test utilities for fwreg-webhooks integration tests.
//!
//! Wiremock responders that capture or fail requests, plus fixtures for
//! subscribers and delivery settings tuned for fast retries.

#![allow(dead_code)]

use fwreg_db::Webhook;
use fwreg_webhooks::{
    DeliveryAttempt, DeliveryObserver, DeliveryReport, DeliverySettings, DeliveryWorker,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wiremock::{Request, Respond, ResponseTemplate};

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

pub const SECRET: &str = "whsec_registry_test_secret";

/// Short enough to keep retry tests quick, long enough to measure.
pub const FAST_BASE_DELAY: Duration = Duration::from_millis(50);

/// Settings with a fast backoff and the given retry budget.
pub fn fast_settings(max_retries: u32, secret: Option<&str>) -> DeliverySettings {
    DeliverySettings {
        secret: secret.map(str::to_string),
        timeout: Duration::from_secs(2),
        max_retries,
        base_delay: FAST_BASE_DELAY,
        ..DeliverySettings::default()
    }
}

pub fn fast_worker(max_retries: u32, secret: Option<&str>) -> DeliveryWorker {
    DeliveryWorker::new(fast_settings(max_retries, secret)).expect("worker")
}

pub fn subscriber(id: i64, url: String, events: &[&str], enabled: bool) -> Webhook {
    Webhook {
        id,
        url,
        events: events.iter().map(|e| (*e).to_string()).collect(),
        enabled,
    }
}

/// A URL on localhost that refuses connections.
pub fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}/hook")
}

// ---------------------------------------------------------------------------
// CapturedRequest - for inspecting webhook requests
// ---------------------------------------------------------------------------

/// A captured HTTP request with body, headers and arrival time.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub received_at: Instant,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// CaptureResponder - captures requests and returns a fixed status
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
}

impl CaptureResponder {
    /// Create a new capture responder that returns 200 OK.
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Create a capture responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: status,
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Time between consecutive requests.
    pub fn gaps(&self) -> Vec<Duration> {
        self.requests()
            .windows(2)
            .map(|w| w[1].received_at.duration_since(w[0].received_at))
            .collect()
    }
}

impl Default for CaptureResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
            received_at: Instant::now(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// FailingResponder - fails N times then succeeds
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FailingResponder {
    attempt_count: Arc<AtomicU32>,
    failures_before_success: u32,
    failure_code: u16,
}

impl FailingResponder {
    /// Create a responder that fails `n` times with 500, then returns 200.
    pub fn fail_times(n: u32) -> Self {
        Self {
            attempt_count: Arc::new(AtomicU32::new(0)),
            failures_before_success: n,
            failure_code: 500,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count.load(Ordering::SeqCst)
    }
}

impl Respond for FailingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.attempt_count.fetch_add(1, Ordering::SeqCst);
        if n < self.failures_before_success {
            ResponseTemplate::new(self.failure_code)
        } else {
            ResponseTemplate::new(200)
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingObserver - keeps every attempt and report
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingObserver {
    attempts: Mutex<Vec<DeliveryAttempt>>,
    reports: Mutex<Vec<DeliveryReport>>,
}

impl RecordingObserver {
    pub fn attempts(&self) -> Vec<DeliveryAttempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<DeliveryReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl DeliveryObserver for RecordingObserver {
    fn on_attempt(&self, attempt: &DeliveryAttempt) {
        self.attempts.lock().unwrap().push(attempt.clone());
    }

    fn on_complete(&self, report: &DeliveryReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}
