//! Common test utilities for registry-api integration tests.
//!
//! Builds the full router over an in-memory database and a temporary
//! storage directory, and drives it with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response, StatusCode},
    Router,
};
use fwreg_auth::{AccessGate, AccessPolicy, IpAllowlist};
use fwreg_webhooks::{DeliverySettings, DeliveryWorker, WebhookDispatcher};
use http_body_util::BodyExt;
use registry_api::{build_router, AppState, FirmwareStore};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const ADMIN_KEY: &str = "abc123";
pub const DEVICE_KEY: &str = "dev-456";
pub const WEBHOOK_SECRET: &str = "whsec_registry";
pub const BOUNDARY: &str = "fwreg-test-boundary";

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    _storage: TempDir,
}

pub struct TestAppBuilder {
    public_base_url: String,
    allowlist: Vec<&'static str>,
    max_upload_bytes: usize,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self {
            public_base_url: String::new(),
            allowlist: Vec::new(),
            max_upload_bytes: 1024 * 1024,
        }
    }
}

impl TestAppBuilder {
    pub fn public_base_url(mut self, url: &str) -> Self {
        self.public_base_url = url.to_string();
        self
    }

    pub fn allow(mut self, entry: &'static str) -> Self {
        self.allowlist.push(entry);
        self
    }

    pub fn max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    pub async fn build(self) -> TestApp {
        let storage = tempfile::tempdir().expect("tempdir");
        let db = fwreg_db::test_pool().await.expect("db");

        let policy = AccessPolicy {
            admin_key: Some(ADMIN_KEY.to_string()),
            device_key: Some(DEVICE_KEY.to_string()),
            allowlist: IpAllowlist::from_entries(self.allowlist),
            oidc: None,
        };
        let worker = DeliveryWorker::new(DeliverySettings {
            secret: Some(WEBHOOK_SECRET.to_string()),
            timeout: Duration::from_secs(2),
            max_retries: 1,
            base_delay: Duration::from_millis(20),
            ..DeliverySettings::default()
        })
        .expect("worker");

        let state = AppState {
            db: db.clone(),
            gate: Arc::new(AccessGate::from_policy(&policy, None)),
            webhooks: Arc::new(WebhookDispatcher::new(Arc::new(db), worker)),
            store: FirmwareStore::new(storage.path()),
            public_base_url: Arc::from(self.public_base_url.as_str()),
            max_upload_bytes: self.max_upload_bytes,
        };

        TestApp {
            router: build_router(state.clone()),
            state,
            _storage: storage,
        }
    }
}

impl TestApp {
    pub async fn new() -> Self {
        TestAppBuilder::default().build().await
    }

    pub fn builder() -> TestAppBuilder {
        TestAppBuilder::default()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible")
    }

    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.send(request).await;
        let status = response.status();
        let bytes = body_bytes(response).await;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn upload(&self, firmware_type: &str, version: &str, data: &[u8]) -> (StatusCode, Value) {
        self.send_json(upload_request(firmware_type, version, "app.bin", data, Some(ADMIN_KEY)))
            .await
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
        .to_vec()
}

pub fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(
    firmware_type: &str,
    version: &str,
    filename: &str,
    data: &[u8],
    admin_key: Option<&str>,
) -> Request<Body> {
    let body = multipart_body("file", filename, data);
    let mut builder = Request::post(format!("/api/firmware/{firmware_type}/{version}"))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("content-length", body.len());
    if let Some(key) = admin_key {
        builder = builder.header("x-admin-key", key);
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn device_get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("x-device-key", DEVICE_KEY)
        .body(Body::empty())
        .unwrap()
}

pub fn admin(method: &str, uri: &str, json: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-admin-key", ADMIN_KEY);
    match json {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Attach a peer address the way `into_make_service_with_connect_info` does.
pub fn from_peer(mut request: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().expect("socket addr");
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}
