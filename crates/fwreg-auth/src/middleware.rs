//! Axum integration: role extractors and route-layer middleware.
//!
//! Both forms run the same gate and attach a [`Principal`] on success.
//! Denials become `401` with a body that names only the role; the reason
//! and the strategies tried go to the `access_gate` log target.
//!
//! ```rust,ignore
//! async fn upload(AdminAccess(principal): AdminAccess) { /* ... */ }
//!
//! let webhooks = Router::new()
//!     .route("/api/webhooks", get(list))
//!     .route_layer(middleware::from_fn_with_state(gate, require_admin));
//! ```

use crate::gate::{AccessGate, AuthDecision, GateRequest, Principal};
use crate::policy::Role;
use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Rejection for a request the gate turned away.
#[derive(Debug, Clone, Copy)]
pub struct Unauthorized {
    pub role: Role,
}

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        let body = json!({
            "error": "unauthorized",
            "message": format!("unauthorized ({})", self.role),
            "status": StatusCode::UNAUTHORIZED.as_u16(),
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Run the gate for the request described by `parts`.
pub async fn authorize_parts(
    gate: &AccessGate,
    parts: &Parts,
    role: Role,
) -> Result<Principal, Unauthorized> {
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let request = GateRequest::from_headers(peer, &parts.headers);
    let decision = gate.authorize(&request, role).await;
    log_decision(&decision, parts, request.peer.as_deref());
    decision.principal().ok_or(Unauthorized { role })
}

fn log_decision(decision: &AuthDecision, parts: &Parts, peer: Option<&str>) {
    let attempted: Vec<&str> = decision.attempted.iter().map(|m| m.as_str()).collect();
    if decision.allowed {
        debug!(
            target: "access_gate",
            role = %decision.role,
            method = decision.method.as_str(),
            path = %parts.uri.path(),
            peer = peer.unwrap_or("-"),
            "Access granted"
        );
    } else {
        warn!(
            target: "access_gate",
            role = %decision.role,
            reason = decision.reason.map_or("-", |r| r.as_str()),
            attempted = ?attempted,
            method = %parts.method,
            path = %parts.uri.path(),
            peer = peer.unwrap_or("-"),
            "Access denied"
        );
    }
}

/// Extractor that requires the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminAccess(pub Principal);

impl<S> FromRequestParts<S> for AdminAccess
where
    S: Send + Sync,
    Arc<AccessGate>: FromRef<S>,
{
    type Rejection = Unauthorized;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = Arc::<AccessGate>::from_ref(state);
        authorize_parts(&gate, parts, Role::Admin).await.map(Self)
    }
}

/// Extractor that requires the device role.
#[derive(Debug, Clone, Copy)]
pub struct DeviceAccess(pub Principal);

impl<S> FromRequestParts<S> for DeviceAccess
where
    S: Send + Sync,
    Arc<AccessGate>: FromRef<S>,
{
    type Rejection = Unauthorized;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = Arc::<AccessGate>::from_ref(state);
        authorize_parts(&gate, parts, Role::Device).await.map(Self)
    }
}

async fn require_role(
    gate: &AccessGate,
    role: Role,
    request: Request,
    next: Next,
) -> Result<Response, Unauthorized> {
    let (mut parts, body) = request.into_parts();
    let principal = authorize_parts(gate, &parts, role).await?;
    parts.extensions.insert(principal);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Route-layer middleware requiring the admin role.
pub async fn require_admin(
    State(gate): State<Arc<AccessGate>>,
    request: Request,
    next: Next,
) -> Result<Response, Unauthorized> {
    require_role(&gate, Role::Admin, request, next).await
}

/// Route-layer middleware requiring the device role.
pub async fn require_device(
    State(gate): State<Arc<AccessGate>>,
    request: Request,
    next: Next,
) -> Result<Response, Unauthorized> {
    require_role(&gate, Role::Device, request, next).await
}
