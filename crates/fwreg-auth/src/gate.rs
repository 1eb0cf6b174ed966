//! The access gate: an ordered list of authentication strategies.
//!
//! Strategies run in order and the first one that grants access wins.
//! A strategy that finds nothing to check (no header, nothing configured)
//! steps aside; a strategy that checks and fails records a deny reason
//! but does not stop the chain.

use crate::error::AuthError;
use crate::ip_allowlist::IpAllowlist;
use crate::policy::{AccessPolicy, OidcParams, Role};
use crate::role_verifier::RoleVerifier;
use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// How a request was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    IpBypass,
    Jwt,
    ApiKey,
    None,
}

impl AuthMethod {
    /// Wire name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMethod::IpBypass => "ip_bypass",
            AuthMethod::Jwt => "jwt",
            AuthMethod::ApiKey => "api_key",
            AuthMethod::None => "none",
        }
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    IpNotListed,
    TokenInvalid,
    RoleMissing,
    KeyMismatch,
    NoCredentials,
}

impl DenyReason {
    /// Wire name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::IpNotListed => "ip_not_listed",
            DenyReason::TokenInvalid => "token_invalid",
            DenyReason::RoleMissing => "role_missing",
            DenyReason::KeyMismatch => "key_mismatch",
            DenyReason::NoCredentials => "no_credentials",
        }
    }
}

impl From<&AuthError> for DenyReason {
    fn from(err: &AuthError) -> Self {
        if err.is_role_missing() {
            DenyReason::RoleMissing
        } else {
            DenyReason::TokenInvalid
        }
    }
}

/// Outcome of one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyOutcome {
    Granted,
    NotApplicable,
    Denied(DenyReason),
}

/// Result of running the gate for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthDecision {
    pub allowed: bool,
    pub method: AuthMethod,
    pub role: Role,
    pub reason: Option<DenyReason>,
    /// Strategies that actually evaluated something, in order.
    pub attempted: Vec<AuthMethod>,
}

impl AuthDecision {
    /// The principal to attach to an allowed request.
    #[must_use]
    pub fn principal(&self) -> Option<Principal> {
        self.allowed.then_some(Principal {
            role: self.role,
            method: self.method,
        })
    }
}

/// Who a request was let in as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub role: Role,
    pub method: AuthMethod,
}

/// The parts of a request the gate looks at.
#[derive(Debug, Clone, Default)]
pub struct GateRequest {
    /// Peer address as seen by the listener, possibly with a port.
    pub peer: Option<String>,
    /// Raw `Authorization` header.
    pub authorization: Option<String>,
    /// Raw `X-Admin-Key` header.
    pub admin_key: Option<String>,
    /// Raw `X-Device-Key` header.
    pub device_key: Option<String>,
}

impl GateRequest {
    /// Collect gate inputs from a peer address and request headers.
    #[must_use]
    pub fn from_headers(peer: Option<SocketAddr>, headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            peer: peer.map(|p| p.to_string()),
            authorization: header(AUTHORIZATION.as_str()),
            admin_key: header(Role::Admin.key_header()),
            device_key: header(Role::Device.key_header()),
        }
    }

    /// Set the peer address.
    #[must_use]
    pub fn peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    /// Set the `Authorization` header.
    #[must_use]
    pub fn authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Set the static key header for `role`.
    #[must_use]
    pub fn key(mut self, role: Role, value: impl Into<String>) -> Self {
        match role {
            Role::Admin => self.admin_key = Some(value.into()),
            Role::Device => self.device_key = Some(value.into()),
        }
        self
    }

    fn presented_key(&self, role: Role) -> Option<&str> {
        match role {
            Role::Admin => self.admin_key.as_deref(),
            Role::Device => self.device_key.as_deref(),
        }
    }
}

/// One way of authenticating a request.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Method reported when this strategy grants access.
    fn method(&self) -> AuthMethod;

    /// Try to authenticate `request` for `role`.
    async fn attempt(&self, request: &GateRequest, role: Role) -> StrategyOutcome;
}

// ============================================================================
// Strategies
// ============================================================================

/// Grants any role to allow-listed peers.
#[derive(Debug, Clone)]
pub struct IpAllowlistStrategy {
    allowlist: IpAllowlist,
}

impl IpAllowlistStrategy {
    #[must_use]
    pub fn new(allowlist: IpAllowlist) -> Self {
        Self { allowlist }
    }
}

#[async_trait]
impl AuthStrategy for IpAllowlistStrategy {
    fn method(&self) -> AuthMethod {
        AuthMethod::IpBypass
    }

    async fn attempt(&self, request: &GateRequest, _role: Role) -> StrategyOutcome {
        match request.peer.as_deref() {
            Some(peer) if self.allowlist.is_bypassed(peer) => StrategyOutcome::Granted,
            _ => StrategyOutcome::NotApplicable,
        }
    }
}

/// Verifies an OIDC bearer token and the role mapped from the gate role.
#[derive(Debug, Clone)]
pub struct OidcStrategy {
    verifier: Arc<RoleVerifier>,
    admin_role: String,
    device_role: String,
}

impl OidcStrategy {
    #[must_use]
    pub fn new(verifier: Arc<RoleVerifier>, params: &OidcParams) -> Self {
        Self {
            verifier,
            admin_role: params.role_name(Role::Admin).to_string(),
            device_role: params.role_name(Role::Device).to_string(),
        }
    }
}

#[async_trait]
impl AuthStrategy for OidcStrategy {
    fn method(&self) -> AuthMethod {
        AuthMethod::Jwt
    }

    async fn attempt(&self, request: &GateRequest, role: Role) -> StrategyOutcome {
        let Some(authorization) = request.authorization.as_deref() else {
            return StrategyOutcome::NotApplicable;
        };
        let required = match role {
            Role::Admin => self.admin_role.as_str(),
            Role::Device => self.device_role.as_str(),
        };
        match self.verifier.check(Some(authorization), required).await {
            Ok(_) => StrategyOutcome::Granted,
            Err(err) => {
                if err.is_transport_error() {
                    warn!(target: "access_gate", error = %err, "Key set unavailable");
                } else {
                    debug!(target: "access_gate", error = %err, %role, "Bearer token rejected");
                }
                StrategyOutcome::Denied(DenyReason::from(&err))
            }
        }
    }
}

/// Compares the role's key header against a configured static key.
#[derive(Clone, Default)]
pub struct StaticKeyStrategy {
    admin_key: Option<String>,
    device_key: Option<String>,
}

impl StaticKeyStrategy {
    #[must_use]
    pub fn new(policy: &AccessPolicy) -> Self {
        Self {
            admin_key: policy.static_key(Role::Admin).map(str::to_string),
            device_key: policy.static_key(Role::Device).map(str::to_string),
        }
    }

    fn configured(&self, role: Role) -> Option<&str> {
        match role {
            Role::Admin => self.admin_key.as_deref(),
            Role::Device => self.device_key.as_deref(),
        }
    }
}

impl std::fmt::Debug for StaticKeyStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeyStrategy")
            .field("admin_key", &self.admin_key.as_ref().map(|_| "[REDACTED]"))
            .field("device_key", &self.device_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[async_trait]
impl AuthStrategy for StaticKeyStrategy {
    fn method(&self) -> AuthMethod {
        AuthMethod::ApiKey
    }

    async fn attempt(&self, request: &GateRequest, role: Role) -> StrategyOutcome {
        let (Some(expected), Some(presented)) = (self.configured(role), request.presented_key(role))
        else {
            return StrategyOutcome::NotApplicable;
        };
        if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            StrategyOutcome::Granted
        } else {
            StrategyOutcome::Denied(DenyReason::KeyMismatch)
        }
    }
}

// ============================================================================
// Gate
// ============================================================================

/// Runs strategies in priority order for each request.
pub struct AccessGate {
    strategies: Vec<Box<dyn AuthStrategy>>,
    allowlist_configured: bool,
}

impl AccessGate {
    /// Gate over an explicit strategy list.
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn AuthStrategy>>) -> Self {
        let allowlist_configured = strategies
            .iter()
            .any(|s| s.method() == AuthMethod::IpBypass);
        Self {
            strategies,
            allowlist_configured,
        }
    }

    /// Standard chain for a policy: IP bypass, then OIDC (when a verifier is
    /// available), then static keys.
    #[must_use]
    pub fn from_policy(policy: &AccessPolicy, verifier: Option<RoleVerifier>) -> Self {
        let mut strategies: Vec<Box<dyn AuthStrategy>> = Vec::new();
        if !policy.allowlist.is_empty() {
            strategies.push(Box::new(IpAllowlistStrategy::new(policy.allowlist.clone())));
        }
        if let (Some(verifier), Some(params)) = (verifier, policy.oidc.as_ref()) {
            strategies.push(Box::new(OidcStrategy::new(Arc::new(verifier), params)));
        }
        strategies.push(Box::new(StaticKeyStrategy::new(policy)));
        Self::new(strategies)
    }

    /// Methods in evaluation order.
    #[must_use]
    pub fn methods(&self) -> Vec<AuthMethod> {
        self.strategies.iter().map(|s| s.method()).collect()
    }

    /// Decide whether `request` may act as `role`.
    pub async fn authorize(&self, request: &GateRequest, role: Role) -> AuthDecision {
        let mut attempted = Vec::new();
        let mut last_denial = None;

        for strategy in &self.strategies {
            match strategy.attempt(request, role).await {
                StrategyOutcome::Granted => {
                    attempted.push(strategy.method());
                    return AuthDecision {
                        allowed: true,
                        method: strategy.method(),
                        role,
                        reason: None,
                        attempted,
                    };
                }
                StrategyOutcome::Denied(reason) => {
                    attempted.push(strategy.method());
                    last_denial = Some(reason);
                }
                StrategyOutcome::NotApplicable => {}
            }
        }

        let reason = last_denial.unwrap_or(if self.allowlist_configured {
            DenyReason::IpNotListed
        } else {
            DenyReason::NoCredentials
        });

        AuthDecision {
            allowed: false,
            method: AuthMethod::None,
            role,
            reason: Some(reason),
            attempted,
        }
    }

    /// Shorthand for `authorize(request, Role::Admin)`.
    pub async fn authorize_admin(&self, request: &GateRequest) -> AuthDecision {
        self.authorize(request, Role::Admin).await
    }

    /// Shorthand for `authorize(request, Role::Device)`.
    pub async fn authorize_device(&self, request: &GateRequest) -> AuthDecision {
        self.authorize(request, Role::Device).await
    }
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("strategies", &self.methods())
            .finish()
    }
}
