//! Access gate behaviour with a live (mocked) OIDC provider.

mod common;

use common::*;
use fwreg_auth::{
    AccessGate, AccessPolicy, AuthMethod, DenyReason, GateRequest, IpAllowlist, Role,
};
use serde_json::json;

async fn oidc_gate(
    admin_key: Option<&str>,
    expected_fetches: u64,
) -> (wiremock::MockServer, AccessGate) {
    let (server, verifier) = provider(expected_fetches).await;
    let policy = AccessPolicy {
        admin_key: admin_key.map(str::to_string),
        device_key: None,
        allowlist: IpAllowlist::default(),
        oidc: Some(params(&server)),
    };
    let gate = AccessGate::from_policy(&policy, Some(verifier));
    (server, gate)
}

/// A token with the admin role is allowed via JWT.
#[tokio::test]
async fn test_token_with_role_allowed() {
    let (server, gate) = oidc_gate(None, 1).await;
    let mut claims = valid_claims(&server.uri());
    claims["realm_access"] = json!({ "roles": ["fw-admin"] });
    let request = GateRequest::default().authorization(bearer(&sign(&claims)));

    let decision = gate.authorize_admin(&request).await;
    assert!(decision.allowed);
    assert_eq!(decision.method, AuthMethod::Jwt);
    assert_eq!(gate.methods(), vec![AuthMethod::Jwt, AuthMethod::ApiKey]);
}

/// The gate maps roles: an admin-only token is not a device token.
#[tokio::test]
async fn test_role_mapping_per_entry_point() {
    let (server, gate) = oidc_gate(None, 1).await;
    let mut claims = valid_claims(&server.uri());
    claims["realm_access"] = json!({ "roles": ["fw-admin"] });
    let request = GateRequest::default().authorization(bearer(&sign(&claims)));

    let decision = gate.authorize_device(&request).await;
    assert!(!decision.allowed);
    assert_eq!(decision.reason, Some(DenyReason::RoleMissing));
}

/// A bad token does not stop the static key from granting access.
#[tokio::test]
async fn test_static_key_fallback_after_bad_token() {
    let (_server, gate) = oidc_gate(Some("abc123"), 0).await;
    let request = GateRequest::default()
        .authorization("Bearer not-a-token")
        .key(Role::Admin, "abc123");

    let decision = gate.authorize_admin(&request).await;
    assert!(decision.allowed);
    assert_eq!(decision.method, AuthMethod::ApiKey);
    assert_eq!(decision.attempted, vec![AuthMethod::Jwt, AuthMethod::ApiKey]);
}

/// A malformed token with no key is denied as an invalid token.
#[tokio::test]
async fn test_bad_token_alone_is_token_invalid() {
    let (_server, gate) = oidc_gate(Some("abc123"), 0).await;
    let request = GateRequest::default().authorization("Basic Zm9vOmJhcg==");

    let decision = gate.authorize_admin(&request).await;
    assert!(!decision.allowed);
    assert_eq!(decision.reason, Some(DenyReason::TokenInvalid));
}
