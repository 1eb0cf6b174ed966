//! Shared fixtures: an RSA signing key, its JWKS, and a mock OIDC provider.

#![allow(dead_code)]

use chrono::Utc;
use fwreg_auth::{OidcParams, RoleVerifier};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SIGNING_KEY_PEM: &[u8] = include_bytes!("../fixtures/signing_key.pem");
pub const ROGUE_KEY_PEM: &[u8] = include_bytes!("../fixtures/rogue_key.pem");
const SIGNING_KEY_N: &str = include_str!("../fixtures/signing_key.n");

pub const KID: &str = "registry-test-key";
pub const CLIENT_ID: &str = "firmware-registry";
pub const JWKS_PATH: &str = "/protocol/openid-connect/certs";

/// JWKS document publishing the signing key under `kid`.
pub fn jwks_for(kid: &str) -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": SIGNING_KEY_N.trim(),
            "e": "AQAB"
        }]
    })
}

/// Claims that pass every check against `issuer`.
pub fn valid_claims(issuer: &str) -> Value {
    json!({
        "sub": "ci-pipeline",
        "iss": issuer,
        "aud": CLIENT_ID,
        "exp": Utc::now().timestamp() + 600,
        "iat": Utc::now().timestamp(),
    })
}

/// Sign `claims` with `pem` using RS256 and `kid`.
pub fn sign_with(claims: &Value, pem: &[u8], kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem).expect("valid test key");
    encode(&header, claims, &key).expect("token encodes")
}

/// Sign `claims` with the published key.
pub fn sign(claims: &Value) -> String {
    sign_with(claims, SIGNING_KEY_PEM, Some(KID))
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Mount the discovery document on `server`.
pub async fn mount_discovery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": server.uri(),
            "jwks_uri": format!("{}{JWKS_PATH}", server.uri()),
        })))
        .mount(server)
        .await;
}

/// OIDC parameters pointing at `server` with role names set.
pub fn params(server: &MockServer) -> OidcParams {
    OidcParams {
        client_id: CLIENT_ID.to_string(),
        admin_role: "fw-admin".to_string(),
        device_role: "fw-device".to_string(),
        ..OidcParams::new(server.uri())
    }
}

/// Mock provider with discovery and a JWKS that must be fetched `expected_fetches` times.
pub async fn provider(expected_fetches: u64) -> (MockServer, RoleVerifier) {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_for(KID)))
        .expect(expected_fetches)
        .mount(&server)
        .await;
    let verifier = RoleVerifier::discover(&params(&server))
        .await
        .expect("discovery succeeds");
    (server, verifier)
}
