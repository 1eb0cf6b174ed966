//! Access gate for the firmware registry.
//!
//! Requests are authorized for one of two roles, admin or device, by an
//! ordered chain of strategies:
//!
//! 1. **IP allowlist** - listed peers bypass every other check
//! 2. **OIDC bearer token** - verified against the issuer's JWKS, with the
//!    role looked up across the usual claim locations
//! 3. **Static key** - `X-Admin-Key` / `X-Device-Key`
//!
//! The first strategy that grants access wins.
//!
//! # Example
//!
//! ```rust,ignore
//! use fwreg_auth::{AccessGate, AccessPolicy, GateRequest, Role};
//!
//! let policy = AccessPolicy { admin_key: Some("abc123".into()), ..Default::default() };
//! let gate = AccessGate::from_policy(&policy, None);
//!
//! let request = GateRequest::default().key(Role::Admin, "abc123");
//! assert!(gate.authorize_admin(&request).await.allowed);
//! ```

pub mod claims;
pub mod error;
pub mod gate;
pub mod ip_allowlist;
pub mod jwks;
pub mod jwt;
pub mod middleware;
pub mod policy;
pub mod role_verifier;

pub use claims::{RoleClaimPath, TokenClaims};
pub use error::AuthError;
pub use gate::{
    AccessGate, AuthDecision, AuthMethod, AuthStrategy, DenyReason, GateRequest,
    IpAllowlistStrategy, OidcStrategy, Principal, StaticKeyStrategy, StrategyOutcome,
};
pub use ip_allowlist::{parse_peer, AllowEntry, IpAllowlist};
pub use jwks::{Jwk, JwkSet, JwksClient};
pub use middleware::{require_admin, require_device, AdminAccess, DeviceAccess, Unauthorized};
pub use policy::{AccessPolicy, OidcParams, Role};
pub use role_verifier::{extract_bearer, RoleVerifier};
