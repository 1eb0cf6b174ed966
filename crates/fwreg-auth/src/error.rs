//! Error types for token verification and key retrieval.

use thiserror::Error;

/// Failures raised while verifying a bearer token.
///
/// None of these reach an HTTP client directly: the access gate folds them
/// into a [`DenyReason`](crate::DenyReason) and logs the detail.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    // Request errors
    /// No `Authorization: Bearer <token>` header was usable.
    #[error("Missing or malformed bearer token")]
    MissingBearer,

    // JWT errors
    /// Token has expired (exp claim is in the past).
    #[error("Token has expired")]
    TokenExpired,

    /// Token signature is invalid.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Token format is malformed or invalid.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Token uses an algorithm outside the accepted asymmetric set.
    #[error("Unsupported algorithm: {0}")]
    InvalidAlgorithm(String),

    /// Issuer claim does not match the configured issuer.
    #[error("Invalid issuer")]
    InvalidIssuer,

    /// Audience claim does not contain the expected audience.
    #[error("Invalid audience")]
    InvalidAudience,

    /// Required claim is missing from token.
    #[error("Missing required claim: {0}")]
    MissingClaim(String),

    /// Token verified but none of the role locations carry the role.
    #[error("Required role not present: {0}")]
    RoleMissing(String),

    // Transport errors
    /// OIDC discovery document could not be fetched or parsed.
    #[error("OIDC discovery failed: {0}")]
    DiscoveryFailed(String),

    /// Failed to fetch JWKS from endpoint.
    #[error("JWKS fetch failed: {0}")]
    JwksFetchFailed(String),

    /// Key with specified kid not found in JWKS.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// JWK is invalid or of an unsupported type.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl AuthError {
    /// Check if this error indicates an expired token.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self, AuthError::TokenExpired)
    }

    /// Check if this error came from talking to the identity provider rather
    /// than from the token itself.
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            AuthError::DiscoveryFailed(_) | AuthError::JwksFetchFailed(_)
        )
    }

    /// Check if the token was valid but lacked the required role.
    #[must_use]
    pub fn is_role_missing(&self) -> bool {
        matches!(self, AuthError::RoleMissing(_))
    }
}
