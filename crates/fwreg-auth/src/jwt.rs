//! JWT decoding against a JWK.
//!
//! Only asymmetric algorithms are accepted. The token header picks the
//! algorithm, and that algorithm must also be permitted by the key.

use crate::claims::TokenClaims;
use crate::error::AuthError;
use crate::jwks::Jwk;
use jsonwebtoken::{decode, Algorithm, Header, TokenData, Validation};

/// Algorithms a token may be signed with.
pub const ACCEPTED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// Configuration for JWT validation.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Leeway in seconds for exp/nbf validation (clock skew tolerance).
    pub leeway: u64,
    /// Expected issuer (if set, tokens with different issuer are rejected).
    pub issuer: Option<String>,
    /// Expected audience (if set, tokens without matching audience are rejected).
    pub audience: Option<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            leeway: 60,
            issuer: None,
            audience: None,
        }
    }
}

impl ValidationConfig {
    /// Set the expected issuer. Empty strings disable the check.
    #[must_use]
    pub fn issuer(mut self, iss: impl Into<String>) -> Self {
        self.issuer = Some(iss.into()).filter(|s: &String| !s.is_empty());
        self
    }

    /// Set the expected audience. Empty strings disable the check.
    #[must_use]
    pub fn audience(mut self, aud: impl Into<String>) -> Self {
        self.audience = Some(aud.into()).filter(|s: &String| !s.is_empty());
        self
    }

    /// Set the clock skew tolerance.
    #[must_use]
    pub fn leeway(mut self, secs: u64) -> Self {
        self.leeway = secs;
        self
    }

    fn to_validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.leeway;
        validation.validate_exp = true;

        let mut required = vec!["exp"];
        if let Some(ref iss) = self.issuer {
            validation.set_issuer(&[iss]);
            required.push("iss");
        }
        if let Some(ref aud) = self.audience {
            validation.set_audience(&[aud]);
            required.push("aud");
        } else {
            validation.validate_aud = false;
        }
        validation.set_required_spec_claims(&required);
        validation
    }
}

/// Read the token header without verifying anything.
///
/// # Errors
///
/// Returns `AuthError::InvalidToken` if the header cannot be decoded.
pub fn decode_header(token: &str) -> Result<Header, AuthError> {
    jsonwebtoken::decode_header(token)
        .map_err(|e| AuthError::InvalidToken(format!("Invalid token header: {e}")))
}

/// Check that a header algorithm is in the accepted asymmetric set.
///
/// # Errors
///
/// Returns `AuthError::InvalidAlgorithm` otherwise.
pub fn ensure_accepted(alg: Algorithm) -> Result<(), AuthError> {
    if ACCEPTED_ALGORITHMS.contains(&alg) {
        Ok(())
    } else {
        Err(AuthError::InvalidAlgorithm(format!("{alg:?}")))
    }
}

/// Verify `token` with `jwk` and return its claims.
///
/// # Errors
///
/// - `AuthError::InvalidAlgorithm` - header algorithm not accepted or not
///   permitted by the key
/// - `AuthError::TokenExpired` - token has expired
/// - `AuthError::InvalidSignature` - signature verification failed
/// - `AuthError::InvalidIssuer` / `AuthError::InvalidAudience` - claim mismatch
/// - `AuthError::InvalidKey` - the JWK cannot be used
pub fn decode_with_jwk(
    token: &str,
    header: &Header,
    jwk: &Jwk,
    config: &ValidationConfig,
) -> Result<TokenClaims, AuthError> {
    ensure_accepted(header.alg)?;
    if !jwk.permits(header.alg) {
        return Err(AuthError::InvalidAlgorithm(format!(
            "{:?} not permitted by key {}",
            header.alg,
            jwk.kid.as_deref().unwrap_or("<none>")
        )));
    }

    let key = jwk.decoding_key()?;
    let token_data: TokenData<TokenClaims> =
        decode(token, &key, &config.to_validation(header.alg)).map_err(map_jwt_error)?;

    Ok(token_data.claims)
}

/// Map jsonwebtoken errors to `AuthError`.
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidAlgorithm => AuthError::InvalidAlgorithm("key mismatch".to_string()),
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken => AuthError::InvalidToken("Malformed token".to_string()),
        ErrorKind::Base64(_) => AuthError::InvalidToken("Invalid base64 encoding".to_string()),
        ErrorKind::Json(_) => AuthError::InvalidToken("Invalid JSON in claims".to_string()),
        ErrorKind::MissingRequiredClaim(claim) => AuthError::MissingClaim(claim.to_string()),
        _ => AuthError::InvalidToken(format!("Token validation failed: {err}")),
    }
}
