//! Bearer-token verification against an OIDC issuer, with role checks.

use crate::claims::{RoleClaimPath, TokenClaims};
use crate::error::AuthError;
use crate::jwks::{self, JwksClient};
use crate::jwt::{self, ValidationConfig};
use crate::policy::OidcParams;
use tracing::{debug, instrument};

/// Extract the token from an `Authorization` header value.
///
/// The value must be exactly `<scheme> <token>` with a case-insensitive
/// `bearer` scheme and a non-empty token.
#[must_use]
pub fn extract_bearer(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}

/// Verifies bearer tokens issued by one OIDC provider.
#[derive(Debug, Clone)]
pub struct RoleVerifier {
    jwks: JwksClient,
    validation: ValidationConfig,
    claim_paths: Vec<RoleClaimPath>,
}

impl RoleVerifier {
    /// Discover the provider's key set and build a verifier.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::DiscoveryFailed` when the discovery document
    /// cannot be fetched.
    #[instrument(skip(params), fields(issuer = %params.issuer_url))]
    pub async fn discover(params: &OidcParams) -> Result<Self, AuthError> {
        let http_client = jwks::http_client(params.fetch_timeout)?;
        let metadata = jwks::discover(&http_client, &params.issuer_url).await?;
        let client = JwksClient::with_http_client(metadata.jwks_uri, http_client)
            .with_cache_ttl(params.key_cache_ttl)
            .with_min_refresh_interval(params.key_refresh_interval);
        Ok(Self::with_jwks(client, params))
    }

    /// Build a verifier around an already-known key-set client.
    #[must_use]
    pub fn with_jwks(jwks: JwksClient, params: &OidcParams) -> Self {
        let validation = ValidationConfig::default()
            .issuer(params.issuer_url.clone())
            .audience(params.expected_audience().to_string());
        Self {
            jwks,
            validation,
            claim_paths: RoleClaimPath::defaults(&params.client_id),
        }
    }

    /// Replace the role lookup order.
    #[must_use]
    pub fn with_claim_paths(mut self, paths: Vec<RoleClaimPath>) -> Self {
        self.claim_paths = paths;
        self
    }

    /// Role lookup order in use.
    #[must_use]
    pub fn claim_paths(&self) -> &[RoleClaimPath] {
        &self.claim_paths
    }

    /// Verify the bearer token in `authorization` and require `required_role`.
    ///
    /// An empty `required_role` accepts any token that verifies.
    ///
    /// # Errors
    ///
    /// - `AuthError::MissingBearer` - header absent or malformed
    /// - `AuthError::RoleMissing` - token verified but lacks the role
    /// - transport errors while fetching keys
    /// - any token validation failure
    pub async fn check(
        &self,
        authorization: Option<&str>,
        required_role: &str,
    ) -> Result<TokenClaims, AuthError> {
        let token = authorization
            .and_then(extract_bearer)
            .ok_or(AuthError::MissingBearer)?;

        let header = jwt::decode_header(token)?;
        jwt::ensure_accepted(header.alg)?;
        let jwk = self.jwks.get_key(header.kid.as_deref()).await?;
        let claims = jwt::decode_with_jwk(token, &header, &jwk, &self.validation)?;

        if required_role.is_empty() || claims.has_role_in(required_role, &self.claim_paths) {
            debug!(sub = ?claims.sub, role = %required_role, "Bearer token accepted");
            Ok(claims)
        } else {
            Err(AuthError::RoleMissing(required_role.to_string()))
        }
    }

    /// Boolean form of [`check`](Self::check); never fails.
    pub async fn verify_and_check_role(
        &self,
        authorization: Option<&str>,
        required_role: &str,
    ) -> bool {
        self.check(authorization, required_role).await.is_ok()
    }
}
