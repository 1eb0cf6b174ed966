//! OIDC discovery plus JWKS fetching and caching.
//!
//! The key set is cached for a configurable TTL. A token signed with a kid
//! that is not in the cached set forces one refetch, which is how key
//! rotation at the issuer becomes visible before the TTL runs out. Forced
//! refetches are rate limited to one per `min_refresh_interval`; a miss
//! inside that window fails with `KeyNotFound` without touching the network.

use crate::error::AuthError;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

/// Default timeout for discovery and key-set requests.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default key-set cache lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default minimum spacing between refetches forced by an unknown kid.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// A JSON Web Key as defined in RFC 7517. RSA and EC keys are supported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Public key use (e.g., "sig" for signature).
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Algorithm (e.g., "RS256").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// RSA modulus (`Base64URL` encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (`Base64URL` encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (`Base64URL` encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (`Base64URL` encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl Jwk {
    /// Build a verification key for this JWK.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidKey` for unsupported key types, missing
    /// components, or bad encodings.
    pub fn decoding_key(&self) -> Result<DecodingKey, AuthError> {
        match self.kty.as_str() {
            "RSA" => {
                let n = self
                    .n
                    .as_deref()
                    .ok_or_else(|| AuthError::InvalidKey("Missing modulus (n)".to_string()))?;
                let e = self
                    .e
                    .as_deref()
                    .ok_or_else(|| AuthError::InvalidKey("Missing exponent (e)".to_string()))?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| AuthError::InvalidKey(format!("Invalid RSA components: {e}")))
            }
            "EC" => {
                let x = self
                    .x
                    .as_deref()
                    .ok_or_else(|| AuthError::InvalidKey("Missing x coordinate".to_string()))?;
                let y = self
                    .y
                    .as_deref()
                    .ok_or_else(|| AuthError::InvalidKey("Missing y coordinate".to_string()))?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| AuthError::InvalidKey(format!("Invalid EC components: {e}")))
            }
            other => Err(AuthError::InvalidKey(format!("Unsupported key type: {other}"))),
        }
    }

    /// Whether this key may verify a token signed with `alg`.
    ///
    /// A key that declares its own `alg` only accepts that algorithm.
    #[must_use]
    pub fn permits(&self, alg: Algorithm) -> bool {
        let family_ok = match self.kty.as_str() {
            "RSA" => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            "EC" => matches!(alg, Algorithm::ES256 | Algorithm::ES384),
            _ => false,
        };
        let declared_ok = match self.alg.as_deref() {
            Some(declared) => declared == format!("{alg:?}"),
            None => true,
        };
        family_ok && declared_ok
    }
}

/// A JSON Web Key Set as defined in RFC 7517.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkSet {
    /// Array of JWK values.
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Find a key by its kid.
    #[must_use]
    pub fn find_key(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    /// Pick a key for a token without a kid: the only key, if there is one.
    #[must_use]
    pub fn sole_key(&self) -> Option<&Jwk> {
        match self.keys.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

/// Subset of the OpenID provider metadata the verifier needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer identifier as published by the provider.
    pub issuer: Option<String>,
    /// Location of the provider's key set.
    pub jwks_uri: String,
}

/// Well-known discovery URL for an issuer.
#[must_use]
pub fn well_known_url(issuer_url: &str) -> String {
    let issuer_url = issuer_url.trim_end_matches('/');
    format!("{issuer_url}/.well-known/openid-configuration")
}

/// Fetch the provider metadata for `issuer_url`.
///
/// # Errors
///
/// Returns `AuthError::DiscoveryFailed` on transport errors, non-2xx
/// responses, or a document without `jwks_uri`.
#[instrument(skip(http_client), fields(issuer = %issuer_url))]
pub async fn discover(
    http_client: &reqwest::Client,
    issuer_url: &str,
) -> Result<ProviderMetadata, AuthError> {
    let url = well_known_url(issuer_url);
    let response = http_client
        .get(&url)
        .send()
        .await
        .map_err(|e| AuthError::DiscoveryFailed(format!("Request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(AuthError::DiscoveryFailed(format!(
            "HTTP {} from {url}",
            response.status()
        )));
    }

    let metadata: ProviderMetadata = response
        .json()
        .await
        .map_err(|e| AuthError::DiscoveryFailed(format!("Invalid discovery document: {e}")))?;

    if metadata.jwks_uri.is_empty() {
        return Err(AuthError::DiscoveryFailed(
            "Discovery document has empty jwks_uri".to_string(),
        ));
    }

    debug!(jwks_uri = %metadata.jwks_uri, "Discovered OIDC key set");
    Ok(metadata)
}

/// Build the HTTP client used for discovery and key-set requests.
///
/// # Errors
///
/// Returns `AuthError::JwksFetchFailed` if the client cannot be created.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AuthError::JwksFetchFailed(format!("Failed to create HTTP client: {e}")))
}

/// Cached JWKS entry.
struct CachedJwks {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// JWKS client with TTL caching.
///
/// Concurrent callers that all miss the cache may each fetch; the last write
/// wins. Cheap clones share the cache.
#[derive(Clone)]
pub struct JwksClient {
    url: String,
    cache: Arc<RwLock<Option<CachedJwks>>>,
    cache_ttl: Duration,
    last_forced_refresh: Arc<Mutex<Option<Instant>>>,
    min_refresh_interval: Duration,
    http_client: reqwest::Client,
}

impl JwksClient {
    /// Create a client for a known JWKS URL with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::JwksFetchFailed` if the HTTP client cannot be created.
    pub fn new(url: impl Into<String>) -> Result<Self, AuthError> {
        Ok(Self::with_http_client(url, http_client(DEFAULT_FETCH_TIMEOUT)?))
    }

    /// Create a client that reuses an existing HTTP client.
    #[must_use]
    pub fn with_http_client(url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            cache: Arc::new(RwLock::new(None)),
            cache_ttl: DEFAULT_CACHE_TTL,
            last_forced_refresh: Arc::new(Mutex::new(None)),
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            http_client,
        }
    }

    /// Set the cache TTL.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the minimum spacing between refetches forced by an unknown kid.
    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// The key-set URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch JWKS from the endpoint and refresh the cache.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::JwksFetchFailed` if the fetch fails.
    pub async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchFailed(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::JwksFetchFailed(format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchFailed(format!("Invalid JSON: {e}")))?;

        debug!(url = %self.url, keys = jwks.keys.len(), "Fetched JWKS");

        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });

        Ok(jwks)
    }

    /// Get JWKS, using the cache while it is fresh.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::JwksFetchFailed` if a refetch is needed and fails.
    pub async fn get_jwks(&self) -> Result<JwkSet, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(ref cached) = *cache {
                if cached.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(cached.jwks.clone());
                }
            }
        }

        self.fetch_jwks().await
    }

    /// Resolve the key for a token header.
    ///
    /// With a kid, an unknown kid forces one refetch unless another forced
    /// refetch happened within `min_refresh_interval`. Without a kid, the set
    /// must contain exactly one key.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::KeyNotFound` if no key matches after refetching,
    /// or if the refetch was suppressed.
    pub async fn get_key(&self, kid: Option<&str>) -> Result<Jwk, AuthError> {
        let jwks = self.get_jwks().await?;
        if let Some(key) = select(&jwks, kid) {
            return Ok(key.clone());
        }

        if !self.claim_forced_refresh().await {
            debug!(kid = ?kid, "Unknown kid; forced key refetch suppressed");
            return Err(AuthError::KeyNotFound(kid.unwrap_or("<none>").to_string()));
        }

        let jwks = self.fetch_jwks().await?;
        select(&jwks, kid)
            .cloned()
            .ok_or_else(|| AuthError::KeyNotFound(kid.unwrap_or("<none>").to_string()))
    }

    /// Record a forced refetch, unless one happened too recently.
    async fn claim_forced_refresh(&self) -> bool {
        let mut last = self.last_forced_refresh.lock().await;
        match *last {
            Some(at) if at.elapsed() < self.min_refresh_interval => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }

    /// Drop the cached key set.
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }
}

fn select<'a>(jwks: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => jwks.find_key(kid),
        None => jwks.sole_key(),
    }
}

impl std::fmt::Debug for JwksClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksClient")
            .field("url", &self.url)
            .field("cache_ttl", &self.cache_ttl)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_key(kid: &str) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: Some(kid.to_string()),
            key_use: Some("sig".to_string()),
            alg: Some("RS256".to_string()),
            n: Some("sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1Wl".to_string()),
            e: Some("AQAB".to_string()),
            crv: None,
            x: None,
            y: None,
        }
    }

    #[tokio::test]
    async fn test_forced_refresh_is_rate_limited() {
        let client = JwksClient::new("http://127.0.0.1:9/keys").unwrap();
        assert!(client.claim_forced_refresh().await);
        assert!(!client.claim_forced_refresh().await);
        assert!(!client.clone().claim_forced_refresh().await);

        let eager = JwksClient::new("http://127.0.0.1:9/keys")
            .unwrap()
            .with_min_refresh_interval(Duration::ZERO);
        assert!(eager.claim_forced_refresh().await);
        assert!(eager.claim_forced_refresh().await);
    }

    #[test]
    fn test_well_known_url() {
        assert_eq!(
            well_known_url("https://idp.example.com/realms/fw"),
            "https://idp.example.com/realms/fw/.well-known/openid-configuration"
        );
        assert_eq!(
            well_known_url("https://idp.example.com/realms/fw/"),
            "https://idp.example.com/realms/fw/.well-known/openid-configuration"
        );
    }

    #[test]
    fn test_find_and_select_keys() {
        let jwks = JwkSet {
            keys: vec![rsa_key("k1"), rsa_key("k2")],
        };
        assert!(jwks.find_key("k2").is_some());
        assert!(jwks.find_key("k3").is_none());
        assert!(select(&jwks, None).is_none());

        let single = JwkSet {
            keys: vec![rsa_key("only")],
        };
        assert_eq!(
            select(&single, None).and_then(|k| k.kid.as_deref()),
            Some("only")
        );
    }

    #[test]
    fn test_permits_respects_family_and_declared_alg() {
        let key = rsa_key("k1");
        assert!(key.permits(Algorithm::RS256));
        assert!(!key.permits(Algorithm::RS512));
        assert!(!key.permits(Algorithm::HS256));
        assert!(!key.permits(Algorithm::ES256));

        let undeclared = Jwk { alg: None, ..rsa_key("k1") };
        assert!(undeclared.permits(Algorithm::PS384));
        assert!(!undeclared.permits(Algorithm::HS512));
    }

    #[test]
    fn test_unsupported_key_type_rejected() {
        let key = Jwk {
            kty: "oct".to_string(),
            ..rsa_key("k1")
        };
        assert!(matches!(key.decoding_key(), Err(AuthError::InvalidKey(_))));
    }

    #[test]
    fn test_rsa_key_missing_exponent_rejected() {
        let key = Jwk { e: None, ..rsa_key("k1") };
        assert!(matches!(key.decoding_key(), Err(AuthError::InvalidKey(_))));
    }

    #[test]
    fn test_jwk_deserializes_from_provider_json() {
        let jwks: JwkSet = serde_json::from_str(
            r#"{"keys":[{"kty":"EC","kid":"ec1","use":"sig","crv":"P-256","x":"abc","y":"def"}]}"#,
        )
        .unwrap();
        assert_eq!(jwks.keys[0].crv.as_deref(), Some("P-256"));
        assert_eq!(jwks.keys[0].key_use.as_deref(), Some("sig"));
    }
}
