//! Access policy: the immutable inputs of the access gate.

use crate::ip_allowlist::IpAllowlist;
use crate::jwks::{DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT, DEFAULT_MIN_REFRESH_INTERVAL};
use serde::Serialize;
use std::time::Duration;

/// Role a request must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Publishes and deletes firmware, manages webhooks.
    Admin,
    /// Lists and downloads firmware.
    Device,
}

impl Role {
    /// Lower-case name used in logs and rejection messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Device => "device",
        }
    }

    /// Header carrying the static key for this role.
    #[must_use]
    pub fn key_header(self) -> &'static str {
        match self {
            Role::Admin => "x-admin-key",
            Role::Device => "x-device-key",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OIDC provider parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcParams {
    /// Issuer URL; discovery lives under it and tokens must carry it as `iss`.
    pub issuer_url: String,
    /// Client ID, used for `resource_access.<client_id>.roles` and as the
    /// fallback audience.
    pub client_id: String,
    /// Expected audience. Empty falls back to `client_id`.
    pub audience: String,
    /// Role name required for admin access. Empty accepts any valid token.
    pub admin_role: String,
    /// Role name required for device access. Empty accepts any valid token.
    pub device_role: String,
    /// How long a fetched key set is trusted.
    pub key_cache_ttl: Duration,
    /// Minimum spacing between refetches forced by an unknown kid.
    pub key_refresh_interval: Duration,
    /// Timeout for discovery and key-set requests.
    pub fetch_timeout: Duration,
}

impl OidcParams {
    /// Parameters for `issuer_url` with default TTL and timeout.
    #[must_use]
    pub fn new(issuer_url: impl Into<String>) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            client_id: String::new(),
            audience: String::new(),
            admin_role: String::new(),
            device_role: String::new(),
            key_cache_ttl: DEFAULT_CACHE_TTL,
            key_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// The audience tokens must carry, if any.
    #[must_use]
    pub fn expected_audience(&self) -> &str {
        if self.audience.is_empty() {
            &self.client_id
        } else {
            &self.audience
        }
    }

    /// Role name mapped from `role`.
    #[must_use]
    pub fn role_name(&self, role: Role) -> &str {
        match role {
            Role::Admin => &self.admin_role,
            Role::Device => &self.device_role,
        }
    }
}

/// Everything the access gate decides on. Built once at start-up.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    /// Static key accepted in `X-Admin-Key`.
    pub admin_key: Option<String>,
    /// Static key accepted in `X-Device-Key`.
    pub device_key: Option<String>,
    /// Peers that bypass authentication.
    pub allowlist: IpAllowlist,
    /// OIDC parameters; `None` when OIDC is disabled.
    pub oidc: Option<OidcParams>,
}

impl AccessPolicy {
    /// Static key configured for `role`. Empty keys count as unset.
    #[must_use]
    pub fn static_key(&self, role: Role) -> Option<&str> {
        let key = match role {
            Role::Admin => self.admin_key.as_deref(),
            Role::Device => self.device_key.as_deref(),
        };
        key.filter(|k| !k.is_empty())
    }
}
