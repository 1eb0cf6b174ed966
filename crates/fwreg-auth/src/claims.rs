//! Verified token claims and role lookup.
//!
//! Identity providers put roles in different places. Keycloak uses
//! `realm_access.roles` and `resource_access.<client>.roles`, others use a
//! flat `roles` array. Lookup walks an ordered list of [`RoleClaimPath`]s and
//! stops at the first location that holds the role.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims of a verified bearer token.
///
/// Only the standard claims the gate logs are typed; everything else stays
/// in `extra` for role lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    /// Subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Expiration time (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Remaining claims, including `aud` and the role containers.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    /// Look up a raw claim by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    /// Check whether any of `paths` lists `role`.
    #[must_use]
    pub fn has_role_in(&self, role: &str, paths: &[RoleClaimPath]) -> bool {
        paths.iter().any(|path| path.contains_role(&self.extra, role))
    }

    /// All roles found along `paths`, in path order, duplicates removed.
    #[must_use]
    pub fn roles_in(&self, paths: &[RoleClaimPath]) -> Vec<String> {
        let mut roles: Vec<String> = Vec::new();
        for path in paths {
            for role in path.roles(&self.extra) {
                if !roles.iter().any(|r| r == role) {
                    roles.push(role.to_string());
                }
            }
        }
        roles
    }
}

/// A dotted location of a roles array inside the claim set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleClaimPath {
    segments: Vec<String>,
}

impl RoleClaimPath {
    /// Create a path from its key segments, outermost first.
    #[must_use]
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// `realm_access.roles`.
    #[must_use]
    pub fn realm_roles() -> Self {
        Self::new(["realm_access", "roles"])
    }

    /// `resource_access.<client_id>.roles`.
    #[must_use]
    pub fn client_roles(client_id: &str) -> Self {
        Self::new(["resource_access", client_id, "roles"])
    }

    /// Top-level `roles`.
    #[must_use]
    pub fn top_level() -> Self {
        Self::new(["roles"])
    }

    /// The lookup order used when nothing else is configured.
    ///
    /// The client path is omitted when no client ID is known.
    #[must_use]
    pub fn defaults(client_id: &str) -> Vec<Self> {
        let mut paths = vec![Self::realm_roles()];
        if !client_id.is_empty() {
            paths.push(Self::client_roles(client_id));
        }
        paths.push(Self::top_level());
        paths
    }

    /// The string entries of the array at this path. Missing or ill-typed
    /// locations yield nothing.
    pub fn roles<'a>(&self, claims: &'a Map<String, Value>) -> impl Iterator<Item = &'a str> {
        self.resolve(claims)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    /// Whether the array at this path contains `role`.
    #[must_use]
    pub fn contains_role(&self, claims: &Map<String, Value>, role: &str) -> bool {
        self.roles(claims).any(|r| r == role)
    }

    fn resolve<'a>(&self, claims: &'a Map<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let mut current = claims.get(first)?;
        for segment in rest {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

impl std::fmt::Display for RoleClaimPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}
