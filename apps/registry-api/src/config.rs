//! Service configuration.
//!
//! Load order: built-in defaults, then the optional YAML file named by
//! `FW_CONFIG_FILE`, then `FW_*` environment overrides. Malformed
//! environment values are ignored and the previous value is kept.

use fwreg_auth::{AccessPolicy, IpAllowlist, OidcParams};
use fwreg_webhooks::{DeliverySettings, FanOut, MAX_QUEUE, MAX_WORKERS};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    /// Prefix for `downloadUrl` in firmware responses. Empty omits the field.
    pub public_base_url: String,
    pub storage_dir: PathBuf,
    pub db_path: PathBuf,
    pub admin_key: Option<String>,
    pub device_key: Option<String>,
    /// Comma-separated IPs and CIDR subnets that skip authentication.
    pub no_auth_ips: String,
    pub max_upload_mb: u64,
    pub logging: LoggingConfig,
    pub oidc: OidcConfig,
    pub webhooks: WebhookConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            public_base_url: String::new(),
            storage_dir: PathBuf::from("/data/firmware"),
            db_path: PathBuf::from("/data/db/firmware-registry.db"),
            admin_key: None,
            device_key: None,
            no_auth_ips: String::new(),
            max_upload_mb: 50,
            logging: LoggingConfig::default(),
            oidc: OidcConfig::default(),
            webhooks: WebhookConfig::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `pretty`.
    pub format: String,
    /// `stdout`, `file` or `multi` (stdout and file).
    pub output: String,
    /// Log file for `file` and `multi` output.
    pub file_path: String,
    /// `daily`, `hourly`, `minutely` or `never`.
    pub rotation: String,
    /// Rotated files kept besides the current one. 0 keeps everything.
    pub max_backups: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            output: "stdout".to_string(),
            file_path: "/var/log/firmware-registry/app.log".to_string(),
            rotation: "daily".to_string(),
            max_backups: 3,
        }
    }
}

/// OIDC bearer-token authentication. Off by default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    pub enabled: bool,
    pub issuer_url: String,
    pub client_id: String,
    pub audience: String,
    pub admin_role: String,
    pub device_role: String,
    pub jwks_cache_sec: u64,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            issuer_url: String::new(),
            client_id: String::new(),
            audience: String::new(),
            admin_role: String::new(),
            device_role: String::new(),
            jwks_cache_sec: 300,
        }
    }
}

/// Outbound webhook delivery.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub secret: Option<String>,
    pub timeout_sec: u64,
    pub retries: u32,
    /// Size of the delivery worker pool. 0 spawns one task per delivery.
    pub max_concurrent: usize,
    pub shutdown_grace_sec: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            timeout_sec: 5,
            retries: 3,
            max_concurrent: 0,
            shutdown_grace_sec: 5,
        }
    }
}

impl Config {
    /// Load from `FW_CONFIG_FILE` and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key))
    }

    /// Load using a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn load_with<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let mut config = match reader("FW_CONFIG_FILE") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_env(reader);
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string. Missing keys take defaults.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `FW_*` overrides read through `reader`.
    pub fn apply_env<F>(&mut self, reader: F)
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let var = |key: &str| {
            reader(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = var("FW_LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Some(v) = var("FW_PUBLIC_BASE_URL") {
            self.public_base_url = v;
        }
        if let Some(v) = var("FW_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = var("FW_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = var("FW_ADMIN_KEY") {
            self.admin_key = Some(v);
        }
        if let Some(v) = var("FW_DEVICE_KEY") {
            self.device_key = Some(v);
        }
        if let Some(v) = var("FW_NOAUTH_IPS") {
            self.no_auth_ips = v;
        }
        if let Some(n) = var("FW_MAX_UPLOAD_MB").and_then(|v| v.parse::<u64>().ok()) {
            if n > 0 {
                self.max_upload_mb = n;
            }
        }

        if let Some(v) = var("FW_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = var("FW_LOG_FORMAT") {
            self.logging.format = v;
        }
        if let Some(v) = var("FW_LOG_OUTPUT") {
            self.logging.output = v;
        }
        if let Some(v) = var("FW_LOG_FILE_PATH") {
            self.logging.file_path = v;
        }
        if let Some(v) = var("FW_LOG_ROTATION") {
            self.logging.rotation = v;
        }
        if let Some(n) = var("FW_LOG_MAX_BACKUPS").and_then(|v| v.parse::<usize>().ok()) {
            self.logging.max_backups = n;
        }

        if let Some(v) = var("FW_OIDC_ENABLED") {
            self.oidc.enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = var("FW_OIDC_ISSUER_URL") {
            self.oidc.issuer_url = v;
        }
        if let Some(v) = var("FW_OIDC_CLIENT_ID") {
            self.oidc.client_id = v;
        }
        if let Some(v) = var("FW_OIDC_AUDIENCE") {
            self.oidc.audience = v;
        }
        if let Some(v) = var("FW_OIDC_ADMIN_ROLE") {
            self.oidc.admin_role = v;
        }
        if let Some(v) = var("FW_OIDC_DEVICE_ROLE") {
            self.oidc.device_role = v;
        }
        if let Some(n) = var("FW_OIDC_JWKS_CACHE_SEC").and_then(|v| v.parse::<u64>().ok()) {
            if n > 0 {
                self.oidc.jwks_cache_sec = n;
            }
        }

        if let Some(v) = var("FW_WEBHOOK_SECRET") {
            self.webhooks.secret = Some(v);
        }
        if let Some(n) = var("FW_WEBHOOK_TIMEOUT_SEC").and_then(|v| v.parse::<u64>().ok()) {
            if n > 0 {
                self.webhooks.timeout_sec = n;
            }
        }
        if let Some(n) = var("FW_WEBHOOK_RETRIES").and_then(|v| v.parse::<u32>().ok()) {
            self.webhooks.retries = n;
        }
        if let Some(n) = var("FW_WEBHOOK_MAX_CONCURRENT").and_then(|v| v.parse::<usize>().ok()) {
            self.webhooks.max_concurrent = n;
        }
        if let Some(n) = var("FW_WEBHOOK_SHUTDOWN_GRACE_SEC").and_then(|v| v.parse::<u64>().ok()) {
            self.webhooks.shutdown_grace_sec = n;
        }
    }

    /// The socket address to bind. A bare `:port` binds all interfaces.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = self.listen_addr.trim();
        let candidate = if raw.starts_with(':') {
            format!("0.0.0.0{raw}")
        } else {
            raw.to_string()
        };
        candidate
            .parse()
            .map_err(|e: std::net::AddrParseError| {
                ConfigError::InvalidValue("listen_addr".into(), e.to_string())
            })
    }

    /// Upload limit in bytes.
    #[must_use]
    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_upload_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }

    /// Access policy for the gate. OIDC parameters are included only when
    /// enabled with an issuer.
    #[must_use]
    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            admin_key: self.admin_key.clone(),
            device_key: self.device_key.clone(),
            allowlist: IpAllowlist::from_entries(self.no_auth_ips.split(',')),
            oidc: self.oidc_params(),
        }
    }

    #[must_use]
    pub fn oidc_params(&self) -> Option<OidcParams> {
        if !self.oidc.enabled || self.oidc.issuer_url.trim().is_empty() {
            return None;
        }
        let mut params = OidcParams::new(self.oidc.issuer_url.trim());
        params.client_id = self.oidc.client_id.clone();
        params.audience = self.oidc.audience.clone();
        params.admin_role = self.oidc.admin_role.clone();
        params.device_role = self.oidc.device_role.clone();
        params.key_cache_ttl = Duration::from_secs(self.oidc.jwks_cache_sec);
        Some(params)
    }

    #[must_use]
    pub fn delivery_settings(&self) -> DeliverySettings {
        DeliverySettings {
            secret: self.webhooks.secret.clone().filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(self.webhooks.timeout_sec.max(1)),
            max_retries: self.webhooks.retries,
            ..DeliverySettings::default()
        }
    }

    #[must_use]
    pub fn fan_out(&self) -> FanOut {
        match self.webhooks.max_concurrent {
            0 => FanOut::Unbounded,
            workers => {
                let workers = workers.min(MAX_WORKERS);
                FanOut::Bounded {
                    workers,
                    queue: workers.saturating_mul(64).min(MAX_QUEUE),
                }
            }
        }
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.webhooks.shutdown_grace_sec)
    }
}
