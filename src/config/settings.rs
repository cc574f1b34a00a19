//! # Configuration Settings
//!
//! Defines the configuration structure for the tenant secret service.

use crate::errors::{Error, Result};
use crate::secrets::{AppRoleCredentials, RenewalPolicy, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Secret backend configuration
    #[validate(nested)]
    pub vault: VaultConfig,

    /// Logging and tracing configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.vault.validate_mode()?;
        Ok(())
    }
}

/// Vault connection, authentication and caching configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct VaultConfig {
    /// AppRole role ID
    pub role_id: String,

    /// AppRole secret ID
    pub secret_id: SecretString,

    /// Vault server address, e.g. `https://vault.internal:8200`
    pub url: String,

    /// KV v2 mount holding one secret path per tenant
    #[validate(length(min = 1, message = "Mount path cannot be empty"))]
    pub mount_path: String,

    /// Mount path of the AppRole auth method
    #[validate(length(min = 1, message = "Auth mount cannot be empty"))]
    pub auth_mount: String,

    /// Path to the PEM CA bundle used to verify the Vault server
    pub cert: String,

    /// HTTP timeout for Vault requests, in seconds
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub timeout_seconds: Option<u64>,

    /// Expire cached tenant bundles after this many seconds. Unset means never.
    #[validate(range(min = 1, message = "Cache TTL must be at least 1 second"))]
    pub cache_ttl_seconds: Option<u64>,

    /// Token renewal and re-authentication timing
    #[validate(nested)]
    pub renewal: RenewalConfig,

    /// Serve secrets from a local JSON file instead of Vault
    pub mock: VaultMockConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            role_id: String::new(),
            secret_id: SecretString::default(),
            url: String::new(),
            mount_path: "secret".to_string(),
            auth_mount: "approle".to_string(),
            cert: String::new(),
            timeout_seconds: None,
            cache_ttl_seconds: None,
            renewal: RenewalConfig::default(),
            mock: VaultMockConfig::default(),
        }
    }
}

impl VaultConfig {
    /// Get the request timeout as Duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }

    /// Get the cache TTL as Duration
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_seconds.map(Duration::from_secs)
    }

    /// AppRole credentials for login
    pub fn credentials(&self) -> AppRoleCredentials {
        AppRoleCredentials::new(self.role_id.clone(), self.secret_id.clone())
            .with_auth_mount(self.auth_mount.clone())
    }

    /// Checks that depend on whether the mock repository is enabled
    fn validate_mode(&self) -> Result<()> {
        if self.mock.enabled {
            if self.mock.json_file.trim().is_empty() {
                return Err(Error::validation_field(
                    "Mock file must be set when the mock repository is enabled",
                    "vault.mock.json_file",
                ));
            }
            return Ok(());
        }

        let required = [
            ("vault.role_id", self.role_id.is_empty()),
            ("vault.secret_id", self.secret_id.is_empty()),
            ("vault.url", self.url.is_empty()),
            ("vault.cert", self.cert.is_empty()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, missing)| *missing) {
            return Err(Error::validation_field(
                format!("{} is required when using Vault", field),
                *field,
            ));
        }

        if !self.url.starts_with("https://") && !self.url.starts_with("http://") {
            return Err(Error::validation_field(
                "Vault URL must start with 'https://' or 'http://'",
                "vault.url",
            ));
        }

        Ok(())
    }
}

/// Token renewal and login retry timing
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RenewalConfig {
    /// Lease extension requested on each renewal, in seconds
    #[validate(range(min = 1, message = "Renewal increment must be at least 1 second"))]
    pub increment_seconds: u64,

    /// Renewed leases shorter than this are treated as expired, in seconds
    pub min_lease_seconds: u64,

    /// First login retry delay, in milliseconds
    #[validate(range(min = 1, message = "Initial backoff must be at least 1ms"))]
    pub initial_backoff_ms: u64,

    /// Upper bound for the login retry delay, in seconds
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Max backoff must be between 1 and 3600 seconds"
    ))]
    pub max_backoff_seconds: u64,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        let policy = RenewalPolicy::default();
        Self {
            increment_seconds: policy.increment.as_secs(),
            min_lease_seconds: policy.min_lease.as_secs(),
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_seconds: policy.max_backoff.as_secs(),
        }
    }
}

impl RenewalConfig {
    pub fn policy(&self) -> RenewalPolicy {
        RenewalPolicy {
            increment: Duration::from_secs(self.increment_seconds),
            min_lease: Duration::from_secs(self.min_lease_seconds),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_secs(self.max_backoff_seconds),
        }
    }
}

/// Mock repository settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VaultMockConfig {
    pub enabled: bool,

    /// JSON file shaped like `{"<tenant>": {"<KEY>": value}}`
    pub json_file: String,
}

/// Logging and tracing configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing service name
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// OTLP gRPC collector endpoint. Spans are only exported when set.
    pub otlp_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: crate::APP_NAME.to_string(),
            log_level: "info".to_string(),
            json_logging: false,
            otlp_endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_config() -> AppConfig {
        AppConfig {
            vault: VaultConfig {
                role_id: "role".to_string(),
                secret_id: SecretString::new("secret"),
                url: "https://vault.internal:8200".to_string(),
                cert: "/etc/vault/ca.pem".to_string(),
                ..VaultConfig::default()
            },
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_live_config_validation() {
        assert!(live_config().validate().is_ok());
    }

    #[test]
    fn test_default_config_requires_credentials() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(matches!(
            err,
            Error::Validation { field: Some(ref f), .. } if f == "vault.role_id"
        ));
    }

    #[test]
    fn test_mock_mode_requires_file() {
        let mut config = AppConfig::default();
        config.vault.mock.enabled = true;
        assert!(config.validate().is_err());

        config.vault.mock.json_file = "secrets.json".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_url_scheme() {
        let mut config = live_config();
        config.vault.url = "vault.internal:8200".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must start with"));
    }

    #[test]
    fn test_range_validation() {
        let mut config = live_config();
        config.vault.timeout_seconds = Some(0);
        assert!(config.validate().is_err());

        let mut config = live_config();
        config.vault.renewal.max_backoff_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = live_config();
        config.observability.log_level = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_renewal_policy_defaults() {
        let policy = RenewalConfig::default().policy();
        assert_eq!(policy, RenewalPolicy::default());
        assert_eq!(policy.increment, Duration::from_secs(3600));
        assert_eq!(policy.initial_backoff, Duration::from_millis(500));
    }

    #[test]
    fn test_durations() {
        let mut config = VaultConfig::default();
        assert_eq!(config.timeout(), None);
        assert_eq!(config.cache_ttl(), None);

        config.timeout_seconds = Some(10);
        config.cache_ttl_seconds = Some(300);
        assert_eq!(config.timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.cache_ttl(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_credentials_use_auth_mount() {
        let mut config = live_config().vault;
        config.auth_mount = "approle-tenants".to_string();

        let credentials = config.credentials();
        assert_eq!(credentials.auth_mount, "approle-tenants");
        assert_eq!(credentials.role_id, "role");
        assert_eq!(credentials.secret_id.expose_secret(), "secret");
    }

    #[test]
    fn test_debug_redacts_secret_id() {
        let debug = format!("{:?}", live_config());
        assert!(!debug.contains("secret_id: SecretString(\"secret\")"));
        assert!(debug.contains("[REDACTED]"));
    }
}
