//! # Configuration Management
//!
//! Configuration is read from an optional file (YAML, TOML or JSON, picked by
//! extension) and then overlaid with environment variables:
//!
//! ```text
//! TENANT_SECRETS__VAULT__ROLE_ID=...        -> vault.role_id
//! TENANT_SECRETS__VAULT__MOCK__ENABLED=true -> vault.mock.enabled
//! TENANT_SECRETS__OBSERVABILITY__LOG_LEVEL  -> observability.log_level
//! ```
//!
//! Loading does not validate; call [`AppConfig::validate`] before use.

mod settings;

pub use settings::{AppConfig, ObservabilityConfig, RenewalConfig, VaultConfig, VaultMockConfig};

use crate::errors::{Error, Result};
use std::path::Path;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "TENANT_SECRETS";

/// Separator between the prefix and nested keys in environment overrides
pub const ENV_SEPARATOR: &str = "__";

impl AppConfig {
    /// Load configuration from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR),
        );

        let settings = builder.build()?;
        let config: AppConfig = settings.try_deserialize()?;

        tracing::debug!(mock = config.vault.mock.enabled, "Configuration loaded");
        Ok(config)
    }

    /// Load configuration from the environment only.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }
}
