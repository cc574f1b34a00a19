//! # tenant-secrets
//!
//! Tenant-scoped secret retrieval in front of HashiCorp Vault. Each tenant's
//! secrets are fetched once as a bundle and served from memory afterwards,
//! while a background supervisor keeps the Vault token renewed and logs in
//! again whenever renewal fails.
//!
//! ## Architecture
//!
//! ```text
//! callers → SecretService → TypedCache
//!                 ↓ (miss)
//!           SecretRepository → Vault KV v2 / mock JSON
//!                 ↑
//!           RenewalSupervisor (AppRole login, renew-self, backoff)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tenant_secrets::{AppConfig, Result, SecretService};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::from_env()?;
//!     config.validate()?;
//!
//!     let service = Arc::new(SecretService::from_config(&config.vault).await?);
//!     let host = service.get_secret_as_string("client1", "DATABASE_HOST").await?;
//!     println!("{host}");
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod observability;
pub mod secrets;

// Re-export commonly used types and traits
pub use config::{AppConfig, ObservabilityConfig, VaultConfig};
pub use errors::{Error, Result};
pub use observability::{init_tracing, shutdown_tracing};
pub use secrets::{SecretRepository, SecretService, SecretValue, SecretsError};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
