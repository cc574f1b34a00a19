//! Tenant-scoped secret retrieval backed by HashiCorp Vault.
//!
//! # Architecture
//!
//! ```text
//! SecretService ──► TypedCache (tenant → bundle)
//!       │
//!       └─ miss ──► SecretRepository
//!                     ├─ VaultSecretRepository ──► VaultTransport (vaultrs)
//!                     │        └─ RenewalSupervisor ──► LifetimeWatcher
//!                     └─ MockSecretRepository (JSON file / in-memory)
//! ```
//!
//! - [`SecretService`] serves typed, partial and struct-bound lookups and
//!   fetches each tenant's bundle at most once while it stays cached.
//! - [`VaultSecretRepository`] reads KV v2 bundles and keeps its AppRole token
//!   alive in the background, re-authenticating with backoff when renewal fails.
//! - [`MockSecretRepository`] serves fixed data for local development and tests.
//!
//! # Security
//!
//! Secret values never appear in logs or `Debug` output: [`SecretValue`],
//! [`SecretString`] and [`AuthToken`] all redact themselves.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tenant_secrets::secrets::SecretService;
//!
//! let service = Arc::new(SecretService::from_config(&config.vault).await?);
//!
//! let secrets = service.get_secrets("client1", &["ENV_1", "ENV_3"]).await?;
//! let flag = service.get_secret("client1", "ENV_2").await?;
//!
//! service.shutdown().await;
//! ```

pub mod binding;
pub mod cache;
pub mod error;
pub mod mock;
pub mod renewal;
pub mod repository;
pub mod service;
pub mod transport;
pub mod types;
pub mod vault;

pub use binding::bind;
pub use cache::TypedCache;
pub use error::{Result, SecretsError};
pub use mock::MockSecretRepository;
pub use renewal::{
    AppRoleCredentials, Backoff, LifetimeWatcher, RenewalHandle, RenewalPolicy, RenewalSupervisor,
    WatchEvent,
};
pub use repository::SecretRepository;
pub use service::{DatabaseSecrets, SecretService};
pub use transport::{AuthToken, TenantListing, VaultHttpTransport, VaultTransport};
pub use types::{SecretBundle, SecretString, SecretValue, TenantId};
pub use vault::VaultSecretRepository;
