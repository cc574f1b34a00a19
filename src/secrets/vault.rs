//! HashiCorp Vault repository.
//!
//! Reads tenant bundles from a KV v2 mount, one secret path per tenant, and
//! keeps its AppRole token alive through a background [`RenewalSupervisor`].
//!
//! # Layout
//!
//! ```text
//! <mount>/data/<tenant>      -> {"DATABASE_HOST": "...", "FEATURE_X": true, ...}
//! <mount>/metadata           -> [tenant, ...]
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tenant_secrets::config::VaultConfig;
//! use tenant_secrets::secrets::{SecretRepository, VaultSecretRepository};
//!
//! let repository = VaultSecretRepository::initialize(&config).await?;
//! let bundle = repository.fetch_bundle("client1").await?;
//!
//! repository.shutdown().await;
//! ```

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use super::error::{Result, SecretsError};
use super::renewal::{AppRoleCredentials, RenewalHandle, RenewalPolicy, RenewalSupervisor};
use super::repository::{bundle_from_json, SecretRepository};
use super::transport::{TenantListing, VaultHttpTransport, VaultTransport};
use super::types::{SecretBundle, TenantId};
use crate::config::VaultConfig;

/// [`SecretRepository`] backed by Vault KV v2.
///
/// Construction performs the first login; a value of this type always had a
/// valid token at some point. Dropping it stops the renewal supervisor.
pub struct VaultSecretRepository<T: VaultTransport + ?Sized = VaultHttpTransport> {
    transport: Arc<T>,
    mount_path: String,
    renewal: RenewalHandle,
}

impl VaultSecretRepository<VaultHttpTransport> {
    /// Build the HTTP client, log in, and start the renewal supervisor.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::Config`] if the CA certificate or client settings are unusable
    /// - [`SecretsError::AuthenticationFailed`] if the first login fails
    pub async fn initialize(config: &VaultConfig) -> Result<Self> {
        let transport = VaultHttpTransport::new(config)?;
        let address = transport.address().to_string();
        let repository = Self::with_transport(
            Arc::new(transport),
            config.credentials(),
            config.mount_path.clone(),
            config.renewal.policy(),
        )
        .await?;

        tracing::info!(
            address = %address,
            mount_path = %repository.mount_path(),
            "Connected to Vault"
        );
        Ok(repository)
    }
}

impl<T: VaultTransport + ?Sized> VaultSecretRepository<T> {
    /// Log in through `transport` and start supervising the token.
    pub async fn with_transport(
        transport: Arc<T>,
        credentials: AppRoleCredentials,
        mount_path: impl Into<String>,
        policy: RenewalPolicy,
    ) -> Result<Self> {
        let token = credentials.login(transport.as_ref()).await.map_err(|e| {
            tracing::error!(
                error = %e,
                role_id = %credentials.role_id,
                "Initial Vault login failed"
            );
            match e {
                SecretsError::AuthenticationFailed { .. } => e,
                other => SecretsError::authentication_failed(format!(
                    "unable to login to Vault: {}",
                    other
                )),
            }
        })?;

        let supervisor = RenewalSupervisor::new(Arc::clone(&transport), credentials, policy);
        let renewal = supervisor.spawn(token);

        Ok(Self { transport, mount_path: mount_path.into(), renewal })
    }

    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    /// Stop the renewal supervisor and wait for it to exit.
    pub async fn shutdown(&self) {
        self.renewal.shutdown().await;
    }
}

impl<T: VaultTransport + ?Sized> fmt::Debug for VaultSecretRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSecretRepository")
            .field("mount_path", &self.mount_path)
            .field("renewal_cancelled", &self.renewal.is_cancelled())
            .finish()
    }
}

#[async_trait]
impl<T: VaultTransport + ?Sized> SecretRepository for VaultSecretRepository<T> {
    async fn fetch_bundle(&self, tenant: &str) -> Result<SecretBundle> {
        let data = self.transport.read_bundle(&self.mount_path, tenant).await.map_err(|e| {
            tracing::error!(
                error = %e,
                tenant = %tenant,
                "Failed to read tenant secrets from Vault"
            );
            e
        })?;

        bundle_from_json(tenant, data)
    }

    async fn list_tenants(&self) -> Result<Vec<TenantId>> {
        match self.transport.list_tenants(&self.mount_path).await? {
            TenantListing::Keys(keys) => Ok(keys),
            TenantListing::Empty { warnings } => {
                let message = if warnings.is_empty() {
                    format!("no tenants found under mount '{}'", self.mount_path)
                } else {
                    warnings.join("; ")
                };
                tracing::warn!(
                    mount_path = %self.mount_path,
                    "Vault returned no data for tenant listing"
                );
                Err(SecretsError::backend(message))
            }
        }
    }

    async fn shutdown(&self) {
        self.renewal.shutdown().await;
    }
}
