//! Capability client for the Vault HTTP API.
//!
//! [`VaultTransport`] is the narrow set of Vault calls the repository and the
//! renewal supervisor need: AppRole login, self-renewal, KV v2 read and list.
//! [`VaultHttpTransport`] implements it on top of `vaultrs`; tests substitute
//! a scripted transport to drive the renewal state machine deterministically.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use vaultrs::api::AuthInfo;
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;

use super::error::{Result, SecretsError};
use super::types::SecretString;
use crate::config::VaultConfig;

/// Authentication state returned by a login or a renewal.
#[derive(Clone)]
pub struct AuthToken {
    client_token: SecretString,
    accessor: String,
    lease_duration: Duration,
    renewable: bool,
    policies: Vec<String>,
}

impl AuthToken {
    pub fn new(
        client_token: impl Into<SecretString>,
        lease_duration: Duration,
        renewable: bool,
    ) -> Self {
        Self {
            client_token: client_token.into(),
            accessor: String::new(),
            lease_duration,
            renewable,
            policies: Vec::new(),
        }
    }

    pub fn client_token(&self) -> &SecretString {
        &self.client_token
    }

    pub fn accessor(&self) -> &str {
        &self.accessor
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    pub fn renewable(&self) -> bool {
        self.renewable
    }

    pub fn policies(&self) -> &[String] {
        &self.policies
    }

    /// Point in the lease at which the token should be renewed or replaced (80%).
    pub fn renew_after(&self) -> Duration {
        self.lease_duration * 4 / 5
    }
}

impl From<AuthInfo> for AuthToken {
    fn from(auth: AuthInfo) -> Self {
        Self {
            client_token: SecretString::new(auth.client_token),
            accessor: auth.accessor,
            lease_duration: Duration::from_secs(auth.lease_duration),
            renewable: auth.renewable,
            policies: auth.policies,
        }
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("client_token", &self.client_token)
            .field("accessor", &self.accessor)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .field("policies", &self.policies)
            .finish()
    }
}

/// Outcome of listing the tenant paths under a KV mount.
#[derive(Debug, Clone, PartialEq)]
pub enum TenantListing {
    Keys(Vec<String>),
    /// Vault answered without data; carries whatever warnings it reported.
    Empty { warnings: Vec<String> },
}

/// The Vault operations used by this crate.
#[async_trait]
pub trait VaultTransport: Send + Sync + 'static {
    /// AppRole login. On success the returned token is installed on the transport.
    async fn login(&self, auth_mount: &str, role_id: &str, secret_id: &str) -> Result<AuthToken>;

    /// Renew the currently installed token by `increment`.
    async fn renew_self(&self, increment: Duration) -> Result<AuthToken>;

    /// Read the latest version of `<mount>/data/<tenant>`.
    async fn read_bundle(
        &self,
        mount: &str,
        tenant: &str,
    ) -> Result<HashMap<String, serde_json::Value>>;

    /// List `<mount>/metadata`.
    async fn list_tenants(&self, mount: &str) -> Result<TenantListing>;
}

/// [`VaultTransport`] backed by a `vaultrs` client.
///
/// The client sits behind a lock because installing a token needs `&mut`;
/// every other call only reads it.
pub struct VaultHttpTransport {
    client: RwLock<VaultClient>,
    address: String,
}

impl VaultHttpTransport {
    /// Build a client for `config.url` that trusts the PEM bundle at `config.cert`.
    ///
    /// # Errors
    ///
    /// [`SecretsError::Config`] if the certificate cannot be read or is empty,
    /// or if the client settings are rejected.
    pub fn new(config: &VaultConfig) -> Result<Self> {
        let pem = std::fs::read_to_string(&config.cert).map_err(|e| {
            SecretsError::config(format!(
                "Unable to read Vault CA certificate '{}': {}",
                config.cert, e
            ))
        })?;
        if pem.trim().is_empty() {
            return Err(SecretsError::config(format!(
                "Vault CA certificate '{}' is empty",
                config.cert
            )));
        }

        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.url);
        settings_builder.ca_certs(vec![config.cert.clone()]);
        if let Some(timeout) = config.timeout() {
            settings_builder.timeout(Some(timeout));
        }

        let settings = settings_builder
            .build()
            .map_err(|e| SecretsError::config(format!("Invalid Vault configuration: {}", e)))?;

        let client = VaultClient::new(settings)
            .map_err(|e| SecretsError::config(format!("Failed to create Vault client: {}", e)))?;

        Ok(Self { client: RwLock::new(client), address: config.url.clone() })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Debug for VaultHttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultHttpTransport")
            .field("address", &self.address)
            .field("client", &"[VaultClient]")
            .finish()
    }
}

#[async_trait]
impl VaultTransport for VaultHttpTransport {
    async fn login(&self, auth_mount: &str, role_id: &str, secret_id: &str) -> Result<AuthToken> {
        let auth = {
            let client = self.client.read().await;
            vaultrs::auth::approle::login(&*client, auth_mount, role_id, secret_id)
                .await
                .map_err(|e| {
                    SecretsError::authentication_failed(format!("AppRole login failed: {}", e))
                })?
        };

        if auth.client_token.is_empty() {
            return Err(SecretsError::authentication_failed(
                "no auth info was returned after login",
            ));
        }

        self.client.write().await.set_token(&auth.client_token);
        Ok(AuthToken::from(auth))
    }

    async fn renew_self(&self, increment: Duration) -> Result<AuthToken> {
        let increment = format!("{}s", increment.as_secs());
        let client = self.client.read().await;
        vaultrs::token::renew_self(&*client, Some(increment.as_str()))
            .await
            .map(AuthToken::from)
            .map_err(|e| SecretsError::backend(format!("Token renewal failed: {}", e)))
    }

    async fn read_bundle(
        &self,
        mount: &str,
        tenant: &str,
    ) -> Result<HashMap<String, serde_json::Value>> {
        let client = self.client.read().await;
        vaultrs::kv2::read(&*client, mount, tenant).await.map_err(|e| match e {
            ClientError::APIError { code: 404, .. } => {
                SecretsError::not_found(format!("no secrets for tenant {}", tenant))
            }
            other => SecretsError::backend(format!(
                "Failed to read secrets for tenant '{}': {}",
                tenant, other
            )),
        })
    }

    async fn list_tenants(&self, mount: &str) -> Result<TenantListing> {
        let client = self.client.read().await;
        match vaultrs::kv2::list(&*client, mount, "").await {
            Ok(keys) => Ok(TenantListing::Keys(keys)),
            Err(ClientError::APIError { code: 404, errors }) => {
                Ok(TenantListing::Empty { warnings: errors })
            }
            Err(e) => Err(SecretsError::backend(format!(
                "Failed to list tenants under '{}': {}",
                mount, e
            ))),
        }
    }
}
