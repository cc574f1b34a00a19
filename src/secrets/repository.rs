//! Repository contract for tenant secret bundles.

use async_trait::async_trait;
use std::collections::HashMap;

use super::error::{Result, SecretsError};
use super::types::{SecretBundle, SecretValue, TenantId};

/// Source of tenant secret bundles.
///
/// Implementations fetch one tenant's full bundle per call and do no caching
/// of their own; [`SecretService`](super::SecretService) sits in front of them.
///
/// # Security Considerations
///
/// - Implementations MUST NOT log secret values
/// - Errors may name tenants and keys, never values
#[async_trait]
pub trait SecretRepository: Send + Sync + std::fmt::Debug {
    /// Fetch every secret of `tenant`.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::NotFound`] if the tenant has no bundle
    /// - [`SecretsError::Backend`] if the backend call fails or the data is malformed
    async fn fetch_bundle(&self, tenant: &str) -> Result<SecretBundle>;

    /// List the tenants that have bundles. Order is unspecified.
    async fn list_tenants(&self) -> Result<Vec<TenantId>>;

    /// Release background resources. The default does nothing.
    async fn shutdown(&self) {}
}

/// Convert raw backend data into a bundle, rejecting non-scalar values.
pub(crate) fn bundle_from_json(
    tenant: &str,
    data: HashMap<String, serde_json::Value>,
) -> Result<SecretBundle> {
    data.into_iter()
        .map(|(key, value)| match SecretValue::from_json(value) {
            Some(value) => Ok((key, value)),
            None => Err(SecretsError::backend(format!(
                "Secret '{}' of tenant '{}' is not a string, bool or number",
                key, tenant
            ))),
        })
        .collect()
}
