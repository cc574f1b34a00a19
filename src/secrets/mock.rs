//! In-memory repository for development and tests.
//!
//! Serves fixed bundles from a map or a JSON file shaped like
//! `{"<tenant>": {"<KEY>": "string" | true | 5}}` and counts fetches per tenant.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::error::{Result, SecretsError};
use super::repository::SecretRepository;
use super::types::{SecretBundle, TenantId};

/// Deterministic [`SecretRepository`] that never talks to a backend.
#[derive(Debug, Default)]
pub struct MockSecretRepository {
    data: HashMap<TenantId, SecretBundle>,
    calls: DashMap<TenantId, usize>,
    latency: Option<Duration>,
}

impl MockSecretRepository {
    pub fn new(data: HashMap<TenantId, SecretBundle>) -> Self {
        Self { data, calls: DashMap::new(), latency: None }
    }

    /// Load bundles from a JSON file.
    ///
    /// # Errors
    ///
    /// [`SecretsError::Config`] if the path is empty, unreadable, or not in
    /// the expected shape.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(SecretsError::config("mocked json file name not provided"));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            SecretsError::config(format!(
                "Unable to read mocked secrets file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let data: HashMap<TenantId, SecretBundle> = serde_json::from_str(&contents).map_err(|e| {
            SecretsError::config(format!(
                "Malformed mocked secrets file '{}': {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %path.display(), tenants = data.len(), "Loaded mocked secrets");
        Ok(Self::new(data))
    }

    /// Delay every fetch by `latency` to simulate a backend round trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of fetches made for `tenant`, including failed ones.
    pub fn call_count(&self, tenant: &str) -> usize {
        self.calls.get(tenant).map(|count| *count).unwrap_or(0)
    }
}

#[async_trait]
impl SecretRepository for MockSecretRepository {
    async fn fetch_bundle(&self, tenant: &str) -> Result<SecretBundle> {
        *self.calls.entry(tenant.to_string()).or_insert(0) += 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.data
            .get(tenant)
            .cloned()
            .ok_or_else(|| SecretsError::not_found(format!("no secrets for tenant {}", tenant)))
    }

    async fn list_tenants(&self) -> Result<Vec<TenantId>> {
        Ok(self.data.keys().cloned().collect())
    }
}
