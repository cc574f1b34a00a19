//! Tenant secret service with read-through caching.
//!
//! [`SecretService`] is what the rest of an application talks to. It keeps
//! one bundle per tenant in a [`TypedCache`] and goes to the repository only
//! on a miss:
//!
//! - the first call for a tenant fetches its bundle and caches it on success
//! - later calls are served from memory
//! - failures are returned to the caller and never cached
//! - concurrent misses for the same tenant share a single fetch
//!
//! Entries never expire unless a TTL is configured or they are invalidated
//! explicitly.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tenant_secrets::secrets::SecretService;
//!
//! let service = Arc::new(SecretService::from_config(&config.vault).await?);
//!
//! let host = service.get_secret_as_string("client1", "DATABASE_HOST").await?;
//! let db = service.get_database_config("client1").await?;
//! ```

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::Instrument;
use validator::{Validate, ValidationError};

use super::binding::bind;
use super::cache::TypedCache;
use super::error::{Result, SecretsError};
use super::mock::MockSecretRepository;
use super::repository::SecretRepository;
use super::types::{SecretBundle, SecretString, SecretValue, TenantId};
use super::vault::VaultSecretRepository;
use crate::config::VaultConfig;

/// A bundle together with the time it was fetched.
#[derive(Debug)]
struct CachedBundle {
    bundle: SecretBundle,
    fetched_at: Instant,
}

impl CachedBundle {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

/// Per-tenant fetch lock shared by concurrent misses.
///
/// The map entry is removed when the last slot for the tenant is dropped.
struct FetchSlot<'a> {
    in_flight: &'a DashMap<TenantId, Arc<Mutex<()>>>,
    tenant: &'a str,
    lock: Arc<Mutex<()>>,
}

impl<'a> FetchSlot<'a> {
    fn join(in_flight: &'a DashMap<TenantId, Arc<Mutex<()>>>, tenant: &'a str) -> Self {
        let lock = Arc::clone(in_flight.entry(tenant.to_string()).or_default().value());
        Self { in_flight, tenant, lock }
    }

    async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for FetchSlot<'_> {
    fn drop(&mut self) {
        // Release our handle first so the count only reflects the map and other slots.
        drop(std::mem::take(&mut self.lock));
        self.in_flight.remove_if(self.tenant, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Database connection secrets stored under the conventional keys.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseSecrets {
    #[serde(rename = "DATABASE_HOST")]
    #[validate(length(min = 1, message = "DATABASE_HOST is required"))]
    pub host: String,

    #[serde(rename = "DATABASE_NAME")]
    #[validate(length(min = 1, message = "DATABASE_NAME is required"))]
    pub name: String,

    #[serde(rename = "DATABASE_USER")]
    #[validate(length(min = 1, message = "DATABASE_USER is required"))]
    pub user: String,

    #[serde(rename = "DATABASE_PASS")]
    #[validate(custom(function = "validate_required_secret"))]
    pub password: SecretString,
}

fn validate_required_secret(value: &SecretString) -> std::result::Result<(), ValidationError> {
    if value.is_empty() {
        let mut error = ValidationError::new("required");
        error.message = Some("DATABASE_PASS is required".into());
        return Err(error);
    }
    Ok(())
}

/// Cached, tenant-scoped access to secrets.
///
/// Build one per process and share it as `Arc<SecretService>`.
#[derive(Debug)]
pub struct SecretService {
    repository: Arc<dyn SecretRepository>,
    cache: TypedCache<TenantId>,
    in_flight: DashMap<TenantId, Arc<Mutex<()>>>,
    cache_ttl: Option<Duration>,
}

impl SecretService {
    pub fn new(repository: Arc<dyn SecretRepository>) -> Self {
        Self {
            repository,
            cache: TypedCache::new(),
            in_flight: DashMap::new(),
            cache_ttl: None,
        }
    }

    /// Treat cached bundles older than `ttl` as misses.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Build the service described by `config`: the mock repository when
    /// `mock.enabled` is set, Vault otherwise.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::Config`] if the mock file is missing or malformed,
    ///   or the Vault client cannot be built
    /// - [`SecretsError::AuthenticationFailed`] if the first Vault login fails
    pub async fn from_config(config: &VaultConfig) -> Result<Self> {
        let repository: Arc<dyn SecretRepository> = if config.mock.enabled {
            tracing::info!(file = %config.mock.json_file, "Using mocked secrets repository");
            Arc::new(MockSecretRepository::from_json_file(&config.mock.json_file)?)
        } else {
            Arc::new(VaultSecretRepository::initialize(config).await?)
        };

        let service = Self::new(repository);
        Ok(match config.cache_ttl() {
            Some(ttl) => service.with_cache_ttl(ttl),
            None => service,
        })
    }

    /// Value of `key` for `tenant`, or `None` if the bundle has no such key.
    pub async fn get_secret(&self, tenant: &str, key: &str) -> Result<Option<SecretValue>> {
        let span = crate::tenant_span!("get_secret", tenant, key = %key);
        let cached = self.tenant_bundle(tenant).instrument(span).await?;
        Ok(cached.bundle.get(key).cloned())
    }

    /// String value of `key`, or `""` if the key is absent.
    ///
    /// # Errors
    ///
    /// [`SecretsError::TypeMismatch`] if the value exists but is not a string.
    pub async fn get_secret_as_string(&self, tenant: &str, key: &str) -> Result<String> {
        let span = crate::tenant_span!("get_secret_as_string", tenant, key = %key);
        let cached = self.tenant_bundle(tenant).instrument(span).await?;
        match cached.bundle.get(key) {
            None => Ok(String::new()),
            Some(SecretValue::String(value)) => Ok(value.clone()),
            Some(other) => Err(SecretsError::type_mismatch(key, "string", other.kind())),
        }
    }

    /// The requested keys that exist in the tenant's bundle. Absent keys are omitted.
    pub async fn get_secrets<S: AsRef<str>>(
        &self,
        tenant: &str,
        keys: &[S],
    ) -> Result<HashMap<String, SecretValue>> {
        let span = crate::tenant_span!("get_secrets", tenant, keys = keys.len());
        let cached = self.tenant_bundle(tenant).instrument(span).await?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                let key = key.as_ref();
                cached.bundle.get(key).map(|value| (key.to_string(), value.clone()))
            })
            .collect())
    }

    /// Every secret of `tenant`.
    pub async fn get_bundle(&self, tenant: &str) -> Result<SecretBundle> {
        let span = crate::tenant_span!("get_bundle", tenant);
        let cached = self.tenant_bundle(tenant).instrument(span).await?;
        Ok(cached.bundle.clone())
    }

    /// Bind the whole bundle onto `T` and validate it.
    ///
    /// `T` should carry `#[serde(default)]` so fields missing from the bundle
    /// keep their defaults and are then caught by validation.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::Binding`] if a value cannot be coerced to its field type
    /// - [`SecretsError::Validation`] if the bound value fails validation
    pub async fn read_secrets<T>(&self, tenant: &str) -> Result<T>
    where
        T: DeserializeOwned + Validate,
    {
        let span = crate::tenant_span!("read_secrets", tenant);
        let cached = self.tenant_bundle(tenant).instrument(span).await?;
        let value: T = bind(&cached.bundle)?;
        value.validate()?;
        Ok(value)
    }

    /// Database connection secrets of `tenant`. All four keys are required.
    pub async fn get_database_config(&self, tenant: &str) -> Result<DatabaseSecrets> {
        self.read_secrets(tenant).await
    }

    /// Tenants known to the repository.
    pub async fn list(&self) -> Result<Vec<TenantId>> {
        self.repository.list_tenants().await
    }

    /// Drop the cached bundle of `tenant`. Returns whether one was cached.
    pub fn invalidate(&self, tenant: &str) -> bool {
        let removed = self.cache.remove(tenant);
        if removed {
            tracing::debug!(tenant = %tenant, "Invalidated cached secrets");
        }
        removed
    }

    /// Drop every cached bundle.
    pub fn invalidate_all(&self) {
        let count = self.cache.len();
        self.cache.clear();
        self.in_flight.retain(|_, lock| Arc::strong_count(lock) > 1);
        tracing::debug!(count, "Invalidated all cached secrets");
    }

    /// Stop the repository's background work.
    pub async fn shutdown(&self) {
        self.repository.shutdown().await;
    }

    fn cached(&self, tenant: &str) -> Option<Arc<CachedBundle>> {
        let cached = self.cache.load::<CachedBundle, _>(tenant)?;
        match self.cache_ttl {
            Some(ttl) if cached.is_expired(ttl) => {
                tracing::debug!(tenant = %tenant, "Cached secrets expired");
                None
            }
            _ => Some(cached),
        }
    }

    async fn tenant_bundle(&self, tenant: &str) -> Result<Arc<CachedBundle>> {
        if let Some(cached) = self.cached(tenant) {
            tracing::debug!(tenant = %tenant, "Cache hit for tenant secrets");
            return Ok(cached);
        }

        let slot = FetchSlot::join(&self.in_flight, tenant);
        let _guard = slot.lock().await;

        if let Some(cached) = self.cached(tenant) {
            tracing::debug!(tenant = %tenant, "Tenant secrets populated by a concurrent fetch");
            return Ok(cached);
        }

        tracing::debug!(
            tenant = %tenant,
            "Cache miss for tenant secrets, fetching from repository"
        );
        let bundle = self.repository.fetch_bundle(tenant).await.map_err(|e| {
            if e.is_backend_failure() {
                tracing::warn!(tenant = %tenant, error = %e, "Failed to fetch tenant secrets");
            } else {
                tracing::error!(tenant = %tenant, error = %e, "Failed to fetch tenant secrets");
            }
            e
        })?;

        let cached = Arc::new(CachedBundle { bundle, fetched_at: Instant::now() });
        self.cache.store_shared(tenant.to_string(), Arc::clone(&cached));
        Ok(cached)
    }
}
