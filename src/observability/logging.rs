//! # Structured Logging
//!
//! Span helpers and startup logging. Spans carry tenant and key names only,
//! never secret values.

/// Create a tracing span for a tenant secret lookup.
///
/// ```rust,ignore
/// let span = tenant_span!("get_secret", "client1");
/// let span = tenant_span!("get_secrets", "client1", keys = 3);
/// ```
#[macro_export]
macro_rules! tenant_span {
    ($operation:expr, $tenant:expr) => {
        tracing::debug_span!(
            "tenant_secrets",
            operation = %$operation,
            tenant = %$tenant
        )
    };
    ($operation:expr, $tenant:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "tenant_secrets",
            operation = %$operation,
            tenant = %$tenant,
            $($field)*
        )
    };
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    let vault = &config.vault;
    tracing::info!(
        backend = if vault.mock.enabled { "mock" } else { "vault" },
        vault_url = %vault.url,
        mount_path = %vault.mount_path,
        cache_ttl_seconds = ?vault.cache_ttl_seconds,
        renewal_increment_seconds = vault.renewal.increment_seconds,
        otlp_enabled = config.observability.otlp_endpoint.is_some(),
        "Tenant secrets configuration"
    );
}
