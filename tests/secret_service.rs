//! Integration tests for the tenant secret service over the mock repository.

use async_trait::async_trait;
use proptest::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenant_secrets::config::VaultConfig;
use tenant_secrets::secrets::{
    MockSecretRepository, SecretBundle, SecretRepository, SecretService, SecretValue,
    SecretsError, TenantId,
};
use validator::Validate;

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/mock_secrets.json");

fn fixture_service() -> (Arc<MockSecretRepository>, SecretService) {
    let repo = Arc::new(MockSecretRepository::from_json_file(FIXTURE).expect("fixture loads"));
    let service = SecretService::new(repo.clone());
    (repo, service)
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Validate)]
#[serde(default)]
struct SomeSecrets {
    #[serde(rename = "ENV_1")]
    #[validate(length(min = 1, message = "ENV_1 is required"))]
    env1: String,
    #[serde(rename = "ENV_2")]
    env2: bool,
    #[serde(rename = "ENV_3")]
    env3: String,
    #[serde(rename = "ENV_4")]
    env4: i64,
}

#[tokio::test]
async fn get_secret_returns_exact_value() {
    let (_, service) = fixture_service();

    let value = service.get_secret("client1", "ENV_1").await.unwrap();
    assert_eq!(value, Some(SecretValue::from("val 1")));

    let value = service.get_secret("client2", "OTHER_VAR").await.unwrap();
    assert_eq!(value, Some(SecretValue::from("value")));
}

#[tokio::test]
async fn get_secret_absent_key_is_none() {
    let (_, service) = fixture_service();
    assert_eq!(service.get_secret("client1", "DOES_NOT_EXIST").await.unwrap(), None);
}

#[tokio::test]
async fn get_secret_as_string() {
    let (_, service) = fixture_service();

    assert_eq!(service.get_secret_as_string("client2", "VAR").await.unwrap(), "value");
    assert_eq!(service.get_secret_as_string("client2", "MISSING").await.unwrap(), "");

    let err = service.get_secret_as_string("client4", "MAX_CONNECTIONS").await.unwrap_err();
    assert!(matches!(err, SecretsError::TypeMismatch { found: "number", .. }));
}

#[tokio::test]
async fn get_secrets_returns_requested_subset() {
    let (_, service) = fixture_service();

    let secrets = service.get_secrets("client1", &["ENV_1", "ENV_3", "ENV_9"]).await.unwrap();
    assert_eq!(secrets.len(), 2);
    assert_eq!(secrets["ENV_1"], SecretValue::from("val 1"));
    assert_eq!(secrets["ENV_3"], SecretValue::from("val 2"));
    assert!(!secrets.contains_key("ENV_9"));
}

#[tokio::test]
async fn bundle_is_fetched_once_per_tenant() {
    let (repo, service) = fixture_service();

    service.get_secret("client1", "ENV_1").await.unwrap();
    service.get_secret_as_string("client1", "ENV_3").await.unwrap();
    service.get_secrets("client1", &["ENV_2"]).await.unwrap();
    service.read_secrets::<SomeSecrets>("client1").await.unwrap();
    service.get_secret("client2", "VAR").await.unwrap();

    assert_eq!(repo.call_count("client1"), 1);
    assert_eq!(repo.call_count("client2"), 1);
}

#[tokio::test]
async fn read_secrets_coerces_and_is_idempotent() {
    let (repo, service) = fixture_service();

    let first: SomeSecrets = service.read_secrets("client1").await.unwrap();
    let second: SomeSecrets = service.read_secrets("client1").await.unwrap();

    let expected =
        SomeSecrets { env1: "val 1".into(), env2: true, env3: "val 2".into(), env4: 5 };
    assert_eq!(first, expected);
    assert_eq!(first, second);
    assert_eq!(repo.call_count("client1"), 1);
}

#[tokio::test]
async fn read_secrets_leaves_missing_optional_values_at_default() {
    let (_, service) = fixture_service();

    let secrets: SomeSecrets = service.read_secrets("client4").await.unwrap();
    assert_eq!(secrets.env1, "value");
    assert!(!secrets.env2, "empty string binds to false");
    assert_eq!(secrets.env3, "");
    assert_eq!(secrets.env4, 0);
}

#[tokio::test]
async fn read_secrets_missing_required_value_fails_validation() {
    let (_, service) = fixture_service();

    let err = service.read_secrets::<SomeSecrets>("client2").await.unwrap_err();
    assert!(matches!(err, SecretsError::Validation(_)));
    assert!(err.to_string().contains("ENV_1 is required"));
}

#[tokio::test]
async fn read_secrets_into_native_types() {
    #[derive(Debug, Default, Deserialize, Validate)]
    #[serde(default)]
    struct Limits {
        #[serde(rename = "FEATURE_ENABLED")]
        feature_enabled: bool,
        #[serde(rename = "MAX_CONNECTIONS")]
        #[validate(range(min = 1, max = 100))]
        max_connections: u32,
    }

    let (_, service) = fixture_service();
    let limits: Limits = service.read_secrets("client4").await.unwrap();
    assert!(limits.feature_enabled);
    assert_eq!(limits.max_connections, 25);
}

#[tokio::test]
async fn database_config() {
    let (_, service) = fixture_service();

    let db = service.get_database_config("client4").await.unwrap();
    assert_eq!(db.host, "db.internal");
    assert_eq!(db.password.expose_secret(), "hunter2");

    let err = service.get_database_config("client1").await.unwrap_err();
    assert!(matches!(err, SecretsError::Validation(_)));
}

#[tokio::test]
async fn unknown_tenant_is_an_error() {
    let (_, service) = fixture_service();

    let err = service.get_secret("client3", "ENV_1").await.unwrap_err();
    assert!(matches!(err, SecretsError::NotFound { .. }));
    assert!(err.to_string().contains("client3"));

    assert!(service.get_secrets("client3", &["ENV_1"]).await.is_err());
    assert!(service.read_secrets::<SomeSecrets>("client3").await.is_err());
}

#[tokio::test]
async fn failed_fetch_is_not_cached() {
    let (repo, service) = fixture_service();

    assert!(service.get_secret("client3", "ENV_1").await.is_err());
    assert!(service.get_secret("client3", "ENV_1").await.is_err());
    assert_eq!(repo.call_count("client3"), 2);

    // Other tenants are unaffected.
    service.get_secret("client1", "ENV_1").await.unwrap();
    assert_eq!(repo.call_count("client1"), 1);
}

/// Repository whose first fetch fails and every later one succeeds.
#[derive(Debug)]
struct FlakyRepository {
    calls: AtomicUsize,
    bundle: SecretBundle,
}

#[async_trait]
impl SecretRepository for FlakyRepository {
    async fn fetch_bundle(&self, _tenant: &str) -> tenant_secrets::secrets::Result<SecretBundle> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(SecretsError::backend("vault unavailable"));
        }
        Ok(self.bundle.clone())
    }

    async fn list_tenants(&self) -> tenant_secrets::secrets::Result<Vec<TenantId>> {
        Ok(vec!["client1".to_string()])
    }
}

#[tokio::test]
async fn fetch_succeeds_after_transient_failure() {
    let repo = Arc::new(FlakyRepository {
        calls: AtomicUsize::new(0),
        bundle: HashMap::from([("ENV_1".to_string(), SecretValue::from("val 1"))]),
    });
    let service = SecretService::new(repo.clone());

    let err = service.get_secret("client1", "ENV_1").await.unwrap_err();
    assert!(matches!(err, SecretsError::Backend { .. }));

    let value = service.get_secret("client1", "ENV_1").await.unwrap();
    assert_eq!(value, Some(SecretValue::from("val 1")));
    assert_eq!(repo.calls.load(Ordering::SeqCst), 2);

    // Served from cache once a fetch has succeeded.
    service.get_secret("client1", "ENV_1").await.unwrap();
    assert_eq!(repo.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn list_tenants() {
    let (_, service) = fixture_service();

    let mut tenants = service.list().await.unwrap();
    tenants.sort();
    assert_eq!(tenants, vec!["client1", "client2", "client4"]);
}

#[tokio::test]
async fn concurrent_first_access_fetches_once() {
    let repo = MockSecretRepository::from_json_file(FIXTURE).unwrap();
    let repo = Arc::new(repo.with_latency(Duration::from_millis(50)));
    let service = Arc::new(SecretService::new(repo.clone()));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.get_secret("client1", "ENV_1").await })
        })
        .collect();

    for handle in handles {
        let value = handle.await.unwrap().unwrap();
        assert_eq!(value, Some(SecretValue::from("val 1")));
    }
    assert_eq!(repo.call_count("client1"), 1);
}

#[tokio::test]
async fn concurrent_failures_are_retried_by_each_waiter() {
    let repo = Arc::new(MockSecretRepository::default().with_latency(Duration::from_millis(10)));
    let service = Arc::new(SecretService::new(repo.clone()));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.get_secret("client3", "ENV_1").await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_err());
    }
    assert_eq!(repo.call_count("client3"), 3);
}

#[tokio::test]
async fn from_config_uses_mock_file() {
    let mut config = VaultConfig::default();
    config.mock.enabled = true;
    config.mock.json_file = FIXTURE.to_string();

    let service = SecretService::from_config(&config).await.unwrap();
    assert_eq!(service.get_secret_as_string("client2", "VAR").await.unwrap(), "value");
    service.shutdown().await;
}

#[tokio::test]
async fn from_config_without_mock_file_name() {
    let mut config = VaultConfig::default();
    config.mock.enabled = true;

    let err = SecretService::from_config(&config).await.unwrap_err();
    assert!(matches!(err, SecretsError::Config { .. }));
    assert!(err.to_string().contains("mocked json file name not provided"));
}

#[tokio::test]
async fn from_config_without_vault_certificate() {
    let config = VaultConfig {
        role_id: "role".to_string(),
        secret_id: "secret".into(),
        url: "https://127.0.0.1:8200".to_string(),
        cert: "/nonexistent/vault-ca.pem".to_string(),
        ..VaultConfig::default()
    };

    let err = SecretService::from_config(&config).await.unwrap_err();
    assert!(matches!(err, SecretsError::Config { .. }));
}

#[tokio::test]
async fn invalidation_forces_refetch() {
    let (repo, service) = fixture_service();

    service.get_secret("client1", "ENV_1").await.unwrap();
    assert!(service.invalidate("client1"));
    service.get_secret("client1", "ENV_1").await.unwrap();

    assert_eq!(repo.call_count("client1"), 2);
}

fn arb_bundle() -> impl Strategy<Value = SecretBundle> {
    let value = prop_oneof![
        "[a-z0-9 ]{0,12}".prop_map(SecretValue::from),
        any::<bool>().prop_map(SecretValue::from),
        any::<i64>().prop_map(SecretValue::from),
    ];
    prop::collection::hash_map("[A-Z_]{1,8}", value, 0..12)
}

proptest! {
    #[test]
    fn get_secrets_is_the_requested_subset(
        bundle in arb_bundle(),
        extra in prop::collection::vec("[A-Z_]{1,8}", 0..6),
        take in 0usize..12,
    ) {
        let mut keys: Vec<String> = bundle.keys().take(take).cloned().collect();
        keys.extend(extra);

        let data = HashMap::from([("tenant".to_string(), bundle.clone())]);
        let repo = Arc::new(MockSecretRepository::new(data));
        let service = SecretService::new(repo);

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let result = runtime.block_on(service.get_secrets("tenant", keys.as_slice())).unwrap();

        for (key, value) in &result {
            prop_assert!(keys.contains(key));
            prop_assert_eq!(Some(value), bundle.get(key));
        }
        for key in &keys {
            prop_assert_eq!(result.contains_key(key), bundle.contains_key(key));
        }
    }
}
