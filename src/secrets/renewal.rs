//! Background authentication lifecycle for the Vault repository.
//!
//! The [`RenewalSupervisor`] owns the token after the first login. It loops
//! through two phases until cancelled:
//!
//! 1. **Login.** Exchange the AppRole credentials for a token. Failures are
//!    logged, marked as errors on the `vault_login` span, and retried after a
//!    bounded exponential [`Backoff`].
//! 2. **Lifecycle watch.** A renewable token is handed to a
//!    [`LifetimeWatcher`] that renews it at 80% of each lease. When the watcher
//!    reports it is done, whether from an error or because the token hit its
//!    maximum TTL, the supervisor goes back to phase 1. A token that cannot be
//!    renewed is kept until 80% of its lease and then replaced by a new login.
//!
//! Request handling never waits on this loop. The transport always holds the
//! latest token the supervisor obtained.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, field, info, info_span, warn, Instrument, Span};

use super::error::{Result, SecretsError};
use super::transport::{AuthToken, VaultTransport};
use super::types::SecretString;

/// Default increment requested on each renewal.
pub const DEFAULT_RENEWAL_INCREMENT: Duration = Duration::from_secs(3600);

/// AppRole credentials used for every login.
#[derive(Debug, Clone)]
pub struct AppRoleCredentials {
    pub auth_mount: String,
    pub role_id: String,
    pub secret_id: SecretString,
}

impl AppRoleCredentials {
    pub fn new(role_id: impl Into<String>, secret_id: impl Into<SecretString>) -> Self {
        Self {
            auth_mount: "approle".to_string(),
            role_id: role_id.into(),
            secret_id: secret_id.into(),
        }
    }

    pub fn with_auth_mount(mut self, auth_mount: impl Into<String>) -> Self {
        self.auth_mount = auth_mount.into();
        self
    }

    /// Perform one login and install the resulting token on `transport`.
    ///
    /// No retry happens here; the supervisor owns retries.
    pub async fn login<T: VaultTransport + ?Sized>(&self, transport: &T) -> Result<AuthToken> {
        transport.login(&self.auth_mount, &self.role_id, self.secret_id.expose_secret()).await
    }
}

/// Timing knobs for renewal and re-authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct RenewalPolicy {
    /// Lease extension requested from `renew-self`.
    pub increment: Duration,
    /// A renewed lease shorter than this counts as the token reaching its max TTL.
    pub min_lease: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RenewalPolicy {
    /// Whether a renewed token still has a lease worth watching.
    fn extends(&self, token: &AuthToken) -> bool {
        token.renewable() && token.lease_duration() >= self.min_lease
    }
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            increment: DEFAULT_RENEWAL_INCREMENT,
            min_lease: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Bounded exponential backoff for login retries.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self { initial, max, current: initial }
    }

    /// Delay to wait before the next attempt. Doubles on every call up to `max`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.checked_mul(2).unwrap_or(self.max).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Events emitted by a [`LifetimeWatcher`].
#[derive(Debug)]
pub enum WatchEvent {
    /// The token was renewed and the watcher keeps going.
    Renewed(AuthToken),
    /// The watcher stopped. `None` means the token can no longer be extended.
    Done(Option<SecretsError>),
}

/// Renews one token periodically until it fails, expires, or is stopped.
pub struct LifetimeWatcher {
    events: mpsc::Receiver<WatchEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LifetimeWatcher {
    /// Spawn a watcher for `token`. It stops when `cancel` fires or when it
    /// has sent its `Done` event.
    pub fn start<T: VaultTransport + ?Sized>(
        transport: Arc<T>,
        token: AuthToken,
        policy: RenewalPolicy,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, events) = mpsc::channel(8);
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let mut current = token;
            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => return,
                    _ = tokio::time::sleep(current.renew_after()) => {}
                }

                let renewed = tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => return,
                    result = transport.renew_self(policy.increment) => result,
                };

                let event = match renewed {
                    Err(e) => WatchEvent::Done(Some(e)),
                    Ok(token) if !policy.extends(&token) => WatchEvent::Done(None),
                    Ok(token) => {
                        current = token.clone();
                        WatchEvent::Renewed(token)
                    }
                };

                let finished = matches!(event, WatchEvent::Done(_));
                if tx.send(event).await.is_err() || finished {
                    return;
                }
            }
        });

        Self { events, cancel, task }
    }

    /// Next event, or `None` once the watcher task has exited.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for LifetimeWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Keeps the transport authenticated for as long as it runs.
pub struct RenewalSupervisor<T: VaultTransport + ?Sized> {
    transport: Arc<T>,
    credentials: AppRoleCredentials,
    policy: RenewalPolicy,
}

enum LoginOutcome {
    Authenticated(AuthToken),
    Failed,
    Cancelled,
}

impl<T: VaultTransport + ?Sized> RenewalSupervisor<T> {
    pub fn new(transport: Arc<T>, credentials: AppRoleCredentials, policy: RenewalPolicy) -> Self {
        Self { transport, credentials, policy }
    }

    /// Spawn the supervisor loop, starting in the watch phase with `initial`.
    pub fn spawn(self, initial: AuthToken) -> RenewalHandle {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { self.run(initial, task_cancel).await });
        info!("Vault token renewal supervisor started");
        RenewalHandle { cancel, task: Mutex::new(Some(task)) }
    }

    async fn run(self, initial: AuthToken, cancel: CancellationToken) {
        let mut backoff = Backoff::new(self.policy.initial_backoff, self.policy.max_backoff);
        let mut pending = Some(initial);

        loop {
            let token = match pending.take() {
                Some(token) => token,
                None => match self.login_attempt(&cancel).await {
                    LoginOutcome::Authenticated(token) => {
                        backoff.reset();
                        token
                    }
                    LoginOutcome::Failed => {
                        let delay = backoff.next_delay();
                        warn!(
                            retry_in_ms = delay.as_millis() as u64,
                            "Retrying Vault login after backoff"
                        );
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => continue,
                        }
                    }
                    LoginOutcome::Cancelled => break,
                },
            };

            if !self.watch_lifecycle(token, &cancel).await {
                break;
            }
        }

        info!("Vault token renewal supervisor stopped");
    }

    async fn login_attempt(&self, cancel: &CancellationToken) -> LoginOutcome {
        let span = info_span!(
            "vault_login",
            role_id = %self.credentials.role_id,
            otel.status_code = field::Empty
        );

        async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => LoginOutcome::Cancelled,
                result = self.credentials.login(self.transport.as_ref()) => match result {
                    Ok(token) => {
                        info!(
                            lease_secs = token.lease_duration().as_secs(),
                            renewable = token.renewable(),
                            "Authenticated to Vault"
                        );
                        LoginOutcome::Authenticated(token)
                    }
                    Err(e) => {
                        Span::current().record("otel.status_code", "ERROR");
                        error!(error = %e, "Unable to authenticate to Vault");
                        LoginOutcome::Failed
                    }
                },
            }
        }
        .instrument(span)
        .await
    }

    /// Watch one token until it needs replacing. Returns `false` if cancelled.
    async fn watch_lifecycle(&self, token: AuthToken, cancel: &CancellationToken) -> bool {
        if token.lease_duration().is_zero() {
            info!("Vault token has no lease expiry, skipping renewal");
            cancel.cancelled().await;
            return false;
        }

        if !token.renewable() {
            let wait = token.renew_after();
            let span = info_span!("vault_token_lifecycle", outcome = "not_renewable");
            info!(
                parent: &span,
                outcome = "not_renewable",
                relogin_in_secs = wait.as_secs(),
                "Token is not configured to be renewable, re-attempting login before lease ends"
            );
            return tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = tokio::time::sleep(wait).instrument(span) => true,
            };
        }

        let mut watcher = LifetimeWatcher::start(
            Arc::clone(&self.transport),
            token,
            self.policy.clone(),
            cancel.child_token(),
        );

        loop {
            let span = info_span!(
                "vault_token_lifecycle",
                outcome = field::Empty,
                otel.status_code = field::Empty
            );
            let next = async {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    event = watcher.next_event() => Some(event),
                }
            }
            .instrument(span.clone())
            .await;

            let Some(event) = next else {
                watcher.stop();
                return false;
            };

            match event {
                Some(WatchEvent::Renewed(renewed)) => {
                    span.record("outcome", "renewed");
                    info!(
                        parent: &span,
                        outcome = "renewed",
                        lease_secs = renewed.lease_duration().as_secs(),
                        "Vault token renewed"
                    );
                }
                Some(WatchEvent::Done(Some(e))) => {
                    span.record("outcome", "failed");
                    span.record("otel.status_code", "ERROR");
                    warn!(
                        parent: &span,
                        outcome = "failed",
                        error = %e,
                        "Failed to renew Vault token, re-attempting login"
                    );
                    watcher.stop();
                    return true;
                }
                Some(WatchEvent::Done(None)) | None => {
                    span.record("outcome", "expired");
                    info!(
                        parent: &span,
                        outcome = "expired",
                        "Vault token can no longer be renewed, re-attempting login"
                    );
                    watcher.stop();
                    return true;
                }
            }
        }
    }
}

/// Handle to a running supervisor. Dropping it cancels the supervisor.
#[derive(Debug)]
pub struct RenewalHandle {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RenewalHandle {
    /// Cancel the supervisor and wait for it to exit. Safe to call twice.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Vault token renewal supervisor ended abnormally");
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for RenewalHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
