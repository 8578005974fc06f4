use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::{LoginScopes, ResolverConfig};
use crate::errors::{ProviderError, Result, SgAuthError};
use crate::models::{Credential, CredentialState, RevocationNotice};
use crate::provider::IdentityProvider;
use crate::store::KeyValueStore;

/// Event surfaced to the host, drained through [`CredentialResolver::pump`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A sign-in attempt yielded a credential; carries the decoded identity token
    LoginSucceeded { token: String },
    /// A sign-in attempt failed; the message embeds the vendor error code and description
    LoginFailed { message: String },
    /// A sign-in attempt finished, successfully or not
    Completed,
}

/// Decides, at startup, how to re-establish the last known identity.
///
/// Three paths, chosen by [`resolve`](Self::resolve):
///
/// 1. A user id is stored and the provider still reports it
///    `Authorized`: silent reuse, nothing else happens.
/// 2. A user id is stored but the provider reports it `Revoked` or
///    `NotFound`: the stored id is discarded; the host is expected to
///    offer an interactive sign-in next.
/// 3. No user id is stored: a non-interactive quick login is attempted
///    against any ambient vendor session.
///
/// Sign-in attempts are normalized into [`AuthEvent`]s: a
/// `LoginSucceeded` or `LoginFailed`, always followed by `Completed`.
/// Provider operations run on spawned tasks; their outcomes become
/// observable only when the host calls [`pump`](Self::pump), once per
/// frame or tick, on whichever thread owns the resolver.
///
/// At most one resolution or sign-in attempt runs at a time; starting
/// another while one is in flight logs a warning and does nothing.
pub struct CredentialResolver {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn KeyValueStore>,
    config: ResolverConfig,
    supported: bool,
    in_flight: Arc<AtomicBool>,
    events_tx: mpsc::UnboundedSender<AuthEvent>,
    events_rx: mpsc::UnboundedReceiver<AuthEvent>,
    revoked_rx: Option<mpsc::UnboundedReceiver<RevocationNotice>>,
    runtime: Handle,
}

/// Clears the in-flight flag when an attempt's task finishes
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CredentialResolver {
    /// Create a resolver with the default configuration.
    ///
    /// The capability precondition is checked once, here: when the
    /// provider reports the host unsupported, every later call on the
    /// resolver is a silent no-op and no event is ever emitted.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime; the resolver spawns
    /// provider operations onto the runtime it was created in.
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(provider, store, ResolverConfig::default())
    }

    pub fn with_config(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn KeyValueStore>,
        config: ResolverConfig,
    ) -> Self {
        let supported = provider.is_supported();
        let revoked_rx = if supported {
            provider.subscribe_revoked()
        } else {
            debug!("Sign-in capability unavailable on this host, resolver is inert");
            None
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            provider,
            store,
            config,
            supported,
            in_flight: Arc::new(AtomicBool::new(false)),
            events_tx,
            events_rx,
            revoked_rx,
            runtime: Handle::current(),
        }
    }

    /// Whether the sign-in capability exists on this host
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Surface the capability precondition as an error, for hosts that
    /// want to check it once up front
    pub fn ensure_supported(&self) -> Result<()> {
        if self.supported {
            Ok(())
        } else {
            Err(SgAuthError::CapabilityUnavailable)
        }
    }

    /// Whether a resolution or sign-in attempt is currently outstanding
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Entry point: choose and start one of the three startup paths.
    ///
    /// With a stored user id, queries its credential state; `Revoked`
    /// and `NotFound` discard the stored id, a query failure leaves it
    /// untouched, and neither emits events. Without a stored user id,
    /// attempts a quick login, which reports through [`AuthEvent`]s.
    /// Interactive sign-in is never chained automatically; the host
    /// triggers it after observing a failed attempt.
    #[instrument(skip(self))]
    pub fn resolve(&self) {
        if !self.begin_attempt("resolve") {
            return;
        }

        let provider = Arc::clone(&self.provider);
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let events = self.events_tx.clone();
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        self.runtime.spawn(async move {
            let _guard = guard;
            match store.get(&config.user_id_key).await {
                Some(user_id) => {
                    check_credential_state(provider.as_ref(), store.as_ref(), &config, &user_id)
                        .await;
                }
                None => {
                    debug!("No stored user id, attempting quick login");
                    run_quick_login(provider.as_ref(), store.as_ref(), &config, &events).await;
                }
            }
        });
    }

    /// Attempt a non-interactive login against an ambient vendor session
    #[instrument(skip(self))]
    pub fn attempt_quick_login(&self) {
        if !self.begin_attempt("attempt_quick_login") {
            return;
        }

        let provider = Arc::clone(&self.provider);
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let events = self.events_tx.clone();
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        self.runtime.spawn(async move {
            let _guard = guard;
            run_quick_login(provider.as_ref(), store.as_ref(), &config, &events).await;
        });
    }

    /// Present the interactive vendor sign-in UI with the configured scopes
    pub fn sign_in_interactive(&self) {
        self.sign_in_with_scopes(self.config.scopes);
    }

    #[instrument(skip(self))]
    pub fn sign_in_with_scopes(&self, scopes: LoginScopes) {
        if !self.begin_attempt("sign_in") {
            return;
        }

        let provider = Arc::clone(&self.provider);
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let events = self.events_tx.clone();
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        self.runtime.spawn(async move {
            let _guard = guard;
            match provider.sign_in(scopes).await {
                Ok(credential) => {
                    complete_sign_in(store.as_ref(), &config, &events, credential, "Sign in").await;
                }
                Err(error) => fail_attempt(&events, "Sign in", &error),
            }
        });
    }

    /// Discard the stored user id. No provider call is made
    #[instrument(skip(self))]
    pub fn sign_out(&self) {
        if !self.supported {
            return;
        }
        info!("Signing out, discarding stored user id");
        self.discard_stored_user_id("sign out");
    }

    /// React to a credentials-revoked push from the provider.
    ///
    /// Can fire at any time, not only during resolution, and discards
    /// the stored user id unconditionally, even while a sign-in attempt
    /// is in flight.
    #[instrument(skip(self))]
    pub fn credentials_revoked(&self, notice: RevocationNotice) {
        if !self.supported {
            return;
        }
        info!(?notice, "Credentials revoked, discarding stored user id");
        self.discard_stored_user_id("revocation");
    }

    /// Dispatch completed work on the calling thread.
    ///
    /// The host calls this once per frame or tick. Drains any pending
    /// revocation notices from the provider subscription, then returns
    /// the [`AuthEvent`]s produced since the last pump, in order.
    pub fn pump(&mut self) -> Vec<AuthEvent> {
        if !self.supported {
            return Vec::new();
        }

        let mut notices = Vec::new();
        if let Some(rx) = self.revoked_rx.as_mut() {
            while let Ok(notice) = rx.try_recv() {
                notices.push(notice);
            }
        }
        for notice in notices {
            info!(?notice, "Received credentials revoked notice, discarding stored user id");
            self.discard_stored_user_id("revocation");
        }

        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Claim the in-flight slot; false means the call must be dropped
    fn begin_attempt(&self, what: &'static str) -> bool {
        if !self.supported {
            return false;
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!("{what} ignored, another attempt is already in flight");
            return false;
        }
        true
    }

    fn discard_stored_user_id(&self, cause: &'static str) {
        let store = Arc::clone(&self.store);
        let key = self.config.user_id_key.clone();
        self.runtime.spawn(async move {
            if let Err(error) = store.delete(&key).await {
                warn!("Failed to discard stored user id after {cause}: {error}");
            }
        });
    }
}

async fn check_credential_state(
    provider: &dyn IdentityProvider,
    store: &dyn KeyValueStore,
    config: &ResolverConfig,
    user_id: &str,
) {
    match provider.credential_state(user_id).await {
        Ok(CredentialState::Authorized) => {
            debug!(user_id, "Stored credential still authorized");
        }
        Ok(CredentialState::Revoked) | Ok(CredentialState::NotFound) => {
            info!(user_id, "Stored credential revoked or unknown, discarding user id");
            if let Err(error) = store.delete(&config.user_id_key).await {
                warn!("Failed to discard stored user id: {error}");
            }
        }
        Ok(CredentialState::Transferred) => {
            debug!(user_id, "Credential state is not actionable, keeping stored user id");
        }
        // Transient query failure: keep the stored user id
        Err(error) => {
            warn!("Failed to query credential state: {error}");
        }
    }
}

async fn run_quick_login(
    provider: &dyn IdentityProvider,
    store: &dyn KeyValueStore,
    config: &ResolverConfig,
    events: &mpsc::UnboundedSender<AuthEvent>,
) {
    match provider.quick_login().await {
        Ok(credential) => {
            complete_sign_in(store, config, events, credential, "Quick login").await;
        }
        Err(error) => fail_attempt(events, "Quick login", &error),
    }
}

async fn complete_sign_in(
    store: &dyn KeyValueStore,
    config: &ResolverConfig,
    events: &mpsc::UnboundedSender<AuthEvent>,
    credential: Credential,
    attempt: &str,
) {
    match credential {
        Credential::Identity(credential) => {
            if let Err(error) = store.set(&config.user_id_key, &credential.user_id).await {
                warn!("Failed to persist user id: {error}");
            }
            let token = credential.identity_token_text();
            info!(user_id = %credential.user_id, "{attempt} succeeded");
            let _ = events.send(AuthEvent::LoginSucceeded { token });
            let _ = events.send(AuthEvent::Completed);
        }
        Credential::Password(credential) => {
            warn!(
                user_id = %credential.user_id,
                "{attempt} returned a credential without an identity token"
            );
            let _ = events.send(AuthEvent::LoginFailed {
                message: format!("{attempt} returned a credential without an identity token"),
            });
            let _ = events.send(AuthEvent::Completed);
        }
    }
}

fn fail_attempt(events: &mpsc::UnboundedSender<AuthEvent>, attempt: &str, error: &ProviderError) {
    let message = format!("{attempt} failed: {error}");
    warn!("{message}");
    let _ = events.send(AuthEvent::LoginFailed { message });
    let _ = events.send(AuthEvent::Completed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::config::USER_ID_KEY;
    use crate::models::{IdentityCredential, PasswordCredential};
    use crate::provider::SandboxProvider;
    use crate::store::MemoryKeyValueStore;

    /// Memory store that counts delete calls
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryKeyValueStore,
        deletes: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl KeyValueStore for CountingStore {
        async fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.inner.delete(key).await
        }
    }

    fn identity(user_id: &str, token: &[u8]) -> Credential {
        Credential::Identity(IdentityCredential {
            user_id: user_id.to_string(),
            identity_token: token.to_vec(),
            email: None,
            full_name: None,
        })
    }

    /// Tick the resolver until the in-flight attempt (if any) finishes,
    /// then drain any remaining events
    async fn settle(resolver: &mut CredentialResolver) -> Vec<AuthEvent> {
        let mut events = Vec::new();
        for _ in 0..64 {
            events.extend(resolver.pump());
            if !resolver.is_in_flight() {
                break;
            }
            tokio::task::yield_now().await;
        }
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        events.extend(resolver.pump());
        events
    }

    #[tokio::test]
    async fn test_quick_login_runs_when_no_user_id_is_stored() {
        let provider = Arc::new(SandboxProvider::new());
        provider.set_quick_login(Err(ProviderError::new(1001, "The user canceled the request")));
        let store = Arc::new(MemoryKeyValueStore::new());
        let mut resolver = CredentialResolver::new(provider.clone(), store.clone());

        resolver.resolve();
        let events = settle(&mut resolver).await;

        assert_eq!(provider.quick_login_calls(), 1);
        assert_eq!(provider.credential_state_calls(), 0);
        assert_eq!(events.len(), 2);
        assert!(
            matches!(&events[0], AuthEvent::LoginFailed { message } if message.contains("1001"))
        );
        assert_eq!(events[1], AuthEvent::Completed);
        assert!(store.get(USER_ID_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_quick_login_success_persists_user_id_and_emits_token() {
        let provider = Arc::new(SandboxProvider::new());
        provider.set_quick_login(Ok(identity("U777", b"tok-777")));
        let store = Arc::new(MemoryKeyValueStore::new());
        let mut resolver = CredentialResolver::new(provider.clone(), store.clone());

        resolver.resolve();
        let events = settle(&mut resolver).await;

        assert_eq!(store.get(USER_ID_KEY).await.as_deref(), Some("U777"));
        assert_eq!(
            events,
            vec![
                AuthEvent::LoginSucceeded {
                    token: "tok-777".to_string()
                },
                AuthEvent::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_custom_store_key_is_honored() {
        let provider = Arc::new(SandboxProvider::new());
        provider.set_quick_login(Ok(identity("U321", b"tok-321")));
        let store = Arc::new(MemoryKeyValueStore::new());
        let config = ResolverConfig {
            user_id_key: "player_identity".to_string(),
            ..ResolverConfig::default()
        };
        let mut resolver = CredentialResolver::with_config(provider, store.clone(), config);

        resolver.resolve();
        settle(&mut resolver).await;

        assert_eq!(store.get("player_identity").await.as_deref(), Some("U321"));
        assert!(store.get(USER_ID_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_authorized_state_leaves_stored_user_id_in_place() {
        let provider = Arc::new(SandboxProvider::new());
        provider.set_credential_state(Ok(CredentialState::Authorized));
        let store = Arc::new(MemoryKeyValueStore::new());
        store.set(USER_ID_KEY, "U123").await.unwrap();
        let mut resolver = CredentialResolver::new(provider.clone(), store.clone());

        resolver.resolve();
        let events = settle(&mut resolver).await;

        assert!(events.is_empty());
        assert_eq!(provider.credential_state_calls(), 1);
        assert_eq!(provider.quick_login_calls(), 0);
        assert_eq!(store.get(USER_ID_KEY).await.as_deref(), Some("U123"));
    }

    #[tokio::test]
    async fn test_revoked_state_discards_stored_user_id_exactly_once() {
        let provider = Arc::new(SandboxProvider::new());
        provider.set_credential_state(Ok(CredentialState::Revoked));
        let store = Arc::new(CountingStore::default());
        store.set(USER_ID_KEY, "U123").await.unwrap();
        let mut resolver = CredentialResolver::new(provider.clone(), store.clone());

        resolver.resolve();
        let events = settle(&mut resolver).await;

        assert!(events.is_empty());
        assert!(store.get(USER_ID_KEY).await.is_none());
        assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_state_discards_stored_user_id() {
        let provider = Arc::new(SandboxProvider::new());
        provider.set_credential_state(Ok(CredentialState::NotFound));
        let store = Arc::new(CountingStore::default());
        store.set(USER_ID_KEY, "U123").await.unwrap();
        let mut resolver = CredentialResolver::new(provider.clone(), store.clone());

        resolver.resolve();
        let events = settle(&mut resolver).await;

        assert!(events.is_empty());
        assert!(store.get(USER_ID_KEY).await.is_none());
        assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_error_preserves_stored_user_id() {
        let provider = Arc::new(SandboxProvider::new());
        provider.set_credential_state(Err(ProviderError::new(1000, "The request timed out")));
        let store = Arc::new(CountingStore::default());
        store.set(USER_ID_KEY, "U123").await.unwrap();
        let mut resolver = CredentialResolver::new(provider.clone(), store.clone());

        resolver.resolve();
        let events = settle(&mut resolver).await;

        assert!(events.is_empty());
        assert_eq!(store.get(USER_ID_KEY).await.as_deref(), Some("U123"));
        assert_eq!(store.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transferred_state_is_not_actionable() {
        let provider = Arc::new(SandboxProvider::new());
        provider.set_credential_state(Ok(CredentialState::Transferred));
        let store = Arc::new(MemoryKeyValueStore::new());
        store.set(USER_ID_KEY, "U123").await.unwrap();
        let mut resolver = CredentialResolver::new(provider.clone(), store.clone());

        resolver.resolve();
        let events = settle(&mut resolver).await;

        assert!(events.is_empty());
        assert_eq!(store.get(USER_ID_KEY).await.as_deref(), Some("U123"));
    }

    #[tokio::test]
    async fn test_interactive_sign_in_persists_user_id_and_emits_token() {
        let provider = Arc::new(SandboxProvider::new());
        provider.set_sign_in(Ok(identity("U999", b"abc")));
        let store = Arc::new(MemoryKeyValueStore::new());
        let mut resolver = CredentialResolver::new(provider.clone(), store.clone());

        resolver.sign_in_interactive();
        let events = settle(&mut resolver).await;

        assert_eq!(provider.sign_in_calls(), 1);
        assert_eq!(store.get(USER_ID_KEY).await.as_deref(), Some("U999"));
        assert_eq!(
            events,
            vec![
                AuthEvent::LoginSucceeded {
                    token: "abc".to_string()
                },
                AuthEvent::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_interactive_sign_in_failure_reports_vendor_code() {
        let provider = Arc::new(SandboxProvider::new());
        provider.set_sign_in(Err(ProviderError::new(1004, "Authorization attempt failed")));
        let store = Arc::new(MemoryKeyValueStore::new());
        let mut resolver = CredentialResolver::new(provider.clone(), store.clone());

        resolver.sign_in_interactive();
        let events = settle(&mut resolver).await;

        assert!(
            matches!(&events[0], AuthEvent::LoginFailed { message } if message.contains("1004"))
        );
        assert_eq!(events[1], AuthEvent::Completed);
        assert!(store.get(USER_ID_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_password_credential_cannot_complete_sign_in() {
        let provider = Arc::new(SandboxProvider::new());
        provider.set_quick_login(Ok(Credential::Password(PasswordCredential {
            user_id: "U555".to_string(),
            password: "hunter2".to_string(),
        })));
        let store = Arc::new(MemoryKeyValueStore::new());
        let mut resolver = CredentialResolver::new(provider.clone(), store.clone());

        resolver.resolve();
        let events = settle(&mut resolver).await;

        assert!(matches!(
            &events[0],
            AuthEvent::LoginFailed { message } if message.contains("identity token")
        ));
        assert_eq!(events[1], AuthEvent::Completed);
        assert!(store.get(USER_ID_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_sign_out_discards_stored_user_id_and_is_idempotent() {
        let provider = Arc::new(SandboxProvider::new());
        let store = Arc::new(MemoryKeyValueStore::new());
        store.set(USER_ID_KEY, "U123").await.unwrap();
        let mut resolver = CredentialResolver::new(provider, store.clone());

        resolver.sign_out();
        let events = settle(&mut resolver).await;
        assert!(events.is_empty());
        assert!(store.get(USER_ID_KEY).await.is_none());

        // Signing out again with no record has no observable effect
        resolver.sign_out();
        let events = settle(&mut resolver).await;
        assert!(events.is_empty());
        assert!(store.get(USER_ID_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_revocation_push_discards_stored_user_id() {
        let provider = Arc::new(SandboxProvider::new());
        let store = Arc::new(MemoryKeyValueStore::new());
        store.set(USER_ID_KEY, "U123").await.unwrap();
        let mut resolver = CredentialResolver::new(provider.clone(), store.clone());

        provider.push_revocation(RevocationNotice {
            detail: Some("credential revoked".to_string()),
        });
        let events = settle(&mut resolver).await;

        assert!(events.is_empty());
        assert!(store.get(USER_ID_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_direct_revocation_callback_discards_stored_user_id() {
        let provider = Arc::new(SandboxProvider::new());
        let store = Arc::new(MemoryKeyValueStore::new());
        store.set(USER_ID_KEY, "U123").await.unwrap();
        let mut resolver = CredentialResolver::new(provider, store.clone());

        resolver.credentials_revoked(RevocationNotice::default());
        settle(&mut resolver).await;

        assert!(store.get(USER_ID_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_second_resolve_while_in_flight_is_ignored() {
        let provider = Arc::new(SandboxProvider::new());
        let store = Arc::new(MemoryKeyValueStore::new());
        let mut resolver = CredentialResolver::new(provider.clone(), store);

        resolver.resolve();
        resolver.resolve();
        let events = settle(&mut resolver).await;

        assert_eq!(provider.quick_login_calls(), 1);
        assert_eq!(
            events
                .iter()
                .filter(|event| **event == AuthEvent::Completed)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_unsupported_host_performs_no_action() {
        let provider = Arc::new(SandboxProvider::unsupported());
        let store = Arc::new(MemoryKeyValueStore::new());
        store.set(USER_ID_KEY, "U123").await.unwrap();
        let mut resolver = CredentialResolver::new(provider.clone(), store.clone());

        assert!(matches!(
            resolver.ensure_supported(),
            Err(SgAuthError::CapabilityUnavailable)
        ));

        resolver.resolve();
        resolver.attempt_quick_login();
        resolver.sign_in_interactive();
        resolver.sign_out();
        let events = settle(&mut resolver).await;

        assert!(events.is_empty());
        assert_eq!(provider.credential_state_calls(), 0);
        assert_eq!(provider.sign_in_calls(), 0);
        assert_eq!(provider.quick_login_calls(), 0);
        assert_eq!(store.get(USER_ID_KEY).await.as_deref(), Some("U123"));
    }
}
