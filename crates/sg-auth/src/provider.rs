use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;

use crate::config::LoginScopes;
use crate::errors::ProviderError;
use crate::models::{Credential, CredentialState, IdentityCredential, RevocationNotice};

/// Trait for the platform vendor's sign-in capability.
///
/// This crate never talks to the native plugin directly; hosts inject an
/// implementation of this trait. All operations are asynchronous and
/// complete at an indeterminate later point; their outcomes reach the
/// host through [`CredentialResolver::pump`](crate::CredentialResolver::pump).
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Whether the sign-in capability exists on this host.
    ///
    /// Checked once, before any resolution attempt. On hosts where this
    /// returns `false` the resolver performs no action at all.
    fn is_supported(&self) -> bool {
        true
    }

    /// Query the current state of a previously known identity
    async fn credential_state(&self, user_id: &str) -> Result<CredentialState, ProviderError>;

    /// Present the interactive vendor sign-in UI
    async fn sign_in(&self, scopes: LoginScopes) -> Result<Credential, ProviderError>;

    /// Attempt a non-interactive login against an ambient vendor session
    async fn quick_login(&self) -> Result<Credential, ProviderError>;

    /// Subscribe to credential revocation pushes.
    ///
    /// Returns `None` when the provider cannot deliver pushes. The
    /// resolver drains the returned channel on every pump tick.
    fn subscribe_revoked(&self) -> Option<mpsc::UnboundedReceiver<RevocationNotice>> {
        None
    }
}

/// Scripted provider for testing and for development hosts where the
/// native plugin is absent.
///
/// Every operation returns a preconfigured outcome and counts its
/// invocations. Revocation pushes are injected with
/// [`push_revocation`](Self::push_revocation).
pub struct SandboxProvider {
    supported: bool,
    behavior: Mutex<SandboxBehavior>,
    revoked_tx: Mutex<Option<mpsc::UnboundedSender<RevocationNotice>>>,
    credential_state_calls: AtomicUsize,
    sign_in_calls: AtomicUsize,
    quick_login_calls: AtomicUsize,
}

/// Scripted outcomes returned by [`SandboxProvider`]
#[derive(Debug, Clone)]
pub struct SandboxBehavior {
    pub credential_state: Result<CredentialState, ProviderError>,
    pub sign_in: Result<Credential, ProviderError>,
    pub quick_login: Result<Credential, ProviderError>,
}

impl Default for SandboxBehavior {
    fn default() -> Self {
        Self {
            credential_state: Ok(CredentialState::Authorized),
            sign_in: Ok(Credential::Identity(IdentityCredential {
                user_id: "sandbox-user".to_string(),
                identity_token: b"sandbox-identity-token".to_vec(),
                email: Some("player@example.com".to_string()),
                full_name: Some("Sandbox Player".to_string()),
            })),
            quick_login: Err(ProviderError::new(1000, "No ambient vendor session available")),
        }
    }
}

impl SandboxProvider {
    pub fn new() -> Self {
        Self::with_behavior(SandboxBehavior::default())
    }

    pub fn with_behavior(behavior: SandboxBehavior) -> Self {
        Self {
            supported: true,
            behavior: Mutex::new(behavior),
            revoked_tx: Mutex::new(None),
            credential_state_calls: AtomicUsize::new(0),
            sign_in_calls: AtomicUsize::new(0),
            quick_login_calls: AtomicUsize::new(0),
        }
    }

    /// A provider whose capability is absent, as on an unsupported host
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn set_credential_state(&self, outcome: Result<CredentialState, ProviderError>) {
        if let Ok(mut behavior) = self.behavior.lock() {
            behavior.credential_state = outcome;
        }
    }

    pub fn set_sign_in(&self, outcome: Result<Credential, ProviderError>) {
        if let Ok(mut behavior) = self.behavior.lock() {
            behavior.sign_in = outcome;
        }
    }

    pub fn set_quick_login(&self, outcome: Result<Credential, ProviderError>) {
        if let Ok(mut behavior) = self.behavior.lock() {
            behavior.quick_login = outcome;
        }
    }

    /// Deliver a revocation push to any live subscription
    pub fn push_revocation(&self, notice: RevocationNotice) {
        if let Ok(sender) = self.revoked_tx.lock()
            && let Some(sender) = sender.as_ref()
        {
            let _ = sender.send(notice);
        }
    }

    pub fn credential_state_calls(&self) -> usize {
        self.credential_state_calls.load(Ordering::SeqCst)
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn quick_login_calls(&self) -> usize {
        self.quick_login_calls.load(Ordering::SeqCst)
    }

    fn scripted<T: Clone>(
        &self,
        pick: impl FnOnce(&SandboxBehavior) -> &Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        self.behavior
            .lock()
            .map(|behavior| pick(&behavior).clone())
            .map_err(|_| ProviderError::new(1002, "Sandbox behavior lock poisoned"))?
    }
}

impl Default for SandboxProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IdentityProvider for SandboxProvider {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn credential_state(&self, _user_id: &str) -> Result<CredentialState, ProviderError> {
        self.credential_state_calls.fetch_add(1, Ordering::SeqCst);
        self.scripted(|behavior| &behavior.credential_state)
    }

    async fn sign_in(&self, _scopes: LoginScopes) -> Result<Credential, ProviderError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        self.scripted(|behavior| &behavior.sign_in)
    }

    async fn quick_login(&self) -> Result<Credential, ProviderError> {
        self.quick_login_calls.fetch_add(1, Ordering::SeqCst);
        self.scripted(|behavior| &behavior.quick_login)
    }

    fn subscribe_revoked(&self) -> Option<mpsc::UnboundedReceiver<RevocationNotice>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        match self.revoked_tx.lock() {
            Ok(mut slot) => {
                *slot = Some(sender);
                Some(receiver)
            }
            Err(_) => None,
        }
    }
}
