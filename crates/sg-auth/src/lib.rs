//! Vendor sign-in credential resolution for game launchers and other
//! frame-loop hosts
//!
//! This crate decides, at application start, how to re-establish the
//! last identity a platform vendor's sign-in service granted: silently
//! reuse it, discard it and let the host prompt for an interactive
//! sign-in, or attempt a quick login against an ambient vendor session.
//!
//! # Resolution Flow
//!
//! 1. Read the stored user id from the injected key-value store
//! 2. If one exists, query its credential state:
//!    - `Authorized` keeps it and does nothing else
//!    - `Revoked`/`NotFound` discard it
//!    - a query failure leaves it untouched
//! 3. If none exists, attempt a quick login; on failure the host is
//!    expected to offer the interactive sign-in UI
//!
//! Sign-in outcomes are normalized into [`AuthEvent`]s and become
//! observable through [`CredentialResolver::pump`], which the host calls
//! once per frame or tick. The native vendor plugin is never touched
//! directly; hosts inject an [`IdentityProvider`] implementation.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sg_auth::{AuthEvent, CredentialResolver, MemoryKeyValueStore, SandboxProvider};
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = Arc::new(SandboxProvider::new());
//!     let store = Arc::new(MemoryKeyValueStore::new());
//!     let mut resolver = CredentialResolver::new(provider, store);
//!
//!     resolver.resolve();
//!     loop {
//!         for event in resolver.pump() {
//!             match event {
//!                 AuthEvent::LoginSucceeded { token } => println!("signed in: {token}"),
//!                 AuthEvent::LoginFailed { message } => eprintln!("{message}"),
//!                 AuthEvent::Completed => return,
//!             }
//!         }
//!         tokio::time::sleep(std::time::Duration::from_millis(16)).await;
//!     }
//! }
//! ```
//!
//! # Persistence
//!
//! The stored user id lives behind the [`KeyValueStore`] trait:
//! [`MemoryKeyValueStore`] for tests and simple hosts,
//! [`FileKeyValueStore`] for a durable, atomically written preference
//! file in the platform config directory.
//!
//! # Important Notes
//!
//! - A resolver must be created inside a Tokio runtime; provider
//!   operations are spawned onto it
//! - On hosts without the vendor capability the resolver is inert:
//!   no provider calls, no store writes, no events
//! - At most one resolution or sign-in attempt runs at a time; extra
//!   calls while one is in flight are ignored with a warning
//! - A credentials-revoked push can race an in-flight sign-in; the
//!   stored user id is discarded unconditionally either way

pub mod config;
pub mod errors;
pub mod file_store;
pub mod models;
pub mod provider;
pub mod resolver;
pub mod store;

// Re-export main types
pub use config::{LoginScopes, ResolverConfig, USER_ID_KEY};
pub use errors::{AuthorizationErrorKind, ProviderError, Result, SgAuthError};
pub use file_store::FileKeyValueStore;
pub use models::{
    Credential, CredentialState, IdentityCredential, PasswordCredential, RevocationNotice,
};
pub use provider::{IdentityProvider, SandboxBehavior, SandboxProvider};
pub use resolver::{AuthEvent, CredentialResolver};
pub use store::{KeyValueStore, MemoryKeyValueStore};
