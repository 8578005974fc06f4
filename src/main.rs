use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sg_auth::{
    AuthEvent, CredentialResolver, FileKeyValueStore, KeyValueStore, SandboxProvider, USER_ID_KEY,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = Arc::new(FileKeyValueStore::new(FileKeyValueStore::default_storage_dir()?).await?);
    let provider = Arc::new(SandboxProvider::new());
    let mut resolver = CredentialResolver::new(provider, store.clone());
    resolver.ensure_supported()?;

    if std::env::args().nth(1).as_deref() == Some("sign-out") {
        resolver.sign_out();
        tokio::time::sleep(Duration::from_millis(50)).await;
        info!("Signed out");
        return Ok(());
    }

    resolver.resolve();
    let events = pump_until_idle(&mut resolver).await;

    if events.is_empty() && store.get(USER_ID_KEY).await.is_some() {
        info!("Stored credential is still authorized, nothing to do");
        return Ok(());
    }
    if report(&events) {
        return Ok(());
    }

    // Quick login could not produce an identity; fall back to the
    // interactive sign-in UI, as a launcher's login menu would.
    resolver.sign_in_interactive();
    let events = pump_until_idle(&mut resolver).await;
    report(&events);

    Ok(())
}

/// Tick the resolver at roughly frame rate until the outstanding
/// attempt completes
async fn pump_until_idle(resolver: &mut CredentialResolver) -> Vec<AuthEvent> {
    let mut interval = tokio::time::interval(Duration::from_millis(16));
    let mut events = Vec::new();
    loop {
        interval.tick().await;
        events.extend(resolver.pump());
        if !resolver.is_in_flight() {
            events.extend(resolver.pump());
            return events;
        }
    }
}

/// Log the outcome of a sign-in attempt; true when a token was obtained
fn report(events: &[AuthEvent]) -> bool {
    let mut succeeded = false;
    for event in events {
        match event {
            AuthEvent::LoginSucceeded { token } => {
                info!("Signed in, identity token: {token}");
                succeeded = true;
            }
            AuthEvent::LoginFailed { message } => warn!("{message}"),
            AuthEvent::Completed => {}
        }
    }
    succeeded
}
