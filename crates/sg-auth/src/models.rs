use serde::{Deserialize, Serialize};

/// Credential state reported by the provider for a previously known user id
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CredentialState {
    /// The stored identity is still valid; silent reuse is sufficient
    Authorized,
    /// The user revoked the grant; the stored identity must be discarded
    Revoked,
    /// The provider has no record of this identity
    NotFound,
    /// The identity was transferred to another team; not actionable here
    Transferred,
}

/// Credential bundle returned by a successful sign-in.
///
/// The native layer can hand back more than one kind of credential, so
/// the kinds are a tagged enum and callers match on them explicitly.
/// Only [`Credential::Identity`] carries the identity token this crate
/// persists and forwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Credential {
    /// Vendor identity credential with an opaque user id and identity token
    Identity(IdentityCredential),
    /// Keychain password credential, returned by quick login for
    /// accounts that stored a plain password with the vendor
    Password(PasswordCredential),
}

impl Credential {
    /// The opaque user identifier carried by any credential kind
    pub fn user_id(&self) -> &str {
        match self {
            Self::Identity(credential) => &credential.user_id,
            Self::Password(credential) => &credential.user_id,
        }
    }
}

/// Vendor identity credential payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityCredential {
    /// Opaque, stable user identifier issued by the provider
    pub user_id: String,
    /// Raw identity token bytes as delivered by the native layer
    pub identity_token: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl IdentityCredential {
    /// Decode the identity token to text for forwarding to the host
    pub fn identity_token_text(&self) -> String {
        String::from_utf8_lossy(&self.identity_token).into_owned()
    }
}

/// Keychain password credential payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PasswordCredential {
    pub user_id: String,
    pub password: String,
}

/// Asynchronous notice that a previously granted credential was revoked
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RevocationNotice {
    #[serde(default)]
    pub detail: Option<String>,
}
