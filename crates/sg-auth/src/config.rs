/// Key-value store slot that holds the stored user identifier
pub const USER_ID_KEY: &str = "vendor_user_id";

/// Scopes requested during an interactive sign-in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginScopes {
    pub email: bool,
    pub full_name: bool,
}

impl LoginScopes {
    /// Request no optional scopes
    pub fn none() -> Self {
        Self {
            email: false,
            full_name: false,
        }
    }
}

impl Default for LoginScopes {
    fn default() -> Self {
        Self {
            email: true,
            full_name: true,
        }
    }
}

/// Configuration for the credential resolver
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Store key under which the user id is persisted
    pub user_id_key: String,

    /// Scopes requested by [`sign_in_interactive`](crate::CredentialResolver::sign_in_interactive)
    pub scopes: LoginScopes,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            user_id_key: USER_ID_KEY.to_string(),
            scopes: LoginScopes::default(),
        }
    }
}
