use thiserror::Error;

/// Vendor sign-in error types
#[derive(Error, Debug)]
pub enum SgAuthError {
    #[error("Sign-in capability is unavailable on this host")]
    CapabilityUnavailable,

    #[error("Provider request failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Another process holds the preference store lock")]
    LockTimeout,

    #[error("Key-value store failure: {0}")]
    Store(String),
}

/// Error reported by the vendor authentication capability.
///
/// Carries the vendor-defined numeric code plus its free-text
/// description; this is the only error shape that crosses the
/// capability boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("error {code}: {description}")]
pub struct ProviderError {
    pub code: i64,
    pub description: String,
}

impl ProviderError {
    pub fn new(code: i64, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    /// Classify this error by the vendor's well-known code space
    pub fn kind(&self) -> AuthorizationErrorKind {
        AuthorizationErrorKind::from_code(self.code)
    }
}

/// Vendor authorization error codes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationErrorKind {
    #[error("authorization failed for an unknown reason (code 1000)")]
    Unknown,

    #[error("user canceled the authorization attempt (code 1001)")]
    Canceled,

    #[error("authorization response was invalid (code 1002)")]
    InvalidResponse,

    #[error("authorization request was not handled (code 1003)")]
    NotHandled,

    #[error("authorization attempt failed (code 1004)")]
    Failed,

    #[error("unrecognized authorization error code: {0}")]
    Other(i64),
}

impl AuthorizationErrorKind {
    /// Map a vendor error code to its known meaning
    pub fn from_code(code: i64) -> Self {
        match code {
            1000 => Self::Unknown,
            1001 => Self::Canceled,
            1002 => Self::InvalidResponse,
            1003 => Self::NotHandled,
            1004 => Self::Failed,
            code => Self::Other(code),
        }
    }
}

pub type Result<T> = std::result::Result<T, SgAuthError>;
