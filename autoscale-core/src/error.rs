use thiserror::Error;

/// Cloud-provider failure sub-kind, normalized by every adapter (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProviderErrorKind {
    Auth,
    Quota,
    RateLimited,
    NotFound,
    Network,
    Provider,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderErrorKind::Auth => "auth",
            ProviderErrorKind::Quota => "quota",
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::NotFound => "not_found",
            ProviderErrorKind::Network => "network",
            ProviderErrorKind::Provider => "provider",
        };
        f.write_str(s)
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Error kinds surfaced to callers, per spec §7.
#[derive(Error, Debug)]
pub enum AutoscaleError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("provider error ({kind}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
    },

    #[error("fatal invariant breach: {0}")]
    Fatal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AutoscaleError>;

impl AutoscaleError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AutoscaleError::Validation(vec![FieldError {
            field: field.to_string(),
            message: message.into(),
        }])
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AutoscaleError::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        AutoscaleError::Conflict(what.into())
    }

    pub fn provider(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        AutoscaleError::Provider {
            kind,
            message: message.into(),
        }
    }

    /// Whether retrying the same call without intervention might succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            AutoscaleError::Transport(_)
                | AutoscaleError::Provider {
                    kind: ProviderErrorKind::RateLimited | ProviderErrorKind::Network,
                    ..
                }
        )
    }
}

impl From<reqwest::Error> for AutoscaleError {
    fn from(err: reqwest::Error) -> Self {
        AutoscaleError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for AutoscaleError {
    fn from(err: serde_json::Error) -> Self {
        AutoscaleError::Decode(err.to_string())
    }
}
