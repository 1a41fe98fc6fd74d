//! Error types for the onboarding core.

use crate::auth::ServerApiError;

/// Opaque crypto failure.
///
/// Malformed hex, bad key/IV length, padding validation failure and invalid
/// UTF-8 all collapse into this one kind so callers cannot distinguish a
/// wrong passphrase from a corrupt blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("crypto operation failed")]
pub struct CryptoError;

/// Credential blob parse failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no credential pattern matched")]
    NoMatch,

    #[error("ambiguous credential blob: {count} matches")]
    Ambiguous { count: usize },
}

/// Errors from the external authentication collaborators.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("server error: {0}")]
    Server(ServerApiError),

    #[error("invalid homeserver")]
    InvalidHomeserver,
}

/// Invite-code client transport/parse errors.
///
/// Never escapes the invite client: fetch and validate downgrade these to
/// their negative/indeterminate results, confirm logs and drops them.
#[derive(Debug, thiserror::Error)]
pub enum InviteError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    Body(String),
}

/// Preference store errors.
#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Flow-level error taxonomy surfaced to the consumer.
///
/// Every failure is scoped to the current flow; nothing here is fatal to the
/// process and the flow stays retryable.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("server error: {0}")]
    Server(ServerApiError),

    #[error("invalid homeserver")]
    InvalidHomeserver,

    #[error("username unavailable: {0}")]
    UsernameUnavailable(String),

    #[error("invite code invalid")]
    InviteCodeInvalid,

    #[error("decryption failed")]
    Crypto(#[from] CryptoError),

    #[error("credential parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("unknown error")]
    Unknown,
}

impl From<AuthError> for FlowError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Network(reason) => Self::Network(reason),
            AuthError::Server(e) => Self::Server(e),
            AuthError::InvalidHomeserver => Self::InvalidHomeserver,
        }
    }
}

/// Result type alias for flow operations.
pub type Result<T> = std::result::Result<T, FlowError>;
