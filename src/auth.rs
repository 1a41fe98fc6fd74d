//! External authentication collaborators.
//!
//! The protocol SDK behind these traits owns the actual multi-step
//! registration/login exchanges; this crate only orchestrates them.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::AuthError;
use crate::homeserver::Homeserver;

/// Matrix error codes the flow inspects.
pub mod errcode {
    pub const USER_IN_USE: &str = "M_USER_IN_USE";
    pub const INVALID_USERNAME: &str = "M_INVALID_USERNAME";
    pub const EXCLUSIVE_RESOURCE: &str = "M_EXCLUSIVE_RESOURCE";
    pub const FORBIDDEN: &str = "M_FORBIDDEN";
}

/// Structured protocol error returned by the remote server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerApiError {
    pub errcode: String,
    pub message: String,
}

impl std::fmt::Display for ServerApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.errcode, self.message)
    }
}

/// Which flow a controller is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Login,
    Register,
}

/// An authenticated session returned on successful account creation.
#[derive(Debug, Clone)]
pub struct AccountSession {
    /// Fully-qualified user id, e.g. `@alice:example.org`.
    pub user_id: String,
    pub access_token: SecretString,
    pub device_id: String,
}

/// Outcome of a registration wizard step.
#[derive(Debug, Clone)]
pub enum RegistrationOutcome {
    /// Registration finished; the session is live.
    Complete(AccountSession),
    /// The server requires terms acceptance before completing.
    TermsRequired,
}

/// Discovers the supported auth flows for a homeserver.
#[async_trait]
pub trait AuthenticationService: Send + Sync {
    /// Query `address` for its supported flows and return a fresh snapshot.
    async fn start_flow(&self, kind: FlowKind, address: &str) -> Result<Homeserver, AuthError>;
}

/// The external registration wizard for the currently selected homeserver.
#[async_trait]
pub trait RegistrationWizard: Send + Sync {
    /// Check the supplied username's format and availability.
    async fn registration_available(&self, username: &str) -> Result<(), AuthError>;

    /// Create an account. `invite_code` is forwarded when the server gates
    /// registration behind a token.
    async fn create_account(
        &self,
        username: &str,
        password: &SecretString,
        device_display_name: &str,
        invite_code: Option<&str>,
    ) -> Result<RegistrationOutcome, AuthError>;

    /// Accept the server's terms of service and continue the flow.
    async fn accept_terms(&self) -> Result<RegistrationOutcome, AuthError>;
}
