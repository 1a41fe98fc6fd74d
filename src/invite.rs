//! Invite-code client — three calls against the Synapse admin API.
//!
//! Fetch and validate downgrade transport failures to their negative or
//! indeterminate results; confirm is fire-and-forget. Callers never see an
//! `InviteError` directly.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::InviteError;

const REGISTRATION_LINK_PATH: &str = "/_synapse/admin/v1/registration_link";
const REGISTRATION_TOKENS_PATH: &str = "/_synapse/admin/v1/registration_tokens";
const RECORD_TOKEN_PATH: &str = "/_synapse/admin/v1/record_registration_token";

/// Three-valued invite-code validation result.
///
/// `Indeterminate` means the admin endpoint could not be consulted (transport
/// failure or non-JSON body) — the code may still be usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid,
    Indeterminate,
}

/// Token-authenticated client for the homeserver's invite-code endpoints.
#[derive(Clone)]
pub struct InviteCodeClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl InviteCodeClient {
    /// `base_url` is the sanitized homeserver address, no trailing slash.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    async fn get_json(
        &self,
        path: &str,
        token: Option<&SecretString>,
    ) -> Result<serde_json::Value, InviteError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.get(&url).timeout(self.timeout);
        if let Some(token) = token {
            request = request.bearer_auth(token.expose_secret());
        }
        let response = request
            .send()
            .await
            .map_err(|e| InviteError::Transport(e.to_string()))?;
        // Error statuses still carry a JSON body we inspect (e.g. an unknown
        // token answers 404 with an `error` field).
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| InviteError::Body(e.to_string()))
    }

    /// Fetch the server's invite link, if one is configured.
    ///
    /// Any failure, including a response without the `app_invite_link` field,
    /// resolves to `None`.
    pub async fn fetch_invite_link(&self, token: &SecretString) -> Option<String> {
        match self.get_json(REGISTRATION_LINK_PATH, Some(token)).await {
            Ok(body) => body
                .get("app_invite_link")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            Err(e) => {
                tracing::warn!(error = %e, "invite link fetch failed");
                None
            }
        }
    }

    /// Check whether `code` is currently redeemable. Side-effect-free.
    pub async fn validate(&self, code: &str) -> Validation {
        let path = format!("{REGISTRATION_TOKENS_PATH}/{code}");
        match self.get_json(&path, None).await {
            Ok(body) if body.get("error").is_some() => Validation::Invalid,
            Ok(_) => Validation::Valid,
            Err(e) => {
                tracing::warn!(error = %e, "invite code validation unreachable");
                Validation::Indeterminate
            }
        }
    }

    /// Record that `code` was redeemed. Best-effort: the response is ignored
    /// and errors are logged, never surfaced.
    pub async fn confirm(&self, code: &str, token: &SecretString) {
        let path = format!("{RECORD_TOKEN_PATH}/{code}");
        if let Err(e) = self.get_json(&path, Some(token)).await {
            tracing::warn!(error = %e, "invite code confirmation failed");
        }
    }
}
