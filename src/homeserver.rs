//! Homeserver snapshot and address handling.

use serde::{Deserialize, Serialize};

/// Immutable snapshot of a discovered homeserver.
///
/// Replaced wholesale by re-running flow discovery; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Homeserver {
    /// Sanitized address, e.g. `https://matrix.example.org`.
    pub address: String,
    /// Whether a password login flow is available.
    pub login_flow_available: bool,
    /// Whether a registration flow is available.
    pub registration_flow_available: bool,
    /// Whether the client must fall back to web-based auth.
    pub needs_fallback: bool,
}

/// Normalize a user-supplied homeserver address.
///
/// Trims whitespace, lowercases, prepends `https://` when no scheme is given
/// and strips any trailing slash.
pub fn sanitize_address(raw: &str) -> String {
    let trimmed = raw.trim().to_lowercase();
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed
    } else {
        format!("https://{trimmed}")
    };
    with_scheme.trim_end_matches('/').to_string()
}

/// Split a fully-qualified `@user:domain` identifier into its parts.
///
/// Returns `None` for anything that is not a full user identifier, in which
/// case the caller treats the input as a bare localpart.
pub fn split_user_id(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix('@')?;
    let (localpart, domain) = rest.split_once(':')?;
    if localpart.is_empty() || domain.is_empty() {
        return None;
    }
    Some((localpart, domain))
}
