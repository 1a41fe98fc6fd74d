//! Credential blob parsing and rendering.
//!
//! Export files are plaintext UTF-8 with one `@username:homeserver` pair per
//! line. The parser returns every match; policy for zero or multiple matches
//! belongs to the flow controller.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static CREDENTIAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9]+):([^\n\r]+)").unwrap());

/// A username / homeserver pair recovered from a decrypted export file.
///
/// Consumed once to pre-fill the registration/login request, then discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub homeserver_address: String,
}

/// Extract all `@username:homeserver` candidates from a plaintext blob.
pub fn parse(plaintext: &str) -> Vec<Credential> {
    CREDENTIAL_RE
        .captures_iter(plaintext)
        .map(|caps| Credential {
            username: caps[1].to_string(),
            homeserver_address: caps[2].trim().to_string(),
        })
        .collect()
}

/// Render credentials into the line format [`parse`] consumes.
pub fn render(credentials: &[Credential]) -> String {
    credentials
        .iter()
        .map(|c| format!("@{}:{}", c.username, c.homeserver_address))
        .collect::<Vec<_>>()
        .join("\n")
}
