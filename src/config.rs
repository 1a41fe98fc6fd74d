//! Configuration types.

use std::time::Duration;

/// Onboarding flow configuration.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// Uniform timeout applied to every remote call (wizard, discovery,
    /// invite-code admin endpoints).
    pub request_timeout: Duration,
    /// Passphrase attempts allowed per credential-import session.
    pub max_passphrase_attempts: u32,
    /// PBKDF2-HMAC-SHA256 iteration count for sealed credential blobs.
    pub pbkdf2_iterations: u32,
    /// Device display name sent with account creation.
    pub device_display_name: String,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(20),
            max_passphrase_attempts: 3,
            pbkdf2_iterations: 100_000,
            device_display_name: "mx-onboard".to_string(),
        }
    }
}
