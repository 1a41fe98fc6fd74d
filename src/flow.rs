//! Onboarding flow controller — drives homeserver selection, username
//! validation, invite-code gating, account creation and the encrypted
//! credential import side flow.
//!
//! One controller instance owns one screen's flow. Every user action is a
//! single-flight unit: starting a new remote operation bumps a generation
//! counter, and a unit applies its result only while its generation is still
//! current. A superseded unit skips the apply step silently — it cannot roll
//! back remote effects already sent.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::auth::{
    AccountSession, AuthenticationService, FlowKind, RegistrationOutcome, RegistrationWizard,
    errcode,
};
use crate::config::OnboardingConfig;
use crate::credential::{self, Credential};
use crate::crypto;
use crate::error::{AuthError, FlowError, ParseError, Result};
use crate::homeserver::{self, Homeserver};
use crate::invite::{InviteCodeClient, Validation};
use crate::prefs::PreferenceStore;

/// Decrypted blobs shorter than this are treated as a failed decrypt — a
/// wrong passphrase occasionally yields valid UTF-8 garbage.
const MIN_PLAINTEXT_LEN: usize = 4;

/// Coarse flow phase, for consumers that render progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPhase {
    Idle,
    DiscoveringServer,
    ValidatingUsername,
    AwaitingInviteCode,
    CreatingAccount,
    AcceptingTerms,
    Done,
}

impl Default for FlowPhase {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::DiscoveringServer => "discovering_server",
            Self::ValidatingUsername => "validating_username",
            Self::AwaitingInviteCode => "awaiting_invite_code",
            Self::CreatingAccount => "creating_account",
            Self::AcceptingTerms => "accepting_terms",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// Result of a username availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsernameCheck {
    /// The homeserver confirmed the username is free.
    Available,
    /// The check could not be completed (transient failure); the user may
    /// proceed and find out at account creation.
    Indeterminate,
}

/// Outcome of one passphrase attempt against an import blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Credentials recovered and applied to the flow.
    Applied(Credential),
    /// Wrong passphrase or unusable plaintext; attempts remain.
    Retry { remaining: u32 },
    /// The attempt budget is spent; the import session is over.
    Exhausted,
}

struct ImportState {
    blob: String,
    attempts: u32,
}

#[derive(Default)]
struct FlowState {
    phase: FlowPhase,
    homeserver: Option<Homeserver>,
    prefill_username: Option<String>,
    import: Option<ImportState>,
}

/// Orchestrates the registration/login onboarding flow.
pub struct OnboardingFlowController {
    kind: FlowKind,
    auth: Arc<dyn AuthenticationService>,
    wizard: Arc<dyn RegistrationWizard>,
    prefs: Arc<dyn PreferenceStore>,
    config: OnboardingConfig,
    admin_token: Option<SecretString>,
    state: RwLock<FlowState>,
    generation: AtomicU64,
}

impl OnboardingFlowController {
    pub fn new(
        kind: FlowKind,
        auth: Arc<dyn AuthenticationService>,
        wizard: Arc<dyn RegistrationWizard>,
        prefs: Arc<dyn PreferenceStore>,
        config: OnboardingConfig,
    ) -> Self {
        Self {
            kind,
            auth,
            wizard,
            prefs,
            config,
            admin_token: None,
            state: RwLock::new(FlowState::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Supply the admin token used by [`Self::fetch_invite_link`].
    pub fn with_admin_token(mut self, token: SecretString) -> Self {
        self.admin_token = Some(token);
        self
    }

    // ── Snapshot accessors ─────────────────────────────────────────

    pub async fn phase(&self) -> FlowPhase {
        self.state.read().await.phase
    }

    pub async fn homeserver(&self) -> Option<Homeserver> {
        self.state.read().await.homeserver.clone()
    }

    /// Username pre-filled by a credential import or availability check.
    pub async fn prefill_username(&self) -> Option<String> {
        self.state.read().await.prefill_username.clone()
    }

    // ── Single-flight bookkeeping ──────────────────────────────────

    fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn set_phase_if_current(&self, generation: u64, phase: FlowPhase) {
        if self.is_current(generation) {
            self.state.write().await.phase = phase;
        }
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, AuthError>>,
    {
        match tokio::time::timeout(self.config.request_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(FlowError::Network("request timed out".to_string())),
        }
    }

    // ── Homeserver selection ───────────────────────────────────────

    /// Sanitize and discover `raw`, updating the stored snapshot and the
    /// last-used preference. Short-circuits when the address is unchanged.
    pub async fn select_homeserver(&self, raw: &str) -> Result<Homeserver> {
        let address = homeserver::sanitize_address(raw);
        {
            let state = self.state.read().await;
            if let Some(hs) = &state.homeserver {
                if hs.address == address {
                    return Ok(hs.clone());
                }
            }
        }

        let generation = self.begin();
        self.state.write().await.phase = FlowPhase::DiscoveringServer;

        match self.with_timeout(self.auth.start_flow(self.kind, &address)).await {
            Ok(hs) => {
                if self.is_current(generation) {
                    {
                        let mut state = self.state.write().await;
                        state.homeserver = Some(hs.clone());
                        state.phase = FlowPhase::Idle;
                    }
                    if let Err(e) = self.prefs.set_last_homeserver(&hs.address).await {
                        tracing::warn!(error = %e, "failed to persist last homeserver");
                    }
                } else {
                    tracing::debug!(address = %address, "discovery superseded, discarding result");
                }
                Ok(hs)
            }
            Err(e) => {
                self.set_phase_if_current(generation, FlowPhase::Idle).await;
                Err(e)
            }
        }
    }

    /// Re-select the homeserver remembered from the previous session, if any.
    pub async fn restore_last_homeserver(&self) -> Result<Option<Homeserver>> {
        match self.prefs.last_homeserver().await {
            Ok(Some(address)) => self.select_homeserver(&address).await.map(Some),
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read last homeserver preference");
                Ok(None)
            }
        }
    }

    // ── Username validation ────────────────────────────────────────

    /// Check a username's availability.
    ///
    /// A fully-qualified `@user:domain` first re-selects the homeserver for
    /// `domain`, then checks the localpart against it.
    pub async fn submit_username(&self, raw: &str) -> Result<UsernameCheck> {
        match homeserver::split_user_id(raw) {
            Some((localpart, domain)) => {
                let localpart = localpart.to_string();
                let domain = domain.to_string();
                self.select_homeserver(&domain).await?;
                self.confirm_availability(&localpart).await
            }
            None => self.confirm_availability(raw.trim()).await,
        }
    }

    async fn confirm_availability(&self, username: &str) -> Result<UsernameCheck> {
        let generation = self.begin();
        self.state.write().await.phase = FlowPhase::ValidatingUsername;

        let result = self
            .with_timeout(self.wizard.registration_available(username))
            .await;
        match result {
            Ok(()) => {
                if self.is_current(generation) {
                    let mut state = self.state.write().await;
                    state.prefill_username = Some(username.to_string());
                    state.phase = FlowPhase::Idle;
                }
                Ok(UsernameCheck::Available)
            }
            Err(FlowError::Server(e)) if is_unavailable_errcode(&e.errcode) => {
                self.set_phase_if_current(generation, FlowPhase::Idle).await;
                Err(FlowError::UsernameUnavailable(e.message))
            }
            Err(e) => {
                // Transient failure: report indeterminate instead of silently
                // dropping it, so the caller can decide whether to block.
                tracing::warn!(error = %e, username, "availability check failed");
                self.set_phase_if_current(generation, FlowPhase::Idle).await;
                Ok(UsernameCheck::Indeterminate)
            }
        }
    }

    // ── Invite code and account creation ───────────────────────────

    /// Fetch the server's invite link using the configured admin token.
    pub async fn fetch_invite_link(&self) -> Option<String> {
        let token = self.admin_token.as_ref()?;
        let client = self.invite_client().await.ok()?;
        client.fetch_invite_link(token).await
    }

    /// Validate `code` and, only if it is redeemable, create the account.
    pub async fn submit_invite_code(
        &self,
        username: &str,
        password: &SecretString,
        code: &str,
    ) -> Result<AccountSession> {
        let generation = self.begin();
        self.state.write().await.phase = FlowPhase::AwaitingInviteCode;

        let client = self.invite_client().await?;
        match client.validate(code).await {
            Validation::Valid => self.create_account(username, password, Some(code)).await,
            Validation::Invalid => {
                self.set_phase_if_current(generation, FlowPhase::Idle).await;
                Err(FlowError::InviteCodeInvalid)
            }
            Validation::Indeterminate => {
                self.set_phase_if_current(generation, FlowPhase::Idle).await;
                Err(FlowError::Network(
                    "invite code service unreachable".to_string(),
                ))
            }
        }
    }

    /// Create an account via the registration wizard, accepting terms when
    /// the server requires them. A redeemed invite code is confirmed
    /// best-effort after success.
    pub async fn create_account(
        &self,
        username: &str,
        password: &SecretString,
        invite_code: Option<&str>,
    ) -> Result<AccountSession> {
        let generation = self.begin();
        self.state.write().await.phase = FlowPhase::CreatingAccount;

        let outcome = self
            .with_timeout(self.wizard.create_account(
                username,
                password,
                &self.config.device_display_name,
                invite_code,
            ))
            .await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.set_phase_if_current(generation, FlowPhase::Idle).await;
                return Err(e);
            }
        };

        let session = match outcome {
            RegistrationOutcome::Complete(session) => session,
            RegistrationOutcome::TermsRequired => {
                self.set_phase_if_current(generation, FlowPhase::AcceptingTerms)
                    .await;
                match self.with_timeout(self.wizard.accept_terms()).await {
                    Ok(RegistrationOutcome::Complete(session)) => session,
                    Ok(RegistrationOutcome::TermsRequired) => {
                        self.set_phase_if_current(generation, FlowPhase::Idle).await;
                        return Err(FlowError::Unknown);
                    }
                    Err(e) => {
                        self.set_phase_if_current(generation, FlowPhase::Idle).await;
                        return Err(e);
                    }
                }
            }
        };

        // The account exists either way; recording the token is not tied to
        // whether this unit is still current.
        if let Some(code) = invite_code.filter(|c| !c.is_empty()) {
            self.spawn_confirm(code, &session).await;
        }

        self.set_phase_if_current(generation, FlowPhase::Done).await;
        Ok(session)
    }

    async fn invite_client(&self) -> Result<InviteCodeClient> {
        let state = self.state.read().await;
        let hs = state
            .homeserver
            .as_ref()
            .ok_or(FlowError::InvalidHomeserver)?;
        Ok(InviteCodeClient::new(
            hs.address.clone(),
            self.config.request_timeout,
        ))
    }

    async fn spawn_confirm(&self, code: &str, session: &AccountSession) {
        let client = match self.invite_client().await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "cannot confirm invite code without a homeserver");
                return;
            }
        };
        let code = code.to_string();
        let token = SecretString::from(session.access_token.expose_secret().to_string());
        tokio::spawn(async move {
            client.confirm(&code, &token).await;
        });
    }

    // ── Encrypted credential import ────────────────────────────────

    /// Start an import session over the contents of an export file,
    /// resetting the passphrase attempt counter.
    pub async fn begin_import(&self, file_contents: &str) {
        let mut state = self.state.write().await;
        state.import = Some(ImportState {
            blob: file_contents.trim().to_string(),
            attempts: 0,
        });
    }

    /// Attempt one passphrase against the current import session.
    ///
    /// On success the recovered credential is applied (homeserver selected,
    /// username pre-filled) and the session ends. Wrong passphrases consume
    /// one attempt each; the third failure ends the session as
    /// [`ImportOutcome::Exhausted`]. A blob that decrypts to more than one
    /// credential is ambiguous and ends the session with a parse error.
    pub async fn try_import_passphrase(&self, passphrase: &SecretString) -> Result<ImportOutcome> {
        let blob = {
            let state = self.state.read().await;
            match &state.import {
                Some(import) => import.blob.clone(),
                None => return Err(FlowError::Unknown),
            }
        };

        let plaintext = match crypto::open(&blob, passphrase, self.config.pbkdf2_iterations) {
            Ok(pt) if pt.trim().chars().count() >= MIN_PLAINTEXT_LEN => pt,
            _ => return self.record_failed_attempt().await,
        };

        let mut credentials = credential::parse(&plaintext);
        match credentials.len() {
            0 => {
                tracing::debug!("decrypted blob contained no credential pattern");
                self.record_failed_attempt().await
            }
            1 => {
                let cred = credentials.remove(0);
                self.select_homeserver(&cred.homeserver_address).await?;
                {
                    let mut state = self.state.write().await;
                    state.prefill_username = Some(cred.username.clone());
                    state.import = None;
                }
                Ok(ImportOutcome::Applied(cred))
            }
            count => {
                self.state.write().await.import = None;
                Err(ParseError::Ambiguous { count }.into())
            }
        }
    }

    async fn record_failed_attempt(&self) -> Result<ImportOutcome> {
        let mut state = self.state.write().await;
        let Some(import) = state.import.as_mut() else {
            return Err(FlowError::Unknown);
        };
        import.attempts += 1;
        let attempts = import.attempts;
        let max = self.config.max_passphrase_attempts;
        if attempts >= max {
            state.import = None;
            Ok(ImportOutcome::Exhausted)
        } else {
            Ok(ImportOutcome::Retry {
                remaining: max - attempts,
            })
        }
    }

    /// Seal credentials into the export blob format the import flow consumes.
    pub fn export_credentials(
        &self,
        credentials: &[Credential],
        passphrase: &SecretString,
    ) -> Result<String> {
        crypto::seal(
            &credential::render(credentials),
            passphrase,
            self.config.pbkdf2_iterations,
        )
        .map_err(Into::into)
    }
}

fn is_unavailable_errcode(code: &str) -> bool {
    code == errcode::USER_IN_USE
        || code == errcode::INVALID_USERNAME
        || code == errcode::EXCLUSIVE_RESOURCE
}
