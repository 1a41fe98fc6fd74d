//! Integration tests for the registration flow: discovery, username
//! validation, invite-code gating, account creation and cancellation.
//!
//! External collaborators are in-process stubs behind the `auth` traits; the
//! invite-code admin endpoints are served by mockito.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::Mutex;

use mx_onboard::auth::{
    AccountSession, AuthenticationService, FlowKind, RegistrationOutcome, RegistrationWizard,
    ServerApiError, errcode,
};
use mx_onboard::config::OnboardingConfig;
use mx_onboard::error::{AuthError, FlowError};
use mx_onboard::flow::{FlowPhase, OnboardingFlowController, UsernameCheck};
use mx_onboard::homeserver::Homeserver;
use mx_onboard::prefs::{MemoryPreferences, PreferenceStore};

/// Discovery stub: every address succeeds, optionally after a per-address
/// delay (for cancellation tests).
#[derive(Default)]
struct StubAuth {
    delays: HashMap<String, Duration>,
}

#[async_trait]
impl AuthenticationService for StubAuth {
    async fn start_flow(&self, _kind: FlowKind, address: &str) -> Result<Homeserver, AuthError> {
        if let Some(delay) = self.delays.get(address) {
            tokio::time::sleep(*delay).await;
        }
        Ok(Homeserver {
            address: address.to_string(),
            login_flow_available: true,
            registration_flow_available: true,
            needs_fallback: false,
        })
    }
}

/// Registration wizard stub with a configurable taken-username list and an
/// optional terms stage.
#[derive(Default)]
struct StubWizard {
    taken: Vec<String>,
    availability_outage: bool,
    require_terms: bool,
    created: Mutex<Vec<(String, Option<String>)>>,
    pending: Mutex<Option<String>>,
}

fn session_for(username: &str) -> AccountSession {
    AccountSession {
        user_id: format!("@{username}:matrix.org"),
        access_token: SecretString::from("syt_stub_token".to_string()),
        device_id: "STUBDEV".to_string(),
    }
}

#[async_trait]
impl RegistrationWizard for StubWizard {
    async fn registration_available(&self, username: &str) -> Result<(), AuthError> {
        if self.availability_outage {
            return Err(AuthError::Network("connection reset".to_string()));
        }
        if self.taken.iter().any(|t| t == username) {
            return Err(AuthError::Server(ServerApiError {
                errcode: errcode::USER_IN_USE.to_string(),
                message: "User ID already taken".to_string(),
            }));
        }
        Ok(())
    }

    async fn create_account(
        &self,
        username: &str,
        _password: &SecretString,
        _device_display_name: &str,
        invite_code: Option<&str>,
    ) -> Result<RegistrationOutcome, AuthError> {
        self.created
            .lock()
            .await
            .push((username.to_string(), invite_code.map(str::to_string)));
        if self.require_terms {
            *self.pending.lock().await = Some(username.to_string());
            return Ok(RegistrationOutcome::TermsRequired);
        }
        Ok(RegistrationOutcome::Complete(session_for(username)))
    }

    async fn accept_terms(&self) -> Result<RegistrationOutcome, AuthError> {
        let username = self
            .pending
            .lock()
            .await
            .take()
            .ok_or_else(|| AuthError::Network("no registration in progress".to_string()))?;
        Ok(RegistrationOutcome::Complete(session_for(&username)))
    }
}

fn test_config() -> OnboardingConfig {
    OnboardingConfig {
        request_timeout: Duration::from_secs(2),
        pbkdf2_iterations: 1_000,
        ..Default::default()
    }
}

fn controller(auth: StubAuth, wizard: StubWizard) -> OnboardingFlowController {
    OnboardingFlowController::new(
        FlowKind::Register,
        Arc::new(auth),
        Arc::new(wizard),
        Arc::new(MemoryPreferences::default()),
        test_config(),
    )
}

#[tokio::test]
async fn end_to_end_registration() {
    let flow = controller(StubAuth::default(), StubWizard::default());

    flow.select_homeserver("matrix.org").await.unwrap();
    let hs = flow.homeserver().await.unwrap();
    assert_eq!(hs.address, "https://matrix.org");
    assert!(hs.registration_flow_available);

    let check = flow.submit_username("newuser").await.unwrap();
    assert_eq!(check, UsernameCheck::Available);
    assert_eq!(flow.prefill_username().await.as_deref(), Some("newuser"));

    let password = SecretString::from("Secret123!".to_string());
    let session = flow.create_account("newuser", &password, None).await.unwrap();
    assert_eq!(session.user_id, "@newuser:matrix.org");
    assert_eq!(flow.phase().await, FlowPhase::Done);
}

#[tokio::test]
async fn discovery_persists_last_homeserver() {
    let prefs = Arc::new(MemoryPreferences::default());
    let flow = OnboardingFlowController::new(
        FlowKind::Register,
        Arc::new(StubAuth::default()),
        Arc::new(StubWizard::default()),
        Arc::clone(&prefs) as Arc<dyn PreferenceStore>,
        test_config(),
    );

    flow.select_homeserver("Example.Org/").await.unwrap();
    assert_eq!(
        prefs.last_homeserver().await.unwrap().as_deref(),
        Some("https://example.org")
    );
}

#[tokio::test]
async fn restore_reselects_previous_homeserver() {
    let prefs = Arc::new(MemoryPreferences::default());
    prefs.set_last_homeserver("https://matrix.org").await.unwrap();

    let flow = OnboardingFlowController::new(
        FlowKind::Login,
        Arc::new(StubAuth::default()),
        Arc::new(StubWizard::default()),
        prefs,
        test_config(),
    );

    let restored = flow.restore_last_homeserver().await.unwrap();
    assert_eq!(restored.unwrap().address, "https://matrix.org");
    assert!(flow.homeserver().await.is_some());
}

#[tokio::test]
async fn full_user_id_switches_homeserver_first() {
    let flow = controller(StubAuth::default(), StubWizard::default());
    flow.select_homeserver("matrix.org").await.unwrap();

    let check = flow.submit_username("@alice:example.org").await.unwrap();
    assert_eq!(check, UsernameCheck::Available);
    assert_eq!(flow.homeserver().await.unwrap().address, "https://example.org");
    assert_eq!(flow.prefill_username().await.as_deref(), Some("alice"));
}

#[tokio::test]
async fn taken_username_surfaces_unavailable() {
    let wizard = StubWizard {
        taken: vec!["taken".to_string()],
        ..Default::default()
    };
    let flow = controller(StubAuth::default(), wizard);
    flow.select_homeserver("matrix.org").await.unwrap();

    let err = flow.submit_username("taken").await.unwrap_err();
    match err {
        FlowError::UsernameUnavailable(reason) => {
            assert_eq!(reason, "User ID already taken");
        }
        other => panic!("expected UsernameUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn availability_outage_reports_indeterminate() {
    let wizard = StubWizard {
        availability_outage: true,
        ..Default::default()
    };
    let flow = controller(StubAuth::default(), wizard);
    flow.select_homeserver("matrix.org").await.unwrap();

    let check = flow.submit_username("newuser").await.unwrap();
    assert_eq!(check, UsernameCheck::Indeterminate);
    // An indeterminate check must not pre-fill the username.
    assert_eq!(flow.prefill_username().await, None);
}

#[tokio::test]
async fn terms_stage_is_accepted_before_completion() {
    let wizard = StubWizard {
        require_terms: true,
        ..Default::default()
    };
    let flow = controller(StubAuth::default(), wizard);
    flow.select_homeserver("matrix.org").await.unwrap();

    let password = SecretString::from("Secret123!".to_string());
    let session = flow.create_account("newuser", &password, None).await.unwrap();
    assert_eq!(session.user_id, "@newuser:matrix.org");
    assert_eq!(flow.phase().await, FlowPhase::Done);
}

#[tokio::test]
async fn latest_homeserver_selection_wins() {
    let mut delays = HashMap::new();
    delays.insert("https://a.example".to_string(), Duration::from_millis(200));
    delays.insert("https://b.example".to_string(), Duration::from_millis(10));
    let flow = controller(StubAuth { delays }, StubWizard::default());

    // "a" is issued first but resolves last; its result must not apply.
    let (a, b) = tokio::join!(
        flow.select_homeserver("a.example"),
        flow.select_homeserver("b.example"),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(flow.homeserver().await.unwrap().address, "https://b.example");
}

#[tokio::test]
async fn invite_code_gates_account_creation() {
    let mut server = mockito::Server::new_async().await;
    let validate_mock = server
        .mock("GET", "/_synapse/admin/v1/registration_tokens/CODE42")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    let confirm_mock = server
        .mock("GET", "/_synapse/admin/v1/record_registration_token/CODE42")
        .match_header("authorization", "Bearer syt_stub_token")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let flow = controller(StubAuth::default(), StubWizard::default());
    flow.select_homeserver(&server.url()).await.unwrap();

    let password = SecretString::from("Secret123!".to_string());
    let session = flow
        .submit_invite_code("newuser", &password, "CODE42")
        .await
        .unwrap();
    assert_eq!(session.user_id, "@newuser:matrix.org");
    validate_mock.assert_async().await;

    // Confirmation is fired on a detached task; give it a moment.
    for _ in 0..40 {
        if confirm_mock.matched_async().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    confirm_mock.assert_async().await;
}

#[tokio::test]
async fn invalid_invite_code_blocks_creation() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/_synapse/admin/v1/registration_tokens/BAD")
        .with_status(404)
        .with_body(r#"{"errcode":"M_NOT_FOUND","error":"Token not found"}"#)
        .create_async()
        .await;

    let wizard = Arc::new(StubWizard::default());
    let flow = OnboardingFlowController::new(
        FlowKind::Register,
        Arc::new(StubAuth::default()),
        Arc::clone(&wizard) as Arc<dyn RegistrationWizard>,
        Arc::new(MemoryPreferences::default()),
        test_config(),
    );
    flow.select_homeserver(&server.url()).await.unwrap();

    let password = SecretString::from("Secret123!".to_string());
    let err = flow
        .submit_invite_code("newuser", &password, "BAD")
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::InviteCodeInvalid));
    assert!(wizard.created.lock().await.is_empty());
}

#[tokio::test]
async fn unreachable_invite_service_is_a_network_error() {
    let flow = controller(StubAuth::default(), StubWizard::default());
    // Nothing listens on this port, so validation is indeterminate.
    flow.select_homeserver("http://127.0.0.1:9").await.unwrap();

    let password = SecretString::from("Secret123!".to_string());
    let err = flow
        .submit_invite_code("newuser", &password, "CODE42")
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Network(_)));
}
