//! Integration tests for the login state machine.
//!
//! The controller is driven against a scripted backend and in-memory
//! storage, so every transition and every persisted key can be checked
//! without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use passage::prelude::*;
use passage_protocol::CallbackPayload;

// =========================================================================
// Test doubles
// =========================================================================

/// A backend whose replies are queued up front. An empty queue means
/// success.
#[derive(Default)]
struct ScriptedApi {
    callback_replies: Mutex<VecDeque<Result<UserAttributes, ApiError>>>,
    validate_replies: Mutex<VecDeque<Result<bool, ApiError>>>,
    fetch_replies: Mutex<VecDeque<Result<UserAttributes, ApiError>>>,
    payloads: Mutex<Vec<CallbackPayload>>,
    callback_calls: AtomicUsize,
    validate_calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedApi {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn reply_callback(&self, reply: Result<UserAttributes, ApiError>) {
        self.callback_replies.lock().unwrap().push_back(reply);
    }

    fn reply_validate(&self, reply: Result<bool, ApiError>) {
        self.validate_replies.lock().unwrap().push_back(reply);
    }

    fn reply_fetch(&self, reply: Result<UserAttributes, ApiError>) {
        self.fetch_replies.lock().unwrap().push_back(reply);
    }
}

impl AuthApi for ScriptedApi {
    async fn submit_callback(&self, payload: &CallbackPayload) -> Result<UserAttributes, ApiError> {
        self.callback_calls.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.clone());
        let reply = self.callback_replies.lock().unwrap().pop_front();
        tokio::time::sleep(self.delay).await;
        reply.unwrap_or_else(|| Ok(UserAttributes::default()))
    }

    async fn validate_session(&self, _session: &SessionId) -> Result<bool, ApiError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.validate_replies.lock().unwrap().pop_front();
        tokio::time::sleep(self.delay).await;
        reply.unwrap_or(Ok(true))
    }

    async fn fetch_user(&self, _session: &SessionId) -> Result<UserAttributes, ApiError> {
        let reply = self.fetch_replies.lock().unwrap().pop_front();
        tokio::time::sleep(self.delay).await;
        reply.unwrap_or_else(|| Ok(UserAttributes::default()))
    }
}

/// Deterministic ids: `1_seq`, `2_seq`, ...
#[derive(Default)]
struct SeqIds(AtomicUsize);

impl SessionIdGenerator for SeqIds {
    fn generate(&self) -> SessionId {
        let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        SessionId::new(format!("{n}_seq"))
    }
}

#[derive(Clone, Default)]
struct Recorder {
    transitions: Arc<Mutex<Vec<(String, String)>>>,
    errors: Arc<Mutex<Vec<ErrorKind>>>,
}

impl AuthObserver for Recorder {
    fn on_transition(&self, from: &AuthState, to: &AuthState) {
        self.transitions
            .lock()
            .unwrap()
            .push((from.name().to_string(), to.name().to_string()));
    }

    fn on_error(&self, error: &AuthError) {
        self.errors.lock().unwrap().push(error.kind());
    }
}

#[derive(Clone, Default)]
struct Visits(Arc<Mutex<Vec<Url>>>);

impl Navigator for Visits {
    fn navigate(&self, url: &Url) {
        self.0.lock().unwrap().push(url.clone());
    }
}

// =========================================================================
// Harness
// =========================================================================

const SESSION_KEY: &str = "passage.session";
const USER_KEY: &str = "passage.user_data";

struct Harness {
    auth: AuthController<Arc<ScriptedApi>, SeqIds>,
    api: Arc<ScriptedApi>,
    storage: Arc<MemoryStorage>,
    recorder: Recorder,
    visits: Visits,
}

fn config() -> AuthConfig {
    AuthConfig::default()
        .with_provider_login_url("https://idp.example/login?lang=en")
        .with_app_token("app-token")
        .with_secret_key("secret")
        .with_api("https://api.example", "api-key")
}

fn harness_with(api: ScriptedApi, storage: Arc<MemoryStorage>) -> Harness {
    let api = Arc::new(api);
    let recorder = Recorder::default();
    let visits = Visits::default();
    let auth = AuthController::builder(config())
        .id_generator(SeqIds::default())
        .observer(recorder.clone())
        .navigator(visits.clone())
        .build(Arc::clone(&storage), Arc::clone(&api))
        .unwrap();
    Harness {
        auth,
        api,
        storage,
        recorder,
        visits,
    }
}

fn harness(api: ScriptedApi) -> Harness {
    harness_with(api, Arc::new(MemoryStorage::new()))
}

fn callback(session: &SessionId) -> ProviderCallback {
    ProviderCallback {
        session: session.clone(),
        email: "ana@example.com".into(),
        name: "Ana".into(),
        phone: Some("6184654546".into()),
        profile_img: None,
    }
}

/// Runs the whole flow up to `Authenticated`.
async fn login(h: &Harness) -> UserRecord {
    h.auth.initialize().await;
    h.auth.pre_login().await.unwrap();
    let session = h.auth.persisted_session().unwrap();
    h.auth.handle_callback(callback(&session)).await.unwrap()
}

fn stored(h: &Harness, key: &str) -> Option<String> {
    h.storage.get(key).unwrap()
}

// =========================================================================
// Startup
// =========================================================================

#[tokio::test]
async fn test_initialize_fresh_storage_is_unauthenticated() {
    let h = harness(ScriptedApi::default());
    assert_eq!(h.auth.state(), AuthState::Initializing);
    assert!(h.auth.is_loading());

    let state = h.auth.initialize().await;

    assert_eq!(state, AuthState::Unauthenticated);
    assert!(!h.auth.is_authenticated());
    assert!(!h.auth.is_loading());
}

#[tokio::test]
async fn test_initialize_restores_persisted_login_without_network() {
    let storage = Arc::new(MemoryStorage::new());
    let first = harness_with(ScriptedApi::default(), Arc::clone(&storage));
    let user = login(&first).await;

    let second = harness_with(ScriptedApi::default(), storage);
    let state = second.auth.initialize().await;

    assert_eq!(state, AuthState::Authenticated(user));
    assert_eq!(second.api.validate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_initialize_ignores_record_for_other_session() {
    let storage = Arc::new(MemoryStorage::new());
    let first = harness_with(ScriptedApi::default(), Arc::clone(&storage));
    login(&first).await;
    storage.set(SESSION_KEY, "someone_else").unwrap();

    let second = harness_with(ScriptedApi::default(), storage);

    assert_eq!(second.auth.initialize().await, AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_initialize_twice_keeps_current_state() {
    let h = harness(ScriptedApi::default());
    h.auth.initialize().await;
    h.auth.pre_login().await.unwrap();

    let state = h.auth.initialize().await;

    assert!(state.is_redirecting());
}

#[test]
fn test_build_with_missing_app_token_fails() {
    let result = AuthController::builder(AuthConfig::default())
        .build(MemoryStorage::new(), ScriptedApi::default());

    assert!(matches!(result, Err(AuthError::Configuration(_))));
}

// =========================================================================
// pre_login
// =========================================================================

#[tokio::test]
async fn test_pre_login_persists_id_and_redirects_with_it() {
    let h = harness(ScriptedApi::default());
    h.auth.initialize().await;

    let url = h.auth.pre_login().await.unwrap();

    let session = stored(&h, SESSION_KEY).unwrap();
    assert_eq!(session, "1_seq");
    assert!(h.auth.is_redirecting());
    assert_eq!(h.auth.redirect_url(), Some(url.clone()));

    let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert_eq!(
        query,
        vec![
            ("lang".into(), "en".into()),
            ("token_app".into(), "app-token".into()),
            ("session".into(), session),
        ]
    );
    assert_eq!(*h.visits.0.lock().unwrap(), vec![url]);
}

#[tokio::test]
async fn test_pre_login_twice_reuses_pending_redirect() {
    let h = harness(ScriptedApi::default());
    h.auth.initialize().await;

    let first = h.auth.pre_login().await.unwrap();
    let second = h.auth.pre_login().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(stored(&h, SESSION_KEY).as_deref(), Some("1_seq"));
    assert_eq!(h.visits.0.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_pre_login_before_initialize_is_rejected() {
    let h = harness(ScriptedApi::default());

    let err = h.auth.pre_login().await.unwrap_err();

    assert_eq!(
        err,
        AuthError::InvalidState {
            operation: "pre_login",
            state: "initializing"
        }
    );
    assert_eq!(stored(&h, SESSION_KEY), None);
}

#[tokio::test]
async fn test_pre_login_storage_failure_falls_back_without_navigating() {
    let h = harness_with(ScriptedApi::default(), Arc::new(MemoryStorage::with_quota(1)));
    h.auth.initialize().await;

    let err = h.auth.pre_login().await.unwrap_err();

    assert!(matches!(err, AuthError::Storage(StorageError::QuotaExceeded(_))));
    assert_eq!(h.auth.state(), AuthState::Unauthenticated);
    assert!(h.visits.0.lock().unwrap().is_empty());
    assert_eq!(*h.recorder.errors.lock().unwrap(), vec![ErrorKind::Storage]);
}

// =========================================================================
// Callback
// =========================================================================

#[tokio::test]
async fn test_callback_with_matching_session_authenticates() {
    let h = harness(ScriptedApi::default());

    let user = login(&h).await;

    assert_eq!(user.session.as_str(), "1_seq");
    assert_eq!(user.email, "ana@example.com");
    assert_eq!(h.auth.state(), AuthState::Authenticated(user.clone()));
    assert_eq!(stored(&h, SESSION_KEY).as_deref(), Some("1_seq"));
    assert!(stored(&h, USER_KEY).unwrap().contains("ana@example.com"));

    let payloads = h.api.payloads.lock().unwrap();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].token_app, "app-token");
    assert_eq!(payloads[0].secret_key, "secret");
    assert_eq!(payloads[0].phone.as_deref(), Some("6184654546"));
}

#[tokio::test]
async fn test_callback_merges_backend_attributes() {
    let api = ScriptedApi::default();
    api.reply_callback(Ok(UserAttributes {
        profile_img: Some("https://img.example/ana.png".into()),
        name: Some("Ana Lopez".into()),
        ..UserAttributes::default()
    }));
    let h = harness(api);

    let user = login(&h).await;

    assert_eq!(user.name, "Ana Lopez");
    assert_eq!(user.profile_img.as_deref(), Some("https://img.example/ana.png"));
    assert_eq!(user.phone.as_deref(), Some("6184654546"));
}

#[tokio::test]
async fn test_callback_with_other_session_is_mismatch_and_writes_nothing() {
    let h = harness(ScriptedApi::default());
    h.auth.initialize().await;
    h.auth.pre_login().await.unwrap();

    let err = h
        .auth
        .handle_callback(callback(&SessionId::new("forged")))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AuthError::SessionMismatch {
            expected: Some(SessionId::new("1_seq")),
            received: SessionId::new("forged"),
        }
    );
    assert!(matches!(
        h.auth.state(),
        AuthState::Error {
            kind: ErrorKind::SessionMismatch,
            user: None,
            ..
        }
    ));
    assert_eq!(stored(&h, SESSION_KEY).as_deref(), Some("1_seq"));
    assert_eq!(stored(&h, USER_KEY), None);
    assert_eq!(h.api.callback_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_callback_after_mismatch_can_still_complete() {
    let h = harness(ScriptedApi::default());
    h.auth.initialize().await;
    h.auth.pre_login().await.unwrap();
    let _ = h.auth.handle_callback(callback(&SessionId::new("forged"))).await;

    let user = h
        .auth
        .handle_callback(callback(&SessionId::new("1_seq")))
        .await
        .unwrap();

    assert!(h.auth.is_authenticated());
    assert_eq!(user.session.as_str(), "1_seq");
}

#[tokio::test]
async fn test_callback_without_pending_login_is_mismatch() {
    let h = harness(ScriptedApi::default());
    h.auth.initialize().await;

    let err = h
        .auth
        .handle_callback(callback(&SessionId::new("1_seq")))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::SessionMismatch { expected: None, .. }));
}

#[tokio::test]
async fn test_callback_rejected_by_backend_keeps_pending_id() {
    let api = ScriptedApi::default();
    api.reply_callback(Err(ApiError::Status {
        status: 403,
        message: "bad secret".into(),
    }));
    let h = harness(api);
    h.auth.initialize().await;
    h.auth.pre_login().await.unwrap();

    let err = h
        .auth
        .handle_callback(callback(&SessionId::new("1_seq")))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Api { status: Some(403), .. }));
    assert!(matches!(
        h.auth.state(),
        AuthState::Error {
            kind: ErrorKind::Api,
            user: None,
            ..
        }
    ));
    assert_eq!(stored(&h, SESSION_KEY).as_deref(), Some("1_seq"));
    assert_eq!(stored(&h, USER_KEY), None);
}

#[tokio::test]
async fn test_callback_bound_to_other_session_by_backend_is_mismatch() {
    let api = ScriptedApi::default();
    api.reply_callback(Ok(UserAttributes {
        session: Some(SessionId::new("server_side")),
        ..UserAttributes::default()
    }));
    let h = harness(api);
    h.auth.initialize().await;
    h.auth.pre_login().await.unwrap();

    let err = h
        .auth
        .handle_callback(callback(&SessionId::new("1_seq")))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SessionMismatch);
    assert_eq!(stored(&h, USER_KEY), None);
}

#[tokio::test]
async fn test_concurrent_callback_is_busy() {
    let h = harness(ScriptedApi::with_delay(Duration::from_millis(50)));
    h.auth.initialize().await;
    h.auth.pre_login().await.unwrap();
    let cb = callback(&SessionId::new("1_seq"));

    let (first, second) = tokio::join!(
        h.auth.handle_callback(cb.clone()),
        h.auth.handle_callback(cb)
    );

    assert!(first.is_ok());
    assert_eq!(second, Err(AuthError::Busy));
    assert_eq!(h.api.callback_calls.load(Ordering::SeqCst), 1);
    assert!(h.auth.is_authenticated());
}

#[tokio::test]
async fn test_callback_abandoned_by_caller_restores_redirecting() {
    let h = harness(ScriptedApi::with_delay(Duration::from_millis(200)));
    h.auth.initialize().await;
    h.auth.pre_login().await.unwrap();
    let cb = callback(&SessionId::new("1_seq"));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), h.auth.handle_callback(cb.clone())).await;

    assert!(abandoned.is_err());
    assert!(h.auth.is_redirecting());
    assert_eq!(stored(&h, SESSION_KEY).as_deref(), Some("1_seq"));

    let user = h.auth.handle_callback(cb).await.unwrap();
    assert_eq!(h.auth.state(), AuthState::Authenticated(user));
    assert_eq!(h.api.callback_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_callback_while_authenticated_is_rejected() {
    let h = harness(ScriptedApi::default());
    let user = login(&h).await;

    let err = h
        .auth
        .handle_callback(callback(&user.session))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(h.auth.state(), AuthState::Authenticated(user));
}

#[tokio::test]
async fn test_return_url_completes_login() {
    let h = harness(ScriptedApi::default());
    h.auth.initialize().await;
    h.auth.pre_login().await.unwrap();
    let url = Url::parse(
        "https://app.example/auth/return?session=1_seq&email=ana%40example.com&name=Ana",
    )
    .unwrap();

    let user = h.auth.handle_return_url(&url).await.unwrap();

    assert_eq!(user.email, "ana@example.com");
    assert_eq!(user.phone, None);
    assert!(h.auth.is_authenticated());
}

#[tokio::test]
async fn test_return_url_with_provider_error_moves_to_error() {
    let h = harness(ScriptedApi::default());
    h.auth.initialize().await;
    h.auth.pre_login().await.unwrap();
    let url = Url::parse("https://app.example/auth/return?error=access_denied").unwrap();

    let err = h.auth.handle_return_url(&url).await.unwrap_err();

    assert!(matches!(err, AuthError::Protocol(_)));
    assert!(err.to_string().contains("access_denied"));
    assert!(h.auth.state().is_error());
    assert_eq!(h.api.callback_calls.load(Ordering::SeqCst), 0);
}

// =========================================================================
// validate_session
// =========================================================================

#[tokio::test]
async fn test_validate_true_stays_authenticated() {
    let h = harness(ScriptedApi::default());
    let user = login(&h).await;
    let mut rx = h.auth.subscribe();

    assert_eq!(h.auth.validate_session().await, Ok(true));

    assert_eq!(h.auth.state(), AuthState::Authenticated(user));
    assert!(rx.has_changed().unwrap());
}

#[tokio::test]
async fn test_validate_false_clears_store_and_logs_out() {
    let api = ScriptedApi::default();
    api.reply_validate(Ok(false));
    let h = harness(api);
    login(&h).await;

    assert_eq!(h.auth.validate_session().await, Ok(false));

    assert_eq!(h.auth.state(), AuthState::Unauthenticated);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn test_validate_client_rejection_counts_as_invalid() {
    let api = ScriptedApi::default();
    api.reply_validate(Err(ApiError::Status {
        status: 401,
        message: "session expired".into(),
    }));
    let h = harness(api);
    login(&h).await;

    assert_eq!(h.auth.validate_session().await, Ok(false));

    assert_eq!(h.auth.state(), AuthState::Unauthenticated);
    assert_eq!(stored(&h, SESSION_KEY), None);
}

#[tokio::test]
async fn test_validate_throttled_keeps_login() {
    for status in [408, 429] {
        let api = ScriptedApi::default();
        api.reply_validate(Err(ApiError::Status {
            status,
            message: "slow down".into(),
        }));
        let h = harness(api);
        let user = login(&h).await;

        let err = h.auth.validate_session().await.unwrap_err();

        assert!(matches!(err, AuthError::Api { status: Some(s), .. } if s == status));
        assert!(err.is_retryable());
        match h.auth.state() {
            AuthState::Error { user: kept, .. } => assert_eq!(kept, Some(user)),
            other => panic!("expected error state for {status}, got {other:?}"),
        }
        assert_eq!(stored(&h, SESSION_KEY).as_deref(), Some("1_seq"));
        assert!(stored(&h, USER_KEY).is_some());
    }
}

#[tokio::test]
async fn test_validate_bad_request_keeps_login() {
    let api = ScriptedApi::default();
    api.reply_validate(Err(ApiError::Status {
        status: 400,
        message: "bad request".into(),
    }));
    let h = harness(api);
    login(&h).await;

    let err = h.auth.validate_session().await.unwrap_err();

    assert!(!err.is_retryable());
    assert_eq!(h.auth.state().name(), "error");
    assert_eq!(stored(&h, SESSION_KEY).as_deref(), Some("1_seq"));
}

#[tokio::test]
async fn test_validate_network_error_keeps_user_record() {
    let api = ScriptedApi::default();
    api.reply_validate(Err(ApiError::Network("connection refused".into())));
    let h = harness(api);
    let user = login(&h).await;

    let err = h.auth.validate_session().await.unwrap_err();

    assert_eq!(err, AuthError::Network("connection refused".into()));
    match h.auth.state() {
        AuthState::Error { kind, user: kept, .. } => {
            assert_eq!(kind, ErrorKind::Network);
            assert_eq!(kept, Some(user.clone()));
        }
        other => panic!("expected error state, got {other:?}"),
    }
    assert_eq!(h.auth.user(), Some(user));
    assert!(stored(&h, USER_KEY).is_some());
}

#[tokio::test]
async fn test_validate_retry_after_error_recovers() {
    let api = ScriptedApi::default();
    api.reply_validate(Err(ApiError::Timeout(Duration::from_secs(10))));
    api.reply_validate(Ok(true));
    let h = harness(api);
    let user = login(&h).await;

    assert_eq!(
        h.auth.validate_session().await.unwrap_err().kind(),
        ErrorKind::Timeout
    );
    assert_eq!(h.auth.validate_session().await, Ok(true));

    assert_eq!(h.auth.state(), AuthState::Authenticated(user));
}

#[tokio::test]
async fn test_validate_server_error_keeps_store() {
    let api = ScriptedApi::default();
    api.reply_validate(Err(ApiError::Status {
        status: 503,
        message: "maintenance".into(),
    }));
    let h = harness(api);
    login(&h).await;

    let err = h.auth.validate_session().await.unwrap_err();

    assert!(matches!(err, AuthError::Api { status: Some(503), .. }));
    assert!(err.is_retryable());
    assert_eq!(stored(&h, SESSION_KEY).as_deref(), Some("1_seq"));
}

#[tokio::test]
async fn test_concurrent_validations_share_one_request() {
    let h = harness(ScriptedApi::with_delay(Duration::from_millis(50)));
    login(&h).await;

    let (a, b, c) = tokio::join!(
        h.auth.validate_session(),
        h.auth.validate_session(),
        h.auth.validate_session()
    );

    assert_eq!((a, b, c), (Ok(true), Ok(true), Ok(true)));
    assert_eq!(h.api.validate_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_sequential_validations_each_hit_backend() {
    let h = harness(ScriptedApi::default());
    login(&h).await;

    h.auth.validate_session().await.unwrap();
    h.auth.validate_session().await.unwrap();

    assert_eq!(h.api.validate_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_validate_without_login_is_rejected() {
    let h = harness(ScriptedApi::default());
    h.auth.initialize().await;

    let err = h.auth.validate_session().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(h.api.validate_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.auth.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_logout_during_validation_wins() {
    let h = harness(ScriptedApi::with_delay(Duration::from_millis(50)));
    login(&h).await;

    let (valid, logout) = tokio::join!(h.auth.validate_session(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.auth.logout().await
    });

    assert_eq!(
        valid,
        Err(AuthError::InvalidState {
            operation: "validate_session",
            state: "unauthenticated",
        })
    );
    assert_eq!(logout, Ok(()));
    assert_eq!(h.auth.state(), AuthState::Unauthenticated);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn test_validate_abandoned_by_caller_restores_authenticated() {
    let h = harness(ScriptedApi::with_delay(Duration::from_millis(200)));
    let user = login(&h).await;

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), h.auth.validate_session()).await;

    assert!(abandoned.is_err());
    assert_eq!(h.auth.state(), AuthState::Authenticated(user.clone()));
    assert!(h.auth.is_authenticated());

    assert_eq!(h.auth.validate_session().await, Ok(true));
    assert_eq!(h.auth.state(), AuthState::Authenticated(user));
    assert_eq!(h.api.validate_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_validate_abandoned_from_error_restores_error() {
    let api = ScriptedApi::with_delay(Duration::from_millis(200));
    api.reply_validate(Err(ApiError::Network("reset".into())));
    let h = harness(api);
    let user = login(&h).await;
    h.auth.validate_session().await.unwrap_err();
    let failed = h.auth.state();

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), h.auth.validate_session()).await;

    assert!(abandoned.is_err());
    assert_eq!(h.auth.state(), failed);
    assert_eq!(h.auth.user(), Some(user));
}

// =========================================================================
// refresh_user_data
// =========================================================================

#[tokio::test]
async fn test_refresh_merges_and_persists() {
    let api = ScriptedApi::default();
    api.reply_fetch(Ok(UserAttributes {
        phone: Some("555".into()),
        ..UserAttributes::default()
    }));
    let h = harness(api);
    login(&h).await;

    let user = h.auth.refresh_user_data().await.unwrap();

    assert_eq!(user.phone.as_deref(), Some("555"));
    assert_eq!(user.name, "Ana");
    assert_eq!(h.auth.user(), Some(user));
    assert!(stored(&h, USER_KEY).unwrap().contains("555"));
}

#[tokio::test]
async fn test_refresh_failure_keeps_prior_record() {
    let api = ScriptedApi::default();
    api.reply_fetch(Err(ApiError::Network("reset".into())));
    let h = harness(api);
    let user = login(&h).await;

    let err = h.auth.refresh_user_data().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(h.auth.state(), AuthState::Authenticated(user));
}

#[tokio::test]
async fn test_refresh_while_unauthenticated_is_rejected() {
    let h = harness(ScriptedApi::default());
    h.auth.initialize().await;

    let err = h.auth.refresh_user_data().await.unwrap_err();

    assert_eq!(
        err,
        AuthError::InvalidState {
            operation: "refresh_user_data",
            state: "unauthenticated"
        }
    );
}

// =========================================================================
// logout and observation
// =========================================================================

#[tokio::test]
async fn test_logout_clears_store() {
    let h = harness(ScriptedApi::default());
    login(&h).await;

    h.auth.logout().await.unwrap();

    assert_eq!(h.auth.state(), AuthState::Unauthenticated);
    assert_eq!(h.auth.user(), None);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn test_logout_then_login_mints_fresh_id() {
    let h = harness(ScriptedApi::default());
    login(&h).await;
    h.auth.logout().await.unwrap();

    h.auth.pre_login().await.unwrap();

    assert_eq!(h.auth.persisted_session(), Some(SessionId::new("2_seq")));
}

#[tokio::test]
async fn test_observer_sees_every_transition() {
    let h = harness(ScriptedApi::default());

    login(&h).await;

    let transitions = h.recorder.transitions.lock().unwrap().clone();
    let names: Vec<(&str, &str)> = transitions
        .iter()
        .map(|(from, to)| (from.as_str(), to.as_str()))
        .collect();
    assert_eq!(
        names,
        vec![
            ("initializing", "unauthenticated"),
            ("unauthenticated", "redirecting"),
            ("redirecting", "validating"),
            ("validating", "authenticated"),
        ]
    );
    assert!(h.recorder.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_subscriber_is_woken_by_transition() {
    let h = harness(ScriptedApi::default());
    h.auth.initialize().await;
    let mut rx = h.auth.subscribe();

    let waiter = async {
        rx.changed().await.unwrap();
        rx.borrow_and_update().is_redirecting()
    };
    let (redirecting, _) = tokio::join!(waiter, h.auth.pre_login());

    assert!(redirecting);
}
