//! `AuthController`: the login state machine and its builder.
//!
//! The controller owns the session store, the backend client and the
//! published [`AuthState`]. Every public operation follows the same shape:
//!
//! 1. Under the transition lock, check the current state and move to the
//!    next one (for backend calls, a `Validating` state).
//! 2. Release the lock and await the backend.
//! 3. Re-take the lock and apply the result, unless a `logout` landed in
//!    the meantime, in which case the late result is dropped.
//!
//! If the caller drops the future during step 2 (a `timeout`, a cancelled
//! task), the `Validating` state is rolled back to the state it replaced.
//!
//! The transition lock is a plain mutex held only across synchronous
//! storage calls, never across an `.await`.
//!
//! Concurrent [`validate_session`](AuthController::validate_session) calls
//! are coalesced: callers that queue up behind a running validation receive
//! its outcome instead of issuing a second request. A second
//! [`handle_callback`](AuthController::handle_callback) while one is in
//! flight fails fast with [`AuthError::Busy`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use passage_api::AuthApi;
use passage_protocol::{ProviderCallback, RedirectUrlBuilder, SessionId, UserRecord};
use passage_session::{RandomSessionIds, SessionIdGenerator, SessionStore, Storage, StorageError};
use tokio::sync::watch;
use url::Url;

use crate::{AuthConfig, AuthError, AuthObserver, AuthState, LoggingNavigator, Navigator, TracingObserver};

/// Builder for an [`AuthController`].
///
/// # Example
///
/// ```rust,ignore
/// use passage::prelude::*;
///
/// let api = config.http_api()?;
/// let auth = AuthController::builder(config)
///     .navigator(MyBrowserNavigator)
///     .build(FileStorage::open("auth.json")?, api)?;
/// auth.initialize().await;
/// ```
pub struct AuthControllerBuilder<G = RandomSessionIds> {
    config: AuthConfig,
    ids: G,
    observer: Arc<dyn AuthObserver>,
    navigator: Arc<dyn Navigator>,
}

impl AuthControllerBuilder<RandomSessionIds> {
    /// Creates a builder with the default id generator, observer and
    /// navigator.
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            ids: RandomSessionIds::new(),
            observer: Arc::new(TracingObserver),
            navigator: Arc::new(LoggingNavigator),
        }
    }
}

impl<G: SessionIdGenerator> AuthControllerBuilder<G> {
    /// Replaces the session id generator.
    pub fn id_generator<G2: SessionIdGenerator>(self, ids: G2) -> AuthControllerBuilder<G2> {
        AuthControllerBuilder {
            config: self.config,
            ids,
            observer: self.observer,
            navigator: self.navigator,
        }
    }

    /// Sets the observer that receives transitions and errors.
    pub fn observer(mut self, observer: impl AuthObserver) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Sets the navigator that performs the redirect to the provider.
    pub fn navigator(mut self, navigator: impl Navigator) -> Self {
        self.navigator = Arc::new(navigator);
        self
    }

    /// Validates the configuration and builds the controller in the
    /// [`Initializing`](AuthState::Initializing) state.
    ///
    /// # Errors
    /// [`AuthError::Configuration`] if the configuration is unusable.
    pub fn build<A: AuthApi>(
        self,
        storage: impl Storage + 'static,
        api: A,
    ) -> Result<AuthController<A, G>, AuthError> {
        self.config.validate()?;
        let redirect = self.config.redirect_builder()?;
        let store = SessionStore::new(Box::new(storage), self.config.storage_keys());
        let (state, _) = watch::channel(AuthState::Initializing);

        tracing::debug!(
            provider = %redirect.base(),
            namespace = %self.config.storage_namespace,
            "auth controller built"
        );

        Ok(AuthController {
            config: self.config,
            redirect,
            store,
            api,
            ids: self.ids,
            observer: self.observer,
            navigator: self.navigator,
            state,
            transition: Mutex::new(()),
            flight: tokio::sync::Mutex::new(None),
            validations: AtomicU64::new(0),
        })
    }
}

/// Drives one client's login lifecycle.
///
/// Share it behind an `Arc`; every operation takes `&self`.
pub struct AuthController<A, G = RandomSessionIds> {
    config: AuthConfig,
    redirect: RedirectUrlBuilder,
    store: SessionStore,
    api: A,
    ids: G,
    observer: Arc<dyn AuthObserver>,
    navigator: Arc<dyn Navigator>,
    state: watch::Sender<AuthState>,
    /// Guards check-then-transition sequences.
    transition: Mutex<()>,
    /// Held for the whole of a validation or refresh round trip. Holds the
    /// outcome of the last validation for coalesced callers.
    flight: tokio::sync::Mutex<Option<Result<bool, AuthError>>>,
    /// Number of finished validations.
    validations: AtomicU64,
}

impl AuthController<()> {
    /// Creates a builder. The backend client is chosen in
    /// [`build`](AuthControllerBuilder::build).
    pub fn builder(config: AuthConfig) -> AuthControllerBuilder {
        AuthControllerBuilder::new(config)
    }
}

impl<A: AuthApi, G: SessionIdGenerator> AuthController<A, G> {
    // ---------------------------------------------------------------------
    // Reading state
    // ---------------------------------------------------------------------

    /// A snapshot of the current state.
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// A receiver that is notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn is_redirecting(&self) -> bool {
        self.state.borrow().is_redirecting()
    }

    /// The current user record, if the state carries one.
    pub fn user(&self) -> Option<UserRecord> {
        self.state.borrow().user().cloned()
    }

    /// The provider URL of a pending redirect.
    pub fn redirect_url(&self) -> Option<Url> {
        self.state.borrow().redirect_url().cloned()
    }

    /// The session id the store currently holds.
    pub fn persisted_session(&self) -> Option<SessionId> {
        self.store.load()
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Operations
    // ---------------------------------------------------------------------

    /// Startup check: adopts a persisted login or settles on
    /// `Unauthenticated`.
    ///
    /// Only acts in [`Initializing`](AuthState::Initializing); later calls
    /// return the current state unchanged. Never touches the network. A
    /// persisted session id without a user record is a login that was
    /// interrupted by the redirect; it is kept so the callback can still
    /// be matched against it.
    pub async fn initialize(&self) -> AuthState {
        let _guard = self.lock_transition();
        if !matches!(*self.state.borrow(), AuthState::Initializing) {
            return self.state();
        }

        let next = match self.store.load_user() {
            Some(user) => {
                tracing::info!("restored persisted login");
                AuthState::Authenticated(user)
            }
            None => {
                if self.store.load().is_some() {
                    tracing::debug!("pending login found; awaiting callback");
                }
                AuthState::Unauthenticated
            }
        };
        self.publish(next.clone());
        next
    }

    /// Starts a login: mints a session id, persists it, and navigates to
    /// the provider.
    ///
    /// While already [`Redirecting`](AuthState::Redirecting) this is a
    /// no-op that returns the pending URL, so a double click never mints
    /// a second id.
    ///
    /// # Errors
    /// - [`AuthError::InvalidState`] while initializing or logged in.
    /// - [`AuthError::Storage`] if the id can't be persisted. The state
    ///   falls back to `Unauthenticated` and no navigation happens.
    pub async fn pre_login(&self) -> Result<Url, AuthError> {
        let url = {
            let _guard = self.lock_transition();
            let current = self.state.borrow().clone();
            match current {
                AuthState::Redirecting { url, .. } => {
                    tracing::debug!("login already pending; reusing redirect");
                    return Ok(url);
                }
                AuthState::Unauthenticated | AuthState::Error { user: None, .. } => {}
                other => return Err(self.reject("pre_login", &other)),
            }

            let session = self.ids.generate();
            if let Err(e) = self.store.save(&session) {
                return Err(self.storage_fallback(e));
            }

            let url = self.redirect.build(&self.config.app_token, &session);
            tracing::debug!(session = %session, "session id minted");
            tracing::info!("login started");
            self.publish(AuthState::Redirecting {
                session,
                url: url.clone(),
            });
            url
        };

        self.navigator.navigate(&url);
        Ok(url)
    }

    /// Parses the provider's return URL and completes the login with it.
    ///
    /// # Errors
    /// Everything [`handle_callback`](Self::handle_callback) returns, plus
    /// [`AuthError::Protocol`] if the URL carries a provider error or lacks
    /// required attributes. A protocol error while a login is pending moves
    /// the state to [`Error`](AuthState::Error).
    pub async fn handle_return_url(&self, url: &Url) -> Result<UserRecord, AuthError> {
        match ProviderCallback::from_return_url(url) {
            Ok(callback) => self.handle_callback(callback).await,
            Err(e) => {
                let _guard = self.lock_transition();
                let current = self.state.borrow().clone();
                if accepts_callback(&current) {
                    Err(self.fail(e.into(), None))
                } else {
                    Err(self.reject("handle_return_url", &current))
                }
            }
        }
    }

    /// Completes a login with the provider's callback data.
    ///
    /// The callback's session id must equal the persisted one. On a match
    /// the data is submitted to the backend, and the merged user record is
    /// persisted together with its id.
    ///
    /// # Errors
    /// - [`AuthError::Busy`] if another callback is being submitted.
    /// - [`AuthError::SessionMismatch`] if the ids differ. Nothing is
    ///   persisted and the state moves to `Error`.
    /// - Backend errors move the state to `Error`, keeping the persisted
    ///   id so a re-delivered callback can still succeed.
    /// - [`AuthError::Storage`] if the record can't be persisted; the state
    ///   falls back to `Unauthenticated`.
    pub async fn handle_callback(&self, callback: ProviderCallback) -> Result<UserRecord, AuthError> {
        let in_flight = {
            let _guard = self.lock_transition();
            let current = self.state.borrow().clone();
            if matches!(current, AuthState::Validating { user: None }) {
                let err = AuthError::Busy;
                self.observer.on_error(&err);
                return Err(err);
            }
            if !accepts_callback(&current) {
                return Err(self.reject("handle_callback", &current));
            }

            let expected = self.store.load();
            if expected.as_ref() != Some(&callback.session) {
                tracing::warn!(
                    pending = expected.is_some(),
                    "callback session does not match persisted session"
                );
                let err = AuthError::SessionMismatch {
                    expected,
                    received: callback.session.clone(),
                };
                return Err(self.fail(err, None));
            }

            InFlight::enter(self, AuthState::Validating { user: None }, current)
        };

        let payload = callback.to_payload(&self.config.app_token, &self.config.secret_key);
        let reply = self.api.submit_callback(&payload).await;
        in_flight.disarm();

        let _guard = self.lock_transition();
        if !matches!(*self.state.borrow(), AuthState::Validating { user: None }) {
            tracing::debug!("login was cancelled while the callback was in flight");
            let state = self.state.borrow().name();
            return Err(AuthError::InvalidState {
                operation: "handle_callback",
                state,
            });
        }

        let attrs = match reply {
            Ok(attrs) => attrs,
            Err(e) => return Err(self.fail(e.into(), None)),
        };
        if let Some(bound) = attrs.session.as_ref().filter(|s| **s != callback.session) {
            tracing::warn!("backend bound the login to a different session");
            let err = AuthError::SessionMismatch {
                expected: Some(callback.session.clone()),
                received: bound.clone(),
            };
            return Err(self.fail(err, None));
        }

        let mut user = callback.to_record();
        user.merge(attrs);
        if let Err(e) = self.store.save_user(&user) {
            return Err(self.storage_fallback(e));
        }

        tracing::info!("login completed");
        self.publish(AuthState::Authenticated(user.clone()));
        Ok(user)
    }

    /// Asks the backend whether the current login is still valid.
    ///
    /// - `Ok(true)`: the state returns to `Authenticated`.
    /// - `Ok(false)`: the backend rejected the session, explicitly or with
    ///   a 401, 403, 404 or 410. The store is cleared and the state is
    ///   `Unauthenticated`.
    ///
    /// Callers that arrive while a validation is running wait for it and
    /// share its outcome.
    ///
    /// # Errors
    /// - [`AuthError::InvalidState`] if there is no login to validate, or
    ///   if a `logout` landed while the request was in flight.
    /// - Transport failures and any other non-2xx reply move the state to
    ///   `Error` with the user record retained. The store is left untouched.
    pub async fn validate_session(&self) -> Result<bool, AuthError> {
        let ticket = self.validations.load(Ordering::Acquire);
        let mut flight = self.flight.lock().await;

        if self.validations.load(Ordering::Acquire) != ticket {
            if let Some(outcome) = flight.as_ref() {
                tracing::debug!("joined a validation that finished while waiting");
                return outcome.clone();
            }
        }

        let outcome = self.run_validation().await;
        *flight = Some(outcome.clone());
        self.validations.fetch_add(1, Ordering::Release);
        outcome
    }

    async fn run_validation(&self) -> Result<bool, AuthError> {
        let (user, in_flight) = {
            let _guard = self.lock_transition();
            let current = self.state.borrow().clone();
            let user = match &current {
                AuthState::Authenticated(user) | AuthState::Error { user: Some(user), .. } => user.clone(),
                other => return Err(self.reject("validate_session", other)),
            };
            let pending = AuthState::Validating {
                user: Some(user.clone()),
            };
            (user, InFlight::enter(self, pending, current))
        };

        let reply = self.api.validate_session(&user.session).await;
        in_flight.disarm();

        let _guard = self.lock_transition();
        let current = self.state.borrow().clone();
        let still_current = matches!(
            &current,
            AuthState::Validating { user: Some(u) } if u.session == user.session
        );
        if !still_current {
            tracing::debug!("state changed during validation; dropping result");
            return Err(self.reject("validate_session", &current));
        }

        match reply {
            Ok(true) => {
                self.publish(AuthState::Authenticated(user));
                Ok(true)
            }
            Ok(false) => {
                tracing::info!("session rejected by backend");
                self.end_session();
                Ok(false)
            }
            Err(e) if e.is_session_rejection() => {
                tracing::info!(error = %e, "session rejected by backend");
                self.end_session();
                Ok(false)
            }
            Err(e) => Err(self.fail(e.into(), Some(user))),
        }
    }

    /// Re-fetches the user's attributes and merges them into the record.
    ///
    /// On success the merged record is persisted and published. On any
    /// failure the prior record and state are kept.
    ///
    /// # Errors
    /// - [`AuthError::InvalidState`] unless `Authenticated`.
    /// - Backend and storage errors, with the state left as it was.
    pub async fn refresh_user_data(&self) -> Result<UserRecord, AuthError> {
        let _flight = self.flight.lock().await;

        let session = {
            let _guard = self.lock_transition();
            match &*self.state.borrow() {
                AuthState::Authenticated(user) => user.session.clone(),
                other => return Err(self.reject("refresh_user_data", other)),
            }
        };

        let reply = self.api.fetch_user(&session).await;

        let _guard = self.lock_transition();
        let mut user = match &*self.state.borrow() {
            AuthState::Authenticated(user) if user.session == session => user.clone(),
            other => return Err(self.reject("refresh_user_data", other)),
        };

        let attrs = match reply {
            Ok(attrs) => attrs,
            Err(e) => return Err(self.report(e.into())),
        };
        if let Some(bound) = attrs.session.as_ref().filter(|s| **s != session) {
            return Err(self.report(AuthError::SessionMismatch {
                expected: Some(session.clone()),
                received: bound.clone(),
            }));
        }

        user.merge(attrs);
        if let Err(e) = self.store.save_user(&user) {
            return Err(self.report(e.into()));
        }

        tracing::debug!("user data refreshed");
        self.publish(AuthState::Authenticated(user.clone()));
        Ok(user)
    }

    /// Ends the login: clears the store and moves to `Unauthenticated`.
    ///
    /// Allowed from any state. A backend call still in flight finishes
    /// but its result is discarded.
    ///
    /// # Errors
    /// [`AuthError::Storage`] if the store couldn't be cleared. The state
    /// is `Unauthenticated` regardless.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let _guard = self.lock_transition();
        let cleared = self.store.clear();
        self.publish(AuthState::Unauthenticated);
        tracing::info!("logged out");
        cleared.map_err(|e| self.report(e.into()))
    }

    // ---------------------------------------------------------------------
    // Transitions
    // ---------------------------------------------------------------------

    fn lock_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, next: AuthState) {
        let prev = self.state.send_replace(next.clone());
        self.observer.on_transition(&prev, &next);
    }

    /// Notifies the observer and hands the error back.
    fn report(&self, err: AuthError) -> AuthError {
        self.observer.on_error(&err);
        err
    }

    /// Moves to the error state.
    fn fail(&self, err: AuthError, user: Option<UserRecord>) -> AuthError {
        let err = self.report(err);
        self.publish(AuthState::Error {
            kind: err.kind(),
            message: err.to_string(),
            user,
        });
        err
    }

    /// A storage failure leaves no usable login.
    fn storage_fallback(&self, err: StorageError) -> AuthError {
        tracing::warn!(error = %err, "session store failed; falling back to unauthenticated");
        let err = self.report(err.into());
        self.publish(AuthState::Unauthenticated);
        err
    }

    fn reject(&self, operation: &'static str, current: &AuthState) -> AuthError {
        self.report(AuthError::InvalidState {
            operation,
            state: current.name(),
        })
    }

    /// Clears the store after the backend rejected the session.
    fn end_session(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "could not clear rejected session");
            self.report(e.into());
        }
        self.publish(AuthState::Unauthenticated);
    }
}

/// A published `Validating` state awaiting a backend reply.
///
/// Dropped without [`disarm`](Self::disarm), the pending state is swapped
/// back for the one it replaced, as long as nothing else moved the state
/// on in the meantime.
struct InFlight<'a, A: AuthApi, G: SessionIdGenerator> {
    controller: &'a AuthController<A, G>,
    pending: AuthState,
    fallback: Option<AuthState>,
}

impl<'a, A: AuthApi, G: SessionIdGenerator> InFlight<'a, A, G> {
    /// Publishes `pending`. The caller must hold the transition lock.
    fn enter(controller: &'a AuthController<A, G>, pending: AuthState, fallback: AuthState) -> Self {
        controller.publish(pending.clone());
        Self {
            controller,
            pending,
            fallback: Some(fallback),
        }
    }

    /// The reply arrived; the caller applies it.
    fn disarm(mut self) {
        self.fallback = None;
    }
}

impl<A: AuthApi, G: SessionIdGenerator> Drop for InFlight<'_, A, G> {
    fn drop(&mut self) {
        let Some(fallback) = self.fallback.take() else {
            return;
        };
        let _guard = self.controller.lock_transition();
        if *self.controller.state.borrow() == self.pending {
            tracing::debug!(state = fallback.name(), "backend call abandoned; restoring prior state");
            self.controller.publish(fallback);
        }
    }
}

/// States in which a provider callback may be processed.
fn accepts_callback(state: &AuthState) -> bool {
    matches!(
        state,
        AuthState::Redirecting { .. } | AuthState::Unauthenticated | AuthState::Error { user: None, .. }
    )
}

impl<A: AuthApi, G: SessionIdGenerator> std::fmt::Debug for AuthController<A, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthController")
            .field("state", &self.state.borrow().name())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
