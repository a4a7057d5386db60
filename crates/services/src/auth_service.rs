//! Sign-in, sign-up, profile edits and logout.
//!
//! Login and sign-up run as spawned tasks bounded by the configured timeout.
//! At most one such request is in flight; starting another, or calling
//! `cancel_pending`, aborts it.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::StatusCode;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use speak_core::model::{ProfileForm, Session, SignInForm, SignUpForm};
use storage::repository::SessionRepository;

use crate::api::{AuthApi, AuthResponse};
use crate::error::{ApiError, AuthError};
use crate::progress_store::ProgressStore;
use crate::sync::StudySync;

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Snapshot of the auth state for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthStatus {
    pub session: Option<Session>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Default)]
struct InFlight {
    generation: u64,
    handle: Option<AbortHandle>,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

pub struct AuthService {
    api: Arc<dyn AuthApi>,
    sessions: Arc<dyn SessionRepository>,
    store: Arc<ProgressStore>,
    sync: Arc<dyn StudySync>,
    timeout: Duration,
    status: Mutex<AuthStatus>,
    in_flight: Mutex<InFlight>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        api: Arc<dyn AuthApi>,
        sessions: Arc<dyn SessionRepository>,
        store: Arc<ProgressStore>,
        sync: Arc<dyn StudySync>,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            sessions,
            store,
            sync,
            timeout,
            status: Mutex::new(AuthStatus::default()),
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    #[must_use]
    pub fn status(&self) -> AuthStatus {
        lock(&self.status).clone()
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        lock(&self.status).session.clone()
    }

    /// Adopt a session persisted by an earlier run, if any.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Storage` if the session cannot be read.
    pub async fn restore_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.sessions.load_session().await? else {
            return Ok(None);
        };
        info!(user_id = %session.user.id, "session restored");
        self.adopt(session.clone()).await;
        Ok(Some(session))
    }

    /// # Errors
    ///
    /// Returns `AuthError` describing why the credentials were not accepted.
    pub async fn sign_in(&self, form: SignInForm) -> Result<Session, AuthError> {
        let request = form.validate()?;
        let generation = self.begin();
        let api = Arc::clone(&self.api);
        let result = self
            .run_request(generation, async move { api.login(&request).await })
            .await
            .map_err(|err| err.into_auth_error(login_failure));
        let result = match result {
            Ok(response) => self.establish(response).await,
            Err(err) => Err(err),
        };
        self.finish(generation, result)
    }

    /// Register a new account and sign in as it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::EmailTaken` for a duplicate email, or another
    /// `AuthError` describing the failure.
    pub async fn sign_up(&self, form: SignUpForm) -> Result<Session, AuthError> {
        let request = form.validate()?;
        let generation = self.begin();
        let api = Arc::clone(&self.api);
        let result = self
            .run_request(generation, async move { api.sign_up(&request).await })
            .await
            .map_err(|err| err.into_auth_error(sign_up_failure));
        let result = match result {
            Ok(response) => {
                let auth = Session::new(response.user.clone(), response.token.clone()).auth();
                if !self.sync.create_initial(&auth).await {
                    warn!(user_id = %auth.user_id, "could not create initial study record");
                }
                self.establish(response).await
            }
            Err(err) => Err(err),
        };
        self.finish(generation, result)
    }

    /// Change the display name and optionally the password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotSignedIn` without a session, `AuthError::Form`
    /// for invalid input, or the backend failure.
    pub async fn update_profile(&self, form: ProfileForm) -> Result<Session, AuthError> {
        let mut session = self.session().ok_or(AuthError::NotSignedIn)?;
        let update = form.validate()?;

        let response = self
            .api
            .update_profile(&session.token, &update)
            .await
            .map_err(|err| match err {
                ApiError::Http(err) if !err.is_decode() => AuthError::Network(err),
                ApiError::Http(_) | ApiError::InvalidBody(_) => AuthError::InvalidResponse,
                other => AuthError::Rejected {
                    status: other.status(),
                    message: other
                        .server_message()
                        .unwrap_or("Update failed")
                        .to_owned(),
                },
            })?;
        if response.id.is_none() {
            return Err(AuthError::InvalidResponse);
        }

        session.user.username = update.username;
        if let Some(patch) = response.user {
            patch.apply_to(&mut session.user);
        }
        self.sessions.save_session(&session).await?;
        lock(&self.status).session = Some(session.clone());
        info!(user_id = %session.user.id, "profile updated");
        Ok(session)
    }

    /// Push outstanding progress, then forget the session and all user state.
    pub async fn logout(&self) {
        let Some(session) = self.session() else {
            return;
        };
        if self.store.flush_pending_sync().await == Some(false) {
            warn!(user_id = %session.user.id, "pending study sync failed before logout");
        }
        if !self.store.force_sync().await {
            warn!(user_id = %session.user.id, "final study sync failed before logout");
        }
        if let Err(err) = self.sessions.clear_session().await {
            warn!(error = %err, "failed to clear persisted session");
        }
        self.store.cancel_pending_sync();
        self.store.clear().await;
        *lock(&self.status) = AuthStatus::default();
        info!(user_id = %session.user.id, "signed out");
    }

    /// Abort the in-flight login or sign-up request. Returns whether one was running.
    pub fn cancel_pending(&self) -> bool {
        match lock(&self.in_flight).handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    // ─── Internals ─────────────────────────────────────────────────────────

    fn begin(&self) -> u64 {
        let generation = {
            let mut in_flight = lock(&self.in_flight);
            in_flight.generation += 1;
            in_flight.generation
        };
        let mut status = lock(&self.status);
        status.loading = true;
        status.error = None;
        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        lock(&self.in_flight).generation == generation
    }

    /// Publish the outcome of request `generation` unless a newer one started.
    fn finish(
        &self,
        generation: u64,
        result: Result<Session, AuthError>,
    ) -> Result<Session, AuthError> {
        if !self.is_current(generation) {
            debug!(generation, "superseded authentication request finished");
            return result;
        }
        let mut status = lock(&self.status);
        status.loading = false;
        if let Err(err) = &result {
            warn!(error = ?err, "authentication failed");
            status.error = Some(err.user_message());
        }
        result
    }

    async fn establish(&self, response: AuthResponse) -> Result<Session, AuthError> {
        let session = Session::new(response.user, response.token);
        self.sessions.save_session(&session).await?;
        info!(user_id = %session.user.id, "signed in");
        self.adopt(session.clone()).await;
        Ok(session)
    }

    async fn adopt(&self, session: Session) {
        let auth = session.auth();
        lock(&self.status).session = Some(session);
        if let Err(err) = self.store.load_user(auth).await {
            warn!(error = %err, "failed to load study progress");
        }
    }

    async fn run_request<T, F>(&self, generation: u64, request: F) -> Result<T, RequestFailure>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let timeout = self.timeout;
        let task = tokio::spawn(async move { tokio::time::timeout(timeout, request).await });

        {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.generation == generation {
                if let Some(previous) = in_flight.handle.replace(task.abort_handle()) {
                    previous.abort();
                }
            } else {
                task.abort();
            }
        }

        let joined = task.await;
        {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.generation == generation {
                in_flight.handle = None;
            }
        }

        match joined {
            Ok(Ok(result)) => result.map_err(RequestFailure::Api),
            Ok(Err(_elapsed)) => Err(RequestFailure::Timeout),
            Err(err) if err.is_cancelled() => Err(RequestFailure::Cancelled),
            Err(err) => Err(RequestFailure::Panicked(err.to_string())),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//
// ─── FAILURE MAPPING ───────────────────────────────────────────────────────────
//

enum RequestFailure {
    Api(ApiError),
    Timeout,
    Cancelled,
    Panicked(String),
}

impl RequestFailure {
    fn into_auth_error(self, map_status: fn(StatusCode, Option<&str>) -> AuthError) -> AuthError {
        match self {
            Self::Timeout => AuthError::Timeout,
            Self::Cancelled => AuthError::Cancelled,
            Self::Panicked(message) => AuthError::Internal(message),
            Self::Api(ApiError::Status { status, message }) => map_status(status, message.as_deref()),
            Self::Api(ApiError::InvalidBody(_)) => AuthError::InvalidResponse,
            Self::Api(ApiError::Http(err)) if err.is_decode() => AuthError::InvalidResponse,
            Self::Api(ApiError::Http(err)) => AuthError::Network(err),
        }
    }
}

fn rejected(status: StatusCode, message: &str) -> AuthError {
    AuthError::Rejected {
        status: Some(status),
        message: message.to_owned(),
    }
}

fn login_failure(status: StatusCode, message: Option<&str>) -> AuthError {
    let message = message.unwrap_or("Invalid credentials");
    match status {
        StatusCode::UNAUTHORIZED => {
            let lower = message.to_lowercase();
            if lower.contains("email") {
                rejected(status, "No account found with this email address.")
            } else if lower.contains("password") {
                rejected(status, "Incorrect password. Please try again.")
            } else {
                rejected(status, "Email or password is incorrect.")
            }
        }
        StatusCode::INTERNAL_SERVER_ERROR => {
            rejected(status, "Server error. Please try again later.")
        }
        _ => rejected(status, message),
    }
}

fn sign_up_failure(status: StatusCode, message: Option<&str>) -> AuthError {
    let message = message.unwrap_or("Sign up failed");
    let duplicate = ["SQLITE_CONSTRAINT", "duplicate", "already in use"]
        .iter()
        .any(|needle| message.contains(needle));
    match status {
        StatusCode::CONFLICT => AuthError::EmailTaken,
        StatusCode::INTERNAL_SERVER_ERROR if duplicate => AuthError::EmailTaken,
        _ if message.contains("Internal server error") => rejected(
            status,
            "Server error occurred. The email may already be registered.",
        ),
        _ => rejected(status, message),
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
