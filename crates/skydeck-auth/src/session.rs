//! Session management with automatic token refresh.
//!
//! The `Session` is the single owner of the client's auth state: it holds the
//! token vault, the API client, the state machine, and the refresh schedule.
//! Callers issue API requests through it so that bearer injection and the
//! 401 refresh-and-retry path apply uniformly.

use crate::client::{endpoints, ApiClient, Credentials, SignupRequest, TokenGrant, User};
use crate::fsm::{
    RetryPolicy, SessionMachine, SessionMachineInput, SessionState, StateChangedPayload,
};
use crate::scheduler::{RefreshSchedule, RefreshScheduler};
use crate::{AuthError, AuthResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use skydeck_vault::TokenVault;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Callback type for session state change notifications.
pub type StateCallback = Box<dyn Fn(StateChangedPayload) + Send + Sync>;

/// Point-in-time view of the session for status reporting.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// True when a complete token pair is held and not locally expired.
    pub authenticated: bool,
    /// Current FSM state.
    pub state: SessionState,
    /// User ID if the profile has been fetched.
    pub user_id: Option<i64>,
    /// User email if the profile has been fetched.
    pub email: Option<String>,
    /// Recorded access-token expiry, if the server reported one.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Owns the client's auth state: tokens, user profile, and refresh timing.
///
/// Constructed as `Arc<Session>`; the refresh scheduler task holds a weak
/// reference, so dropping the last strong handle tears the timer down.
pub struct Session {
    vault: TokenVault,
    api: ApiClient,
    fsm: Mutex<SessionMachine>,
    retry: RetryPolicy,
    schedule: RefreshSchedule,
    scheduler: RefreshScheduler,
    /// Profile cache, invalidated atomically with the token pair.
    current_user: Mutex<Option<User>>,
    /// In-memory expiry for the access token; not persisted (resume
    /// re-derives it by refreshing immediately).
    access_expires_at: Mutex<Option<DateTime<Utc>>>,
    /// Single-flight guard: concurrent 401 callers await the same refresh.
    refresh_lock: tokio::sync::Mutex<()>,
    /// Bumped on every stored grant so late arrivals skip a second refresh.
    refresh_generation: AtomicU64,
    state_callback: Mutex<Option<StateCallback>>,
    weak: Weak<Session>,
}

impl Session {
    /// Create a new session with default retry and schedule settings.
    pub fn new(vault: TokenVault, api: ApiClient) -> Arc<Self> {
        Self::with_options(vault, api, RetryPolicy::default(), RefreshSchedule::default())
    }

    /// Create a new session with custom retry and schedule settings.
    pub fn with_options(
        vault: TokenVault,
        api: ApiClient,
        retry: RetryPolicy,
        schedule: RefreshSchedule,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            vault,
            api,
            fsm: Mutex::new(SessionMachine::new()),
            retry,
            schedule,
            scheduler: RefreshScheduler::new(),
            current_user: Mutex::new(None),
            access_expires_at: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            refresh_generation: AtomicU64::new(0),
            state_callback: Mutex::new(None),
            weak: weak.clone(),
        })
    }

    /// Set a callback to be notified of session state changes.
    pub fn set_state_callback(&self, callback: StateCallback) {
        let mut cb = self.state_callback.lock().unwrap();
        *cb = Some(callback);
    }

    /// Get the current FSM state.
    pub fn state(&self) -> SessionState {
        let fsm = self.fsm.lock().unwrap();
        SessionState::from(fsm.state())
    }

    /// Transition the FSM and notify the callback if the state changed.
    fn transition(&self, input: &SessionMachineInput) -> AuthResult<SessionState> {
        let mut fsm = self.fsm.lock().unwrap();
        let old_state = SessionState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = SessionState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(old = ?old_state, new = ?new_state, "Session state transition");
            self.notify_state_change(&new_state);
        }

        Ok(new_state)
    }

    fn notify_state_change(&self, state: &SessionState) {
        let cb = self.state_callback.lock().unwrap();
        if let Some(callback) = cb.as_ref() {
            let user = self.current_user.lock().unwrap().clone();
            callback(StateChangedPayload {
                state: state.clone(),
                user_id: user.as_ref().map(|u| u.id),
                email: user.map(|u| u.email),
            });
        }
    }

    /// Retrieve the stored access token.
    pub fn access_token(&self) -> AuthResult<Option<String>> {
        Ok(self.vault.access_token()?)
    }

    /// Retrieve the stored refresh token.
    pub fn refresh_token(&self) -> AuthResult<Option<String>> {
        Ok(self.vault.refresh_token()?)
    }

    /// True iff both tokens are present.
    pub fn has_valid_tokens(&self) -> AuthResult<bool> {
        Ok(self.vault.has_valid_tokens()?)
    }

    /// The cached user profile, if fetched.
    pub fn current_user(&self) -> Option<User> {
        self.current_user.lock().unwrap().clone()
    }

    /// Recorded access-token expiry, if the server reported one.
    pub fn access_expires_at(&self) -> Option<DateTime<Utc>> {
        *self.access_expires_at.lock().unwrap()
    }

    /// True while the refresh timer is armed.
    pub fn refresh_scheduled(&self) -> bool {
        self.scheduler.is_scheduled()
    }

    /// Point-in-time status view.
    pub fn snapshot(&self) -> AuthResult<SessionSnapshot> {
        let state = self.state();
        let has_tokens = self.vault.has_valid_tokens()?;
        let expires_at = *self.access_expires_at.lock().unwrap();
        let expired = expires_at.map(|at| at <= Utc::now()).unwrap_or(false);
        let user = self.current_user.lock().unwrap().clone();

        Ok(SessionSnapshot {
            authenticated: has_tokens && !expired,
            state,
            user_id: user.as_ref().map(|u| u.id),
            email: user.as_ref().map(|u| u.email.clone()),
            expires_at,
        })
    }

    /// Sign in with email and password.
    ///
    /// On success the token pair is persisted, the refresh schedule is armed,
    /// and the user profile is fetched and cached.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<User> {
        self.transition(&SessionMachineInput::SignInRequested)?;

        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };

        let grant = match self.api.sign_in(&credentials).await {
            Ok(grant) => grant,
            Err(error) => {
                let _ = self.transition(&SessionMachineInput::SignInFailed);
                return Err(match error {
                    AuthError::Unauthorized(detail) => AuthError::InvalidCredentials(detail),
                    other => other,
                });
            }
        };

        self.complete_sign_in(grant, email).await
    }

    /// Create an account and sign in.
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> AuthResult<User> {
        self.transition(&SessionMachineInput::SignInRequested)?;

        let signup = SignupRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };

        let grant = match self.api.sign_up(&signup).await {
            Ok(grant) => grant,
            Err(error) => {
                let _ = self.transition(&SessionMachineInput::SignInFailed);
                return Err(error);
            }
        };

        self.complete_sign_in(grant, email).await
    }

    async fn complete_sign_in(&self, grant: TokenGrant, email: &str) -> AuthResult<User> {
        if let Err(error) = self.store_grant(&grant) {
            let _ = self.transition(&SessionMachineInput::SignInFailed);
            return Err(error);
        }

        self.transition(&SessionMachineInput::SignInSucceeded)?;
        self.scheduler.arm(self.weak.clone());

        info!(email = %email, "Signed in");

        self.fetch_current_user().await
    }

    /// Resume a persisted session on startup.
    ///
    /// If a refresh token is stored, the pair is refreshed immediately (which
    /// also re-derives the access-token expiry), the profile is fetched, and
    /// the schedule is armed.
    ///
    /// Returns:
    /// - `Ok(true)` if a session was resumed
    /// - `Ok(false)` if no credentials were stored
    /// - `Err(...)` if the stored session was invalid and has been cleared
    pub async fn resume(&self) -> AuthResult<bool> {
        self.transition(&SessionMachineInput::ResumeRequested)?;

        if self.vault.refresh_token()?.is_none() {
            info!("No stored session found");
            // Drop any orphaned access token
            self.vault.clear_tokens()?;
            self.transition(&SessionMachineInput::NoCredentials)?;
            return Ok(false);
        }

        let observed = self.refresh_generation.load(Ordering::SeqCst);
        self.refresh_shared(observed).await?;

        self.scheduler.arm(self.weak.clone());

        match self.fetch_current_user().await {
            Ok(user) => {
                info!(user_id = user.id, "Session resumed");
                Ok(true)
            }
            Err(error) => {
                warn!("Profile fetch failed after resume, clearing session: {}", error);
                self.clear_session_data()?;
                let _ = self.transition(&SessionMachineInput::SignOutRequested);
                let _ = self.transition(&SessionMachineInput::SignOutCompleted);
                Err(error)
            }
        }
    }

    /// Fetch `GET /auth/me` and cache the profile.
    pub async fn fetch_current_user(&self) -> AuthResult<User> {
        let user: User = self
            .request_json(Method::GET, endpoints::ME, None::<&()>)
            .await?;
        *self.current_user.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    /// Refresh the token pair now.
    ///
    /// Concurrent callers share a single in-flight refresh: whoever arrives
    /// while one is running awaits it and reuses the rotated pair.
    pub async fn refresh(&self) -> AuthResult<()> {
        let observed = self.refresh_generation.load(Ordering::SeqCst);
        self.refresh_shared(observed).await
    }

    async fn refresh_shared(&self, observed_generation: u64) -> AuthResult<()> {
        let _guard = self.refresh_lock.lock().await;

        // Another caller rotated the pair while we waited for the lock
        if self.refresh_generation.load(Ordering::SeqCst) != observed_generation {
            debug!("Refresh already performed by a concurrent caller");
            return Ok(());
        }

        let refresh_token = self.vault.refresh_token()?.ok_or(AuthError::NotSignedIn)?;

        self.transition(&SessionMachineInput::RefreshDue)?;
        self.refresh_with_backoff(&refresh_token).await
    }

    /// Run the refresh call, retrying transient failures with backoff.
    ///
    /// A rejection (non-transient error) clears the session immediately; a
    /// rejected refresh token is never retried.
    async fn refresh_with_backoff(&self, refresh_token: &str) -> AuthResult<()> {
        let mut last_error = None;

        for attempt in 0..self.retry.max_attempts {
            match self.api.refresh(refresh_token).await {
                Ok(grant) => {
                    if let Err(error) = self.store_grant(&grant) {
                        self.clear_session_data()?;
                        let _ = self.transition(&SessionMachineInput::RefreshFailed);
                        return Err(error);
                    }

                    self.transition(&SessionMachineInput::RefreshSucceeded)?;
                    info!("Token pair refreshed");
                    return Ok(());
                }
                Err(error) if error.is_transient() => {
                    last_error = Some(error);

                    if attempt + 1 < self.retry.max_attempts {
                        let _ = self.transition(&SessionMachineInput::RefreshRetried);

                        let delay = self.retry.delay_for_attempt(attempt);
                        debug!(
                            attempt = attempt + 1,
                            max_attempts = self.retry.max_attempts,
                            delay_ms = delay.as_millis(),
                            "Refresh failed with transient error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(error) => {
                    warn!("Refresh rejected, clearing session: {}", error);
                    self.clear_session_data()?;
                    let _ = self.transition(&SessionMachineInput::RefreshFailed);
                    return Err(error);
                }
            }
        }

        warn!(
            "Refresh failed after {} attempts, clearing session",
            self.retry.max_attempts
        );
        self.clear_session_data()?;
        let _ = self.transition(&SessionMachineInput::RefreshFailed);

        Err(last_error.unwrap_or(AuthError::RefreshExhausted(self.retry.max_attempts)))
    }

    /// Persist a grant: replace the access token, keep the stored refresh
    /// token when the response omits one, record the expiry, and bump the
    /// refresh generation.
    fn store_grant(&self, grant: &TokenGrant) -> AuthResult<()> {
        let refresh_token = match &grant.refresh_token {
            Some(token) => token.clone(),
            None => self.vault.refresh_token()?.ok_or(AuthError::NotSignedIn)?,
        };

        self.vault.set_tokens(&grant.access_token, &refresh_token)?;

        let expires_at = grant
            .expires_in
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs));
        *self.access_expires_at.lock().unwrap() = expires_at;

        self.refresh_generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Sign out: best-effort server logout, then clear everything locally.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let _ = self.transition(&SessionMachineInput::SignOutRequested);

        if let Ok(Some(token)) = self.vault.access_token() {
            if let Err(error) = self.api.sign_out(&token).await {
                // Local clearing proceeds regardless
                warn!("Logout endpoint call failed: {}", error);
            }
        }

        self.clear_session_data()?;
        let _ = self.transition(&SessionMachineInput::SignOutCompleted);

        info!("Signed out");
        Ok(())
    }

    fn clear_session_data(&self) -> AuthResult<()> {
        self.vault.clear_tokens()?;
        *self.access_expires_at.lock().unwrap() = None;
        *self.current_user.lock().unwrap() = None;
        self.scheduler.disarm();
        Ok(())
    }

    /// Issue an authorized GET request.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AuthResult<T> {
        self.request_json(Method::GET, path, None::<&()>).await
    }

    /// Issue an authorized POST request.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> AuthResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(Method::POST, path, Some(body)).await
    }

    /// Issue an API request through the authorizer.
    ///
    /// The current access token is attached unless the path is auth-exempt.
    /// On a 401, the shared refresh runs and the request is retried exactly
    /// once with the rotated token; the caller observes the retried response.
    pub async fn request_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> AuthResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let access_token = self.vault.access_token()?;
        let observed = self.refresh_generation.load(Ordering::SeqCst);

        match self
            .api
            .send_json(method.clone(), path, body, access_token.as_deref())
            .await
        {
            Err(error) if error.is_unauthorized() && !ApiClient::is_auth_exempt(path) => {
                debug!(path = %path, "Request rejected with 401, refreshing and retrying once");
                self.refresh_shared(observed).await?;

                let access_token = self.vault.access_token()?;
                self.api
                    .send_json(method, path, body, access_token.as_deref())
                    .await
            }
            other => other,
        }
    }

    /// Request a password-reset email. Unauthenticated.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        self.api.request_password_reset(email).await
    }

    /// Complete a password reset with the emailed token. Unauthenticated.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        self.api.confirm_password_reset(token, new_password).await
    }

    /// Change the password of the signed-in user.
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let token = self.vault.access_token()?.ok_or(AuthError::NotSignedIn)?;
        let observed = self.refresh_generation.load(Ordering::SeqCst);

        match self
            .api
            .change_password(&token, current_password, new_password)
            .await
        {
            Err(error) if error.is_unauthorized() => {
                self.refresh_shared(observed).await?;

                let token = self.vault.access_token()?.ok_or(AuthError::NotSignedIn)?;
                self.api
                    .change_password(&token, current_password, new_password)
                    .await
            }
            other => other,
        }
    }

    /// Delay until the next scheduled refresh should run.
    pub(crate) fn next_refresh_delay(&self) -> Duration {
        let expires_at = *self.access_expires_at.lock().unwrap();

        match expires_at {
            Some(expires_at) => {
                let lead = ChronoDuration::from_std(self.schedule.lead)
                    .unwrap_or_else(|_| ChronoDuration::zero());
                let until = expires_at - lead - Utc::now();
                until
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .max(self.schedule.min_delay)
            }
            None => self.schedule.fallback_interval,
        }
    }
}
