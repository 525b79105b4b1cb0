//! JWT session coordination
//!
//! Every call made through [`SessionManager::execute`] passes one
//! interceptor. A 401 parks the call in the failure collector and raises the
//! refresh signal; the first raise starts the only refresh in flight. When
//! the refresh stores a new access token the parked calls are replayed and
//! their results handed back to the original callers. When it fails, or no
//! refresh token exists, the session is cleared and every parked caller gets
//! [`ClientError::SessionCleared`].

mod api;
pub(crate) mod collector;
pub(crate) mod coordinator;
mod dispatcher;
pub(crate) mod status;
pub mod storage;
pub mod store;

pub use collector::PendingFailures;

use ehr_console_core::AuthenticationStatus;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::client::error::FailureKind;
use crate::client::{ApiCall, ApiClient, ClientError, Service};
use crate::config::SessionConfig;
use crate::types::{Credentials, TokenPair};
use collector::FailureCollector;
use coordinator::RefreshCoordinator;
use status::StatusProjector;
use storage::KeyValueStorage;
use store::TokenStore;

const EVENT_CAPACITY: usize = 32;

/// Why the session was cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// `unauthenticate_user` was called
    UserRequested,
    /// A refresh was needed but no refresh token was stored
    MissingRefreshToken,
    /// The backend rejected the refresh token
    RefreshRejected,
    /// The refresh took longer than `refresh_timeout_secs`
    RefreshTimedOut,
    /// The refresh request got no response
    RefreshUnreachable,
    /// A freshly refreshed access token still failed verification
    VerificationRejected,
    /// Tokens could not be read or written
    StorageFailure,
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::UserRequested => "logged out by user",
            Self::MissingRefreshToken => "no refresh token",
            Self::RefreshRejected => "refresh token rejected",
            Self::RefreshTimedOut => "refresh timed out",
            Self::RefreshUnreachable => "refresh endpoint unreachable",
            Self::VerificationRejected => "access token rejected after refresh",
            Self::StorageFailure => "token storage failure",
        };
        f.write_str(reason)
    }
}

/// Notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A call got no response at all
    ConnectivityLost,
    /// A new access token was stored
    Refreshed,
    /// The session was cleared; emitted only on an actual transition
    LoggedOut { reason: LogoutReason },
}

#[derive(Default)]
pub(crate) struct SessionState {
    pub collector: FailureCollector,
    pub coordinator: RefreshCoordinator,
}

pub(crate) struct SessionInner {
    backend: ApiClient,
    records: ApiClient,
    store: TokenStore,
    status: StatusProjector,
    events: broadcast::Sender<SessionEvent>,
    state: Mutex<SessionState>,
    max_replays: u32,
    refresh_timeout: Duration,
}

enum Interception {
    /// The token was replaced while the call was in flight
    RetryNow,
    Parked(oneshot::Receiver<Result<Value, ClientError>>),
}

/// Cloneable handle to one session. All clones share tokens, status and
/// the failure sets.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    /// Build both clients from `config` and keep tokens in `storage`
    pub fn new(config: &SessionConfig, storage: Arc<dyn KeyValueStorage>) -> Result<Self, ClientError> {
        Ok(Self::with_clients(
            config,
            config.backend_client()?,
            config.records_client()?,
            storage,
        ))
    }

    pub fn with_clients(
        config: &SessionConfig,
        backend: ApiClient,
        records: ApiClient,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let store = TokenStore::new(storage, &config.access_token_key, &config.refresh_token_key);

        Self {
            inner: Arc::new(SessionInner {
                backend,
                records,
                store,
                status: StatusProjector::new(),
                events,
                state: Mutex::new(SessionState::default()),
                max_replays: config.max_replays,
                refresh_timeout: config.refresh_timeout(),
            }),
        }
    }

    pub fn status(&self) -> AuthenticationStatus {
        self.inner.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<AuthenticationStatus> {
        self.inner.status.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.inner.store
    }

    pub fn pending_failures(&self) -> PendingFailures {
        let state = self.inner.lock_state();
        PendingFailures {
            queries: state.collector.failed_query_count(),
            mutations: state.collector.failed_mutation_count(),
            refresh_in_flight: state.coordinator.is_refresh_requested(),
        }
    }

    /// Send `call` through the 401 interceptor
    pub async fn execute(&self, call: ApiCall) -> Result<Value, ClientError> {
        self.inner.clone().perform(call, 0).await
    }

    pub async fn execute_as<T: serde::de::DeserializeOwned>(&self, call: ApiCall) -> Result<T, ClientError> {
        let value = self.execute(call).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Decide the initial status from stored tokens.
    ///
    /// With an access token it is verified; a 401 requests a refresh and
    /// verifies once more. With only a refresh token a refresh is requested
    /// directly. With neither the session is unauthenticated. Errors other
    /// than 401 leave the status at `Loading`.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<AuthenticationStatus, ClientError> {
        let inner = &self.inner;
        let access = inner.store.load_access_token()?;
        let refresh = inner.store.load_refresh_token()?;

        match (access, refresh) {
            (Some(access), _) => self.verify(&access).await,
            (None, Some(_)) => {
                debug!("Access token absent, refreshing from stored refresh token");
                if self.request_refresh().await.unwrap_or(false) {
                    inner.status.set(AuthenticationStatus::Authenticated);
                }
                Ok(self.status())
            }
            (None, None) => {
                debug!("No stored tokens");
                inner.status.set(AuthenticationStatus::Unauthenticated);
                Ok(AuthenticationStatus::Unauthenticated)
            }
        }
    }

    async fn verify(&self, access: &str) -> Result<AuthenticationStatus, ClientError> {
        let inner = &self.inner;
        let mut access = access.to_string();
        let mut refreshed = false;

        loop {
            match inner.backend.jwt_verify(&access).await {
                Ok(()) => {
                    inner.status.set(AuthenticationStatus::Authenticated);
                    return Ok(AuthenticationStatus::Authenticated);
                }
                Err(e) if e.is_unauthorized() && !refreshed => {
                    info!("Stored access token rejected, refreshing");
                    if !self.request_refresh().await.unwrap_or(false) {
                        return Ok(self.status());
                    }
                    refreshed = true;
                    match inner.store.load_access_token()? {
                        Some(fresh) => access = fresh,
                        None => return Ok(self.status()),
                    }
                }
                Err(e) if e.is_unauthorized() => {
                    warn!("Refreshed access token failed verification");
                    inner.force_logout(LogoutReason::VerificationRejected);
                    return Ok(AuthenticationStatus::Unauthenticated);
                }
                Err(e) => {
                    if e.is_network() {
                        inner.emit(SessionEvent::ConnectivityLost);
                    }
                    error!(error = %e, "Token verification failed");
                    return Err(e);
                }
            }
        }
    }

    /// Exchange credentials for tokens and mark the session authenticated
    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &Credentials) -> Result<TokenPair, ClientError> {
        let tokens = self.inner.backend.jwt_create(credentials).await?;
        self.authenticate_user(&tokens)?;
        info!("Logged in");
        Ok(tokens)
    }

    pub fn authenticate_user(&self, tokens: &TokenPair) -> Result<(), ClientError> {
        self.inner.store.save_tokens(&tokens.access, &tokens.refresh)?;
        self.inner.status.set(AuthenticationStatus::Authenticated);
        Ok(())
    }

    /// Clear the session. Returns `false` when it was already
    /// unauthenticated, in which case no event is emitted.
    pub fn unauthenticate_user(&self) -> bool {
        self.inner.force_logout(LogoutReason::UserRequested)
    }

    /// Raise the refresh signal without a failed call. The receiver learns
    /// whether the refresh succeeded.
    pub fn request_refresh(&self) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        let (start, epoch) = {
            let mut state = self.inner.lock_state();
            state.coordinator.add_listener(tx);
            (state.coordinator.raise_refresh(), state.coordinator.epoch())
        };
        if start {
            tokio::spawn(self.inner.clone().run_refresh(epoch));
        }
        rx
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("status", &self.status())
            .field("pending", &self.pending_failures())
            .finish_non_exhaustive()
    }
}

impl SessionInner {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    const fn client_for(&self, service: Service) -> &ApiClient {
        match service {
            Service::Backend => &self.backend,
            Service::Records => &self.records,
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("No session event subscribers");
        }
    }

    /// The interceptor. `attempt` counts replays already spent on `call`.
    pub(crate) fn perform(
        self: Arc<Self>,
        call: ApiCall,
        mut attempt: u32,
    ) -> BoxFuture<'static, Result<Value, ClientError>> {
        async move {
            loop {
                let access = self.store.load_access_token()?;
                let err = match self.client_for(call.service).send_call(&call, access.as_deref()).await {
                    Ok(value) => return Ok(value),
                    Err(err) => err,
                };

                match err.classify() {
                    FailureKind::Network => {
                        warn!(call = %call, error = %err, "Connectivity lost");
                        self.emit(SessionEvent::ConnectivityLost);
                        return Err(err);
                    }
                    FailureKind::Other => return Err(err),
                    FailureKind::Unauthorized if attempt >= self.max_replays => {
                        warn!(call = %call, attempt, "Replay limit reached, giving up");
                        return Err(err);
                    }
                    FailureKind::Unauthorized => {}
                }

                match self.intercept_unauthorized(&call, attempt, access.as_deref())? {
                    Interception::RetryNow => {
                        debug!(call = %call, "Access token changed in flight, retrying");
                        attempt += 1;
                    }
                    Interception::Parked(rx) => {
                        return rx.await.unwrap_or(Err(ClientError::SessionCleared));
                    }
                }
            }
        }
        .boxed()
    }

    fn intercept_unauthorized(
        self: &Arc<Self>,
        call: &ApiCall,
        attempt: u32,
        sent: Option<&str>,
    ) -> Result<Interception, ClientError> {
        let mut state = self.lock_state();

        if !state.coordinator.is_refresh_requested() {
            let current = self.store.load_access_token()?;
            if current.is_some() && current.as_deref() != sent {
                return Ok(Interception::RetryNow);
            }
        }

        let (tx, rx) = oneshot::channel();
        state.collector.record(call.clone(), attempt, tx);
        let start = state.coordinator.raise_refresh();
        let epoch = state.coordinator.epoch();
        drop(state);

        debug!(call = %call, attempt, start_refresh = start, "Parked unauthorized call");
        if start {
            tokio::spawn(self.clone().run_refresh(epoch));
        }
        Ok(Interception::Parked(rx))
    }

    /// Whether a refresh started under `epoch` still owns the session
    fn refresh_is_current(&self, epoch: u64) -> bool {
        self.lock_state().coordinator.is_current(epoch)
    }

    async fn run_refresh(self: Arc<Self>, epoch: u64) {
        if !self.refresh_is_current(epoch) {
            debug!("Session cleared before refresh started");
            return;
        }

        let refresh = match self.store.load_refresh_token() {
            Ok(Some(refresh)) => refresh,
            Ok(None) => {
                warn!("Refresh needed but no refresh token stored");
                self.force_logout(LogoutReason::MissingRefreshToken);
                return;
            }
            Err(e) => {
                error!(error = %e, "Failed to read refresh token");
                self.force_logout(LogoutReason::StorageFailure);
                return;
            }
        };

        info!("Refreshing access token");
        let outcome = tokio::time::timeout(self.refresh_timeout, self.backend.jwt_refresh(&refresh)).await;
        if !self.refresh_is_current(epoch) {
            debug!("Session cleared during refresh, discarding outcome");
            return;
        }
        match outcome {
            Ok(Ok(token)) => self.complete_refresh(epoch, &token.access),
            Ok(Err(e)) if e.is_network() => {
                error!(error = %e, "Refresh endpoint unreachable");
                self.emit(SessionEvent::ConnectivityLost);
                self.force_logout(LogoutReason::RefreshUnreachable);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Refresh rejected");
                self.force_logout(LogoutReason::RefreshRejected);
            }
            Err(_) => {
                warn!(timeout = ?self.refresh_timeout, "Refresh timed out");
                self.force_logout(LogoutReason::RefreshTimedOut);
            }
        }
    }

    fn complete_refresh(self: Arc<Self>, epoch: u64, access: &str) {
        // The state lock is held across the save so a concurrent logout
        // either abandons this refresh or clears the token after it.
        let (listeners, batch) = {
            let mut state = self.lock_state();
            if !state.coordinator.is_current(epoch) {
                debug!("Session cleared during refresh, discarding token");
                return;
            }
            if let Err(e) = self.store.save_access_token(access) {
                drop(state);
                error!(error = %e, "Failed to store refreshed access token");
                self.force_logout(LogoutReason::StorageFailure);
                return;
            }
            self.status.set(AuthenticationStatus::Authenticated);
            let listeners = state.coordinator.refresh_succeeded();
            (listeners, state.collector.take())
        };
        for listener in listeners {
            let _ = listener.send(true);
        }

        info!("Access token refreshed");
        self.emit(SessionEvent::Refreshed);

        if batch.is_empty() {
            self.lock_state().coordinator.take_retry();
        } else {
            tokio::spawn(dispatcher::dispatch(self, batch));
        }
    }

    /// Clear tokens and parked work. Returns whether the status changed.
    fn force_logout(&self, reason: LogoutReason) -> bool {
        let (listeners, batch) = {
            let mut state = self.lock_state();
            (state.coordinator.reset(), state.collector.take())
        };

        if let Err(e) = self.store.clear_tokens() {
            error!(error = %e, "Failed to clear stored tokens");
        }

        let changed = self.status.set(AuthenticationStatus::Unauthenticated);
        if changed {
            info!(%reason, "Session cleared");
            self.emit(SessionEvent::LoggedOut { reason });
        } else {
            debug!(%reason, "Session already cleared");
        }

        for reply in batch.into_replies() {
            let _ = reply.send(Err(ClientError::SessionCleared));
        }
        for listener in listeners {
            let _ = listener.send(false);
        }
        changed
    }
}
