//! Session state machine. Owns the identity value and is the only writer of
//! both the identity and the token store.
//!
//! Every commit (a write of identity and/or token store) happens under the
//! epoch lock and advances the epoch. `initialize` captures the epoch before its
//! lookup and drops its result if anything else committed in the meantime, so a
//! stale reload can never overwrite a fresher login or clear its token.

use crate::session::{
    exchange::{CredentialExchange, Credentials, ExchangeError, Registration},
    identity::{Identity, Profile},
    navigator::{Navigator, Route},
    store::TokenStore,
};
use parking_lot::Mutex;
use std::{fmt, str::FromStr};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

pub const INVALID_SERVER_RESPONSE: &str = "Invalid server response.";
pub const GENERIC_LOGIN_FAILURE: &str = "Unable to login. Please try again.";
pub const GENERIC_REGISTER_FAILURE: &str = "Unable to register. Please try again.";

/// Human-readable failure returned by `login` and `register`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct AuthFailure {
    message: String,
}

impl AuthFailure {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// What a successful registration does next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RegisterPolicy {
    /// Navigate to the landing route; no session is established.
    #[default]
    NavigateToLanding,
    /// Log in with the just-registered credentials, then land on `/`.
    AutoLogin,
}

impl FromStr for RegisterPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "landing" => Ok(Self::NavigateToLanding),
            "auto-login" => Ok(Self::AutoLogin),
            other => Err(format!("unknown register policy: {other}")),
        }
    }
}

impl fmt::Display for RegisterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NavigateToLanding => f.write_str("landing"),
            Self::AutoLogin => f.write_str("auto-login"),
        }
    }
}

#[derive(Debug, Default)]
struct Epoch {
    generation: u64,
    torn_down: bool,
}

pub struct SessionReconciler<E, S, N> {
    exchange: E,
    store: S,
    navigator: N,
    register_policy: RegisterPolicy,
    identity: watch::Sender<Identity>,
    epoch: Mutex<Epoch>,
}

impl<E, S, N> SessionReconciler<E, S, N>
where
    E: CredentialExchange,
    S: TokenStore,
    N: Navigator,
{
    /// Creates an `Unauthenticated` session. Call [`Self::initialize`] (or start a
    /// [`crate::session::SessionContext`]) to reconcile with the stored token.
    pub fn new(exchange: E, store: S, navigator: N) -> Self {
        let (identity, _) = watch::channel(Identity::Unauthenticated);
        Self {
            exchange,
            store,
            navigator,
            register_policy: RegisterPolicy::default(),
            identity,
            epoch: Mutex::new(Epoch::default()),
        }
    }

    #[must_use]
    pub fn with_register_policy(mut self, policy: RegisterPolicy) -> Self {
        self.register_policy = policy;
        self
    }

    /// Snapshot of the current identity.
    pub fn identity(&self) -> Identity {
        self.identity.borrow().clone()
    }

    /// Observe identity changes.
    pub fn subscribe(&self) -> watch::Receiver<Identity> {
        self.identity.subscribe()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Derive identity from the stored token, as on a hard reload.
    ///
    /// Lookup failures of any kind clear the store and leave the session
    /// `Unauthenticated`; nothing is surfaced to the caller.
    #[instrument(skip_all)]
    pub async fn initialize(&self) {
        let started = {
            let mut epoch = self.epoch.lock();
            if epoch.torn_down {
                return;
            }
            let Some(token) = self.store.load() else {
                epoch.generation += 1;
                self.identity.send_replace(Identity::Unauthenticated);
                debug!("No stored token");
                return;
            };
            (epoch.generation, token)
        };
        let (generation, token) = started;

        let lookup = self.exchange.lookup_identity(&token).await;

        let mut epoch = self.epoch.lock();
        if epoch.torn_down || epoch.generation != generation {
            debug!("Discarding stale reconciliation result");
            return;
        }
        epoch.generation += 1;
        match lookup {
            Ok(profile) => {
                debug!("Stored token accepted");
                self.identity.send_replace(Identity::Authenticated(profile));
            }
            Err(err) => {
                info!("Stored token rejected, resetting session: {err}");
                self.clear_store();
                self.identity.send_replace(Identity::Unauthenticated);
            }
        }
    }

    /// Log in and navigate to [`Route::Profile`] on success.
    ///
    /// # Errors
    /// Returns the backend's message on credential rejection, or a generic
    /// message for transport and protocol failures.
    pub async fn login(&self, credentials: Credentials) -> Result<(), AuthFailure> {
        self.login_with_redirect(credentials, Route::Profile).await
    }

    /// Log in and navigate to `redirect` on success.
    ///
    /// Identity lookup runs before the token is stored, so a token that does not
    /// resolve is never persisted. The outcome matches storing first and
    /// clearing on failure: on lookup failure the store is cleared and the
    /// session is `Unauthenticated`.
    ///
    /// # Errors
    /// See [`Self::login`].
    #[instrument(skip_all, fields(username = %credentials.username))]
    pub async fn login_with_redirect(
        &self,
        credentials: Credentials,
        redirect: Route,
    ) -> Result<(), AuthFailure> {
        let grant = match self.exchange.login(&credentials).await {
            Ok(grant) => grant,
            Err(ExchangeError::Rejected { message, .. }) => {
                debug!("Login rejected");
                return Err(AuthFailure::new(
                    message.unwrap_or_else(|| GENERIC_LOGIN_FAILURE.to_string()),
                ));
            }
            Err(err) => {
                warn!("Login exchange failed: {err}");
                return Err(AuthFailure::new(GENERIC_LOGIN_FAILURE));
            }
        };

        let Some(token) = grant.token.filter(|token| !token.trim().is_empty()) else {
            warn!("Login succeeded without a token");
            return Err(AuthFailure::new(INVALID_SERVER_RESPONSE));
        };

        let lookup = self.exchange.lookup_identity(&token).await;
        self.commit_login(&token, lookup)?;

        self.navigator.navigate(redirect);
        Ok(())
    }

    fn commit_login(
        &self,
        token: &str,
        lookup: Result<Profile, ExchangeError>,
    ) -> Result<(), AuthFailure> {
        let mut epoch = self.epoch.lock();
        if epoch.torn_down {
            return Err(AuthFailure::new(GENERIC_LOGIN_FAILURE));
        }
        epoch.generation += 1;

        let profile = match lookup {
            Ok(profile) => profile,
            Err(err) => {
                warn!("Identity lookup after login failed: {err}");
                self.clear_store();
                self.identity.send_replace(Identity::Unauthenticated);
                return Err(AuthFailure::new(GENERIC_LOGIN_FAILURE));
            }
        };

        if let Err(err) = self.store.save(token) {
            error!("Failed to persist token: {err}");
            self.clear_store();
            self.identity.send_replace(Identity::Unauthenticated);
            return Err(AuthFailure::new(GENERIC_LOGIN_FAILURE));
        }

        self.identity.send_replace(Identity::Authenticated(profile));
        Ok(())
    }

    /// Register a user, then follow the configured [`RegisterPolicy`].
    ///
    /// # Errors
    /// Returns the backend's message on rejection, or a generic message. Under
    /// [`RegisterPolicy::AutoLogin`] a login failure is returned as-is.
    #[instrument(skip_all, fields(username = %registration.credentials.username))]
    pub async fn register(&self, registration: Registration) -> Result<(), AuthFailure> {
        match self.exchange.register(&registration).await {
            Ok(()) => {}
            Err(ExchangeError::Rejected { message, .. }) => {
                debug!("Registration rejected");
                return Err(AuthFailure::new(
                    message.unwrap_or_else(|| GENERIC_REGISTER_FAILURE.to_string()),
                ));
            }
            Err(err) => {
                warn!("Register exchange failed: {err}");
                return Err(AuthFailure::new(GENERIC_REGISTER_FAILURE));
            }
        }

        match self.register_policy {
            RegisterPolicy::NavigateToLanding => {
                self.navigator.navigate(Route::Landing);
                Ok(())
            }
            RegisterPolicy::AutoLogin => {
                self.login_with_redirect(registration.credentials, Route::Landing)
                    .await
            }
        }
    }

    /// Clear the token, reset identity, and navigate to [`Route::Landing`].
    pub fn logout(&self) {
        {
            let mut epoch = self.epoch.lock();
            epoch.generation += 1;
            self.clear_store();
            self.identity.send_replace(Identity::Unauthenticated);
        }
        self.navigator.navigate(Route::Landing);
    }

    /// Stop accepting commits. Pending operations resolve without touching state.
    pub fn teardown(&self) {
        self.epoch.lock().torn_down = true;
    }

    fn clear_store(&self) {
        if let Err(err) = self.store.clear() {
            error!("Failed to clear token store: {err}");
        }
    }
}
