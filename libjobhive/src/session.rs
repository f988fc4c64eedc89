//! Authentication session store
//!
//! Holds who is signed in, as which role, and whether that is still being
//! determined. One `SessionStore` is built per application session and
//! shared by reference; screens read it through `snapshot()` or react to
//! changes through `subscribe()`.
//!
//! # Lifecycle
//!
//! ```text
//! Loading ──fetch_authenticated_user──▶ Authenticated
//!    │                                       │
//!    └──────────▶ Unauthenticated ◀──remove_user
//! ```
//!
//! # Overlapping refreshes
//!
//! Each refresh or sign-in takes a ticket when it starts. When it settles,
//! its result is applied only if no later-started call has been applied
//! already, so a slow, superseded refresh can never revert a newer session.
//! A rejected token is cleared only by the latest-started call; an older
//! call that fails first leaves the token to the newer one. Signing out
//! retires every outstanding ticket.

use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::error::{ApiError, DecodeError, Result};
use crate::token_store::TokenStore;
use crate::transport::{ApiRequest, Transport};
use crate::types::{AuthToken, Credentials, Identity, User, UserType};

/// The backend side of authentication
///
/// The current-user contract belongs to the integrating system; the HTTP
/// implementation below reads its path from configuration.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Resolve a token to the user it belongs to
    async fn current_user(&self, token: &SecretString) -> std::result::Result<Identity, ApiError>;

    /// Exchange credentials for a new token
    async fn sign_in(&self, credentials: &Credentials) -> std::result::Result<String, ApiError>;
}

/// `AuthBackend` over the JobHive REST API
pub struct HttpAuthBackend {
    transport: Arc<dyn Transport>,
    whoami_path: String,
}

impl HttpAuthBackend {
    pub fn new(transport: Arc<dyn Transport>, whoami_path: impl Into<String>) -> Self {
        Self {
            transport,
            whoami_path: whoami_path.into(),
        }
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn current_user(&self, token: &SecretString) -> std::result::Result<Identity, ApiError> {
        self.transport
            .send(ApiRequest::get(self.whoami_path.clone()).bearer(token))
            .await?
            .decode("current-user")
    }

    async fn sign_in(&self, credentials: &Credentials) -> std::result::Result<String, ApiError> {
        let body = serde_json::to_value(credentials)
            .map_err(|e| DecodeError::new("sign-in", e.to_string()))?;
        let response: AuthToken = self
            .transport
            .send(ApiRequest::post("/auth/login").json(body))
            .await?
            .decode("sign-in")?;
        Ok(response.token)
    }
}

/// Snapshot of the authentication state
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: Option<User>,
    pub user_type: Option<UserType>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

impl Session {
    /// State at process start: nothing known yet
    pub fn initial() -> Self {
        Self {
            user: None,
            user_type: None,
            is_authenticated: false,
            is_loading: true,
        }
    }

    fn signed_out() -> Self {
        Self {
            is_loading: false,
            ..Self::initial()
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::initial()
    }
}

/// How a refresh or sign-in ended
enum Outcome {
    Authenticated(Identity),
    Unauthenticated { clear_token: bool },
}

#[derive(Default)]
struct Tickets {
    /// Last ticket handed out
    started: u64,
    /// Highest ticket whose result reached the session
    applied: u64,
}

pub struct SessionStore {
    tokens: Arc<dyn TokenStore>,
    backend: Arc<dyn AuthBackend>,
    state: watch::Sender<Session>,
    tickets: Mutex<Tickets>,
}

impl SessionStore {
    pub fn new(tokens: Arc<dyn TokenStore>, backend: Arc<dyn AuthBackend>) -> Self {
        let (state, _) = watch::channel(Session::initial());
        Self {
            tokens,
            backend,
            state,
            tickets: Mutex::new(Tickets::default()),
        }
    }

    /// Current session
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver that observes every session change
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    fn tickets(&self) -> MutexGuard<'_, Tickets> {
        self.tickets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self) -> u64 {
        let ticket = {
            let mut tickets = self.tickets();
            tickets.started += 1;
            tickets.started
        };
        self.state.send_if_modified(|session| {
            let changed = !session.is_loading;
            session.is_loading = true;
            changed
        });
        ticket
    }

    /// Apply an outcome unless a later-started call already settled
    ///
    /// Returns the session as it stands afterwards. Only clearing the token
    /// can fail.
    fn settle(&self, ticket: u64, outcome: Outcome) -> Result<Session> {
        let mut tickets = self.tickets();
        if ticket <= tickets.applied {
            tracing::debug!(
                "Discarding superseded session result (ticket {}, applied {})",
                ticket,
                tickets.applied
            );
            return Ok(self.snapshot());
        }
        tickets.applied = ticket;
        let finished = ticket == tickets.started;

        // A newer call may already have stored a fresh token; only the
        // latest-started call may remove it
        let cleared = match &outcome {
            Outcome::Unauthenticated { clear_token: true } if finished => self.tokens.clear(),
            Outcome::Unauthenticated { clear_token: true } => {
                tracing::debug!("Keeping auth token for the newer call (ticket {})", tickets.started);
                Ok(())
            }
            _ => Ok(()),
        };

        self.state.send_modify(|session| {
            match outcome {
                Outcome::Authenticated(identity) => {
                    session.user = Some(identity.user);
                    session.user_type = Some(identity.user_type);
                    session.is_authenticated = true;
                }
                Outcome::Unauthenticated { .. } => {
                    session.user = None;
                    session.is_authenticated = false;
                }
            }
            if finished {
                session.is_loading = false;
            }
        });
        drop(tickets);

        cleared?;
        Ok(self.snapshot())
    }

    /// Resolve the stored token to a signed-in user
    ///
    /// - no token: unauthenticated
    /// - token accepted by the backend: authenticated with the returned
    ///   user and role
    /// - token rejected, or the backend unreachable: unauthenticated and
    ///   the token is cleared
    ///
    /// Safe to call repeatedly and concurrently; see the module docs for
    /// how overlapping calls are ordered.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the token cannot be read or cleared.
    /// The session is left unauthenticated in that case. Not being signed
    /// in is not an error.
    pub async fn fetch_authenticated_user(&self) -> Result<Session> {
        let ticket = self.begin();

        let token = match self.tokens.get() {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Could not read auth token ({}): {}", self.tokens.backend_name(), e);
                self.settle(ticket, Outcome::Unauthenticated { clear_token: false })?;
                return Err(e);
            }
        };

        let Some(token) = token else {
            tracing::debug!("No auth token stored");
            return self.settle(ticket, Outcome::Unauthenticated { clear_token: false });
        };

        self.resolve(ticket, &token).await
    }

    async fn resolve(&self, ticket: u64, token: &SecretString) -> Result<Session> {
        match self.backend.current_user(token).await {
            Ok(identity) => {
                tracing::debug!("Authenticated as {} ({})", identity.user.id, identity.user_type);
                self.settle(ticket, Outcome::Authenticated(identity))
            }
            Err(e) => {
                tracing::info!("Stored auth token rejected: {}", e);
                self.settle(ticket, Outcome::Unauthenticated { clear_token: true })
            }
        }
    }

    /// Exchange credentials for a token, persist it, and load the user
    ///
    /// # Errors
    ///
    /// Backend rejections and transport failures of the sign-in request
    /// are returned as `ApiError`; the session ends unauthenticated.
    /// Storage failures are returned as `StorageError`.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let ticket = self.begin();

        let token = match self.backend.sign_in(credentials).await {
            Ok(token) => token,
            Err(e) => {
                tracing::info!("Sign-in failed for {}: {}", credentials.email, e);
                self.settle(ticket, Outcome::Unauthenticated { clear_token: false })?;
                return Err(e.into());
            }
        };

        if ticket <= self.tickets().applied {
            tracing::debug!("Sign-in superseded before the token was stored");
            return Ok(self.snapshot());
        }
        if let Err(e) = self.tokens.set(&token) {
            self.settle(ticket, Outcome::Unauthenticated { clear_token: false })?;
            return Err(e);
        }

        self.resolve(ticket, &SecretString::from(token)).await
    }

    /// Pre-select the role before a sign-in completes; no backend call
    pub fn set_user_type(&self, user_type: UserType) {
        self.state.send_if_modified(|session| {
            let changed = session.user_type != Some(user_type);
            session.user_type = Some(user_type);
            changed
        });
    }

    /// Sign out: remove the token, then reset the session
    ///
    /// The session is only reset once the token is gone. Any refresh still
    /// in flight is discarded when it settles.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the token cannot be removed; the
    /// session is left untouched so it never looks signed out while a
    /// token is still stored.
    pub fn remove_user(&self) -> Result<()> {
        let mut tickets = self.tickets();
        self.tokens.clear()?;

        tickets.started += 1;
        tickets.applied = tickets.started;
        self.state.send_replace(Session::signed_out());
        tracing::debug!("Signed out");
        Ok(())
    }
}
