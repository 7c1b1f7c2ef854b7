//! The client's single session slot
//!
//! `SessionManager` owns the current session, its persisted credentials and
//! the logout timer. Every way a session can end (explicit logout, the timer,
//! a server rejection) goes through the same termination path, which cancels
//! the timer, clears all persisted keys, drops the in-memory session and then
//! notifies listeners.

use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::error::{Result, SessionError};
use crate::scheduler::{ArmOutcome, LogoutScheduler};
use crate::storage::{CredentialStore, ACCESS_TOKEN_KEY, IDENTITY_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS};
use crate::token;
use crate::types::{AuthTokens, EndReason, Identity, Role, Session};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Observer of session lifecycle transitions
///
/// Callbacks run synchronously on the thread that caused the transition,
/// after the session state has been updated and outside any internal lock.
pub trait SessionListener: Send + Sync {
    /// A session became current, either fresh or replacing another identity
    fn on_session_started(&self, _identity: &Identity) {}

    /// The current session ended
    fn on_session_ended(&self, reason: EndReason);
}

/// Result of reading persisted credentials at startup
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// Nothing (or nothing usable) was persisted
    Absent,
    /// Credentials were persisted but the token had expired; they are cleared
    Expired,
    /// The persisted session is live again
    Restored(Session),
}

/// The credential attached to an outgoing request
///
/// `epoch` identifies the session it belongs to, so a rejection only ends
/// that session and never a newer one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub epoch: u64,
    pub access_token: String,
}

#[derive(Default)]
struct SessionState {
    current: Option<Session>,
    epoch: u64,
    expired_notice: bool,
}

enum Transition {
    Started(Identity),
    Ended(EndReason),
}

/// Holds the authenticated identity and its credentials
pub struct SessionManager {
    me: Weak<SessionManager>,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    scheduler: LogoutScheduler,
    expiry_buffer_secs: i64,
    state: Mutex<SessionState>,
    listeners: RwLock<Vec<Weak<dyn SessionListener>>>,
    identity_tx: watch::Sender<Option<Identity>>,
}

impl SessionManager {
    /// Create an empty session manager
    ///
    /// Logout timers are spawned on `runtime`.
    pub fn new(
        config: &ClientConfig,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        runtime: Handle,
    ) -> Arc<Self> {
        let (identity_tx, _) = watch::channel(None);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            store,
            scheduler: LogoutScheduler::new(runtime, Arc::clone(&clock), config.logout_margin_secs),
            clock,
            expiry_buffer_secs: config.expiry_buffer_secs,
            state: Mutex::new(SessionState::default()),
            listeners: RwLock::new(Vec::new()),
            identity_tx,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a lifecycle listener
    ///
    /// Only a weak reference is kept; a dropped listener is skipped.
    pub fn add_listener(&self, listener: &Arc<dyn SessionListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(listener));
    }

    /// Watch the current identity (`None` while signed out)
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.identity_tx.subscribe()
    }

    /// Bring back the session persisted by a previous run
    pub fn restore(&self) -> Result<RestoreOutcome> {
        let access_token = self.store.get(ACCESS_TOKEN_KEY)?;
        let refresh_token = self.store.get(REFRESH_TOKEN_KEY)?;
        let raw_identity = self.store.get(IDENTITY_KEY)?;

        let (access_token, raw_identity) = match (access_token, raw_identity) {
            (Some(token), Some(identity)) => (token, identity),
            (None, None) if refresh_token.is_none() => {
                debug!("No persisted session");
                return Ok(RestoreOutcome::Absent);
            }
            _ => {
                warn!("Incomplete persisted session, clearing it");
                self.store.remove_many(&SESSION_KEYS)?;
                return Ok(RestoreOutcome::Absent);
            }
        };

        if token::is_expired_at(&access_token, self.clock.now(), self.expiry_buffer_secs) {
            info!("Persisted token expired, clearing session");
            self.store.remove_many(&SESSION_KEYS)?;
            self.lock().expired_notice = true;
            return Ok(RestoreOutcome::Expired);
        }

        let identity: Identity = match serde_json::from_str(&raw_identity) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Persisted identity is unreadable, clearing session");
                self.store.remove_many(&SESSION_KEYS)?;
                return Ok(RestoreOutcome::Absent);
            }
        };

        let session = Session {
            expires_at: token::decode_expiry(&access_token).ok(),
            tokens: AuthTokens {
                access_token,
                refresh_token: refresh_token.unwrap_or_default(),
            },
            identity,
        };

        let mut transitions = Vec::new();
        let live = {
            let mut state = self.lock();
            self.activate(&mut state, session.clone(), &mut transitions)
        };
        self.dispatch(transitions);

        if live {
            info!(user_id = session.identity.id, role = %session.identity.role, "Session restored");
            Ok(RestoreOutcome::Restored(session))
        } else {
            Ok(RestoreOutcome::Expired)
        }
    }

    /// Make a freshly issued token pair the current session
    ///
    /// All three keys are persisted before the session goes live. When
    /// persisting fails nothing is left behind and the error is returned.
    pub fn establish(&self, tokens: AuthTokens, identity: Identity) -> Result<Session> {
        let serialized = serde_json::to_string(&identity)?;
        let session = Session {
            expires_at: token::decode_expiry(&tokens.access_token).ok(),
            tokens,
            identity,
        };

        let mut transitions = Vec::new();
        let result = {
            let mut state = self.lock();
            let persisted = self.store.set_many(&[
                (ACCESS_TOKEN_KEY, session.tokens.access_token.as_str()),
                (REFRESH_TOKEN_KEY, session.tokens.refresh_token.as_str()),
                (IDENTITY_KEY, serialized.as_str()),
            ]);
            match persisted {
                Ok(()) => {
                    state.expired_notice = false;
                    if self.activate(&mut state, session.clone(), &mut transitions) {
                        Ok(session)
                    } else {
                        Err(SessionError::AuthorizationExpired)
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to persist session");
                    // Whatever was written (and the previous session's keys) goes
                    self.end_locked(&mut state, EndReason::Explicit, &mut transitions);
                    Err(e.into())
                }
            }
        };
        self.dispatch(transitions);

        if let Ok(session) = &result {
            info!(user_id = session.identity.id, role = %session.identity.role, "Session established");
        }
        result
    }

    /// End the current session
    ///
    /// Returns whether a session was actually ended; terminating with no
    /// active session only re-clears storage.
    pub fn terminate(&self, reason: EndReason) -> bool {
        let mut transitions = Vec::new();
        let ended = {
            let mut state = self.lock();
            self.end_locked(&mut state, reason, &mut transitions)
        };
        self.dispatch(transitions);
        ended
    }

    /// End the session `epoch` refers to, if it is still the current one
    pub fn terminate_epoch(&self, epoch: u64, reason: EndReason) -> bool {
        let mut transitions = Vec::new();
        let ended = {
            let mut state = self.lock();
            if state.epoch != epoch || state.current.is_none() {
                debug!(epoch, current = state.epoch, "Stale termination ignored");
                false
            } else {
                self.end_locked(&mut state, reason, &mut transitions)
            }
        };
        self.dispatch(transitions);
        ended
    }

    /// Cancel the logout timer at application teardown
    ///
    /// The session and its persisted credentials are left intact so the next
    /// run can restore them.
    pub fn shutdown(&self) {
        self.scheduler.cancel();
    }

    /// Install `session` as current and arm its logout timer
    ///
    /// Returns false when the token was already past its logout point, in
    /// which case the session has been ended again as expired.
    fn activate(&self, state: &mut SessionState, session: Session, transitions: &mut Vec<Transition>) -> bool {
        state.epoch += 1;
        let epoch = state.epoch;
        let identity = session.identity.clone();
        let access_token = session.tokens.access_token.clone();
        state.current = Some(session);
        transitions.push(Transition::Started(identity));

        let me = self.me.clone();
        let outcome = self.scheduler.arm(&access_token, move || {
            if let Some(manager) = me.upgrade() {
                manager.terminate_epoch(epoch, EndReason::Expired);
            }
        });

        match outcome {
            ArmOutcome::Overdue => {
                self.end_locked(state, EndReason::Expired, transitions);
                false
            }
            ArmOutcome::Scheduled { .. } | ArmOutcome::NoExpiry => true,
        }
    }

    fn end_locked(&self, state: &mut SessionState, reason: EndReason, transitions: &mut Vec<Transition>) -> bool {
        self.scheduler.cancel();

        if let Err(e) = self.store.remove_many(&SESSION_KEYS) {
            warn!(error = %e, "Failed to clear persisted session keys, wiping storage");
            if let Err(e) = self.store.wipe() {
                error!(error = %e, "Failed to wipe persisted session");
            }
        }

        let Some(session) = state.current.take() else {
            return false;
        };

        if reason == EndReason::Expired {
            state.expired_notice = true;
        }
        info!(user_id = session.identity.id, ?reason, "Session ended");
        transitions.push(Transition::Ended(reason));
        true
    }

    fn dispatch(&self, transitions: Vec<Transition>) {
        if transitions.is_empty() {
            return;
        }

        let listeners: Vec<Arc<dyn SessionListener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        for transition in transitions {
            match transition {
                Transition::Started(identity) => {
                    self.identity_tx.send_replace(Some(identity.clone()));
                    for listener in &listeners {
                        listener.on_session_started(&identity);
                    }
                }
                Transition::Ended(reason) => {
                    self.identity_tx.send_replace(None);
                    for listener in &listeners {
                        listener.on_session_ended(reason);
                    }
                }
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().current.is_some()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.lock().current.clone()
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.lock().current.as_ref().map(|session| session.identity.clone())
    }

    /// The access token to attach to the next request, if signed in
    pub fn credential(&self) -> Option<Credential> {
        let state = self.lock();
        state.current.as_ref().map(|session| Credential {
            epoch: state.epoch,
            access_token: session.tokens.access_token.clone(),
        })
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock()
            .current
            .as_ref()
            .map(|session| session.tokens.refresh_token.clone())
            .filter(|token| !token.is_empty())
    }

    fn role(&self) -> Option<Role> {
        self.lock().current.as_ref().map(|session| session.identity.role)
    }

    /// Exact role match
    pub fn has_role(&self, role: Role) -> bool {
        self.role() == Some(role)
    }

    /// Role match where an administrator also counts as a manager
    pub fn is_at_least(&self, role: Role) -> bool {
        self.role().is_some_and(|current| current.satisfies(role))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Administrator)
    }

    pub fn is_manager(&self) -> bool {
        self.is_at_least(Role::Manager)
    }

    pub fn is_customer(&self) -> bool {
        self.has_role(Role::Customer)
    }

    /// Whether the login surface should show the "session expired" notice
    pub fn session_expired(&self) -> bool {
        self.lock().expired_notice
    }

    /// Clear the "session expired" notice
    pub fn dismiss_expired_notice(&self) {
        self.lock().expired_notice = false;
    }

    pub fn logout_timer_armed(&self) -> bool {
        self.scheduler.is_armed()
    }
}
