//! Single-timer automatic logout
//!
//! At most one timer is pending at any time. Arming always cancels the
//! previous timer first, and every timer carries the generation it was armed
//! under: a timer that wakes after being superseded sees a newer generation
//! and exits without firing.

use crate::clock::Clock;
use crate::token::decode_expiry;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Seconds before token expiry at which the client logs itself out
pub const LOGOUT_MARGIN_SECS: i64 = 30;

/// What `arm` did with a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// A timer is pending for `fire_at`
    Scheduled { fire_at: DateTime<Utc> },
    /// The logout instant has already passed. Nothing is scheduled and the
    /// callback is not run: the caller logs out synchronously instead.
    Overdue,
    /// The token has no readable expiry; nothing is scheduled
    NoExpiry,
}

#[derive(Default)]
struct TimerState {
    generation: u64,
    pending: Option<PendingTimer>,
}

struct PendingTimer {
    fire_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

impl TimerState {
    /// Abort the pending timer (if any) and invalidate anything already woken
    fn cancel(&mut self) -> bool {
        self.generation += 1;
        match self.pending.take() {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }
}

/// Schedules the one-shot logout for the current session
pub struct LogoutScheduler {
    runtime: Handle,
    clock: Arc<dyn Clock>,
    /// `None` when the margin does not fit a `TimeDelta`
    margin: Option<TimeDelta>,
    state: Arc<Mutex<TimerState>>,
}

impl LogoutScheduler {
    pub fn new(runtime: Handle, clock: Arc<dyn Clock>, margin_secs: i64) -> Self {
        Self {
            runtime,
            clock,
            margin: TimeDelta::try_seconds(margin_secs),
            state: Arc::new(Mutex::new(TimerState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule `on_fire` for `margin` seconds before the token's expiry
    ///
    /// Any previously armed timer is cancelled first. `on_fire` runs at most
    /// once, never after a later `arm` or `cancel`, and never synchronously
    /// inside this call.
    pub fn arm<F>(&self, token: &str, on_fire: F) -> ArmOutcome
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.lock();
        state.cancel();

        let expiry = match decode_expiry(token) {
            Ok(expiry) => expiry,
            Err(e) => {
                debug!(error = %e, "Token has no readable expiry, no logout scheduled");
                return ArmOutcome::NoExpiry;
            }
        };

        // An expiry at the edge of the representable range has no usable logout point
        let Some(fire_at) = self.margin.and_then(|margin| expiry.checked_sub_signed(margin)) else {
            info!(%expiry, "Token expiry leaves no logout point");
            return ArmOutcome::Overdue;
        };
        let delay = match (fire_at - self.clock.now()).to_std() {
            Ok(delay) if !delay.is_zero() => delay,
            _ => {
                info!(%expiry, "Token is past its logout point");
                return ArmOutcome::Overdue;
            }
        };
        let Some(deadline) = Instant::now().checked_add(delay) else {
            debug!(%fire_at, "Logout point beyond the timer range, no logout scheduled");
            return ArmOutcome::NoExpiry;
        };

        let generation = state.generation;
        let shared = Arc::clone(&self.state);
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            {
                let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if state.generation != generation {
                    return;
                }
                state.pending = None;
            }
            info!(%fire_at, "Session expired, logging out automatically");
            on_fire();
        });

        state.pending = Some(PendingTimer { fire_at, handle });
        debug!(%fire_at, delay_secs = delay.as_secs(), "Logout timer armed");
        ArmOutcome::Scheduled { fire_at }
    }

    /// Drop the pending timer, if any. Safe to call repeatedly.
    pub fn cancel(&self) {
        if self.lock().cancel() {
            debug!("Logout timer cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// When the pending timer will fire
    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        self.lock().pending.as_ref().map(|timer| timer.fire_at)
    }
}

impl Drop for LogoutScheduler {
    fn drop(&mut self) {
        self.lock().cancel();
    }
}
