//! Session state machine.
//!
//! `SessionController` owns the session state and the persistence rate limiter behind
//! one mutex, so the "is running" check and the save claim happen as a single step.
//!
//! - `Stopped`: initial; no good fix, or the user stopped the session.
//! - `Ready`: not recording, but the latest fix passed the gate so start is possible.
//! - `Running`: recording. Fix degradation does not stop a running session.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::fix::{FixGate, FixRejection, FixVerdict, PositionFix};
use crate::rate_limit::RateLimiter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Ready,
    Running,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Stopped => "stopped",
            SessionState::Ready => "ready",
            SessionState::Running => "running",
        };
        f.write_str(name)
    }
}

/// Start request rejected; the state is left unchanged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SessionError {
    NotReady(FixRejection),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NotReady(reason) => write!(f, "GPS not ready yet: {}", reason),
        }
    }
}

impl std::error::Error for SessionError {}

struct SessionInner {
    state: SessionState,
    limiter: RateLimiter,
}

pub struct SessionController {
    gate: FixGate,
    inner: Mutex<SessionInner>,
}

impl SessionController {
    pub fn new(gate: FixGate, limiter: RateLimiter) -> Self {
        Self {
            gate,
            inner: Mutex::new(SessionInner {
                state: SessionState::Stopped,
                limiter,
            }),
        }
    }

    pub fn gate(&self) -> &FixGate {
        &self.gate
    }

    // The guarded fields are plain values updated in one assignment each,
    // so a poisoned lock still holds a consistent state.
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Re-evaluate readiness after a new fix arrived.
    pub fn on_fix_update(&self, fix: Option<&PositionFix>, now_ms: u64) -> SessionState {
        let good = self.gate.is_good(fix, now_ms);
        let mut inner = self.lock();
        inner.state = match (inner.state, good) {
            (SessionState::Running, _) => SessionState::Running,
            (_, true) => SessionState::Ready,
            (_, false) => SessionState::Stopped,
        };
        inner.state
    }

    /// Whether a start request would currently be accepted.
    pub fn can_start(&self, fix: Option<&PositionFix>, now_ms: u64) -> bool {
        !self.is_running() && self.gate.is_good(fix, now_ms)
    }

    /// Exporting the log is only offered while not recording.
    pub fn can_export(&self) -> bool {
        !self.is_running()
    }

    /// Begin a session. The gate is evaluated against `fix` at call time.
    pub fn request_start(
        &self,
        fix: Option<&PositionFix>,
        now_ms: u64,
    ) -> Result<SessionState, SessionError> {
        let verdict = self.gate.evaluate(fix, now_ms);
        let mut inner = self.lock();
        if inner.state == SessionState::Running {
            return Ok(SessionState::Running);
        }
        match verdict {
            FixVerdict::Good => {
                inner.state = SessionState::Running;
                log::info!("logging started");
                Ok(SessionState::Running)
            }
            FixVerdict::Rejected(reason) => {
                log::warn!("start rejected: {}", reason);
                Err(SessionError::NotReady(reason))
            }
        }
    }

    /// Stop recording. Always succeeds; in-flight saves are not cancelled.
    pub fn request_stop(&self) -> SessionState {
        let mut inner = self.lock();
        if inner.state == SessionState::Running {
            log::info!("logging stopped");
        }
        inner.state = SessionState::Stopped;
        inner.state
    }

    /// Admit a detection batch for persistence: requires `Running` and a successful
    /// rate-limiter claim, checked under one lock.
    pub fn admit_batch(&self, batch_len: usize, now_ms: u64) -> bool {
        let mut inner = self.lock();
        if inner.state != SessionState::Running {
            return false;
        }
        inner.limiter.try_claim(batch_len, now_ms)
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(FixGate::default(), RateLimiter::default())
    }
}
