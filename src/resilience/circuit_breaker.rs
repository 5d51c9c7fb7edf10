//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, backend may be selected
//! - Open: backend excluded from selection regardless of liveness
//!
//! # State Transitions
//! ```text
//! Closed → Open:   failure_count >= threshold (probe or forwarding failure)
//! Open → Closed:   success observed more than `reset_after` after the last failure
//! ```
//!
//! There is no half-open probing state. Open backends keep receiving health
//! probes and close only through the time-gated rule, so a recovered backend
//! can stay excluded for up to `reset_after` after its last failure.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerState {
    Closed,
    Open,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
        }
    }
}

/// A state change produced by recording an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Closed → Open.
    Tripped { failures: u32 },
    /// Open → Closed.
    Reset,
}

/// Per-backend trip/reset state machine.
///
/// Not synchronized; the owning backend guards it together with its
/// liveness flag so both change atomically.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: BreakerState,
    failures: u32,
    last_failure_at: Option<Instant>,
    threshold: u32,
    reset_after: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_after: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            last_failure_at: None,
            threshold,
            reset_after,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == BreakerState::Closed
    }

    pub fn failure_count(&self) -> u32 {
        self.failures
    }

    /// Record a success observed at `now`.
    ///
    /// Only an open breaker whose last failure is older than `reset_after`
    /// closes; the failure counter is cleared on that transition alone.
    pub fn record_success(&mut self, now: Instant) -> Option<Transition> {
        if self.state != BreakerState::Open {
            return None;
        }
        let elapsed = match self.last_failure_at {
            Some(at) => now.saturating_duration_since(at),
            None => Duration::MAX,
        };
        if elapsed > self.reset_after {
            self.state = BreakerState::Closed;
            self.failures = 0;
            Some(Transition::Reset)
        } else {
            None
        }
    }

    /// Record a failure observed at `now`.
    pub fn record_failure(&mut self, now: Instant) -> Option<Transition> {
        self.failures = self.failures.saturating_add(1);
        self.last_failure_at = Some(now);

        if self.state == BreakerState::Closed && self.failures >= self.threshold {
            self.state = BreakerState::Open;
            return Some(Transition::Tripped {
                failures: self.failures,
            });
        }
        None
    }
}
