//! Circuit breaker guarding venue connection attempts.
//!
//! Prevents hammering a venue that is refusing or dropping connections.
//!
//! # State Machine
//!
//! ```text
//! CLOSED → OPEN (consecutive failures >= threshold)
//! OPEN → HALF_OPEN (cooldown elapsed)
//! HALF_OPEN → CLOSED (trial attempt succeeds, counter resets)
//! HALF_OPEN → OPEN (trial attempt fails, cooldown restarts)
//! ```
//!
//! HALF_OPEN permits exactly one trial attempt; further attempts are
//! refused until that trial is resolved by `record_success` or
//! `record_failure`.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Attempts flow normally.
    Closed,
    /// Attempts are refused until the cooldown elapses.
    Open,
    /// One trial attempt is permitted.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Duration to stay in `OPEN` before permitting a trial.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Consecutive-failure circuit breaker for venue connectivity.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Name for logging.
    name: String,
    /// Configuration.
    config: CircuitBreakerConfig,
    /// Current state.
    state: RwLock<CircuitState>,
    /// Consecutive failures since the last success.
    consecutive_failures: AtomicU32,
    /// Timestamp when the circuit opened.
    opened_at: RwLock<Option<Instant>>,
    /// Whether the single HALF_OPEN trial has been handed out.
    trial_in_flight: AtomicBool,
    /// Total failures counter (for status).
    total_failures: AtomicU64,
    /// State transitions counter (for status).
    state_transitions: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(CircuitState::Closed),
            consecutive_failures: AtomicU32::new(0),
            opened_at: RwLock::new(None),
            trial_in_flight: AtomicBool::new(false),
            total_failures: AtomicU64::new(0),
            state_transitions: AtomicU64::new(0),
        }
    }

    /// Get the breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state, applying the time-based OPEN → HALF_OPEN move.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.check_state_transition();
        *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether a connection attempt is permitted right now.
    ///
    /// In HALF_OPEN this hands out the single trial slot; the caller must
    /// resolve it with `record_success` or `record_failure`.
    #[must_use]
    pub fn allow_attempt(&self) -> bool {
        self.check_state_transition();

        let state = *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => !self.trial_in_flight.swap(true, Ordering::AcqRel),
        }
    }

    /// Record a successful attempt.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.trial_in_flight.store(false, Ordering::Release);

        let state = *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state != CircuitState::Closed {
            self.transition_to_closed();
        }
    }

    /// Record a failed attempt.
    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        self.trial_in_flight.store(false, Ordering::Release);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

        let state = *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match state {
            CircuitState::Closed => {
                if failures >= self.config.failure_threshold {
                    self.transition_to_open();
                }
            }
            // trial failed, cooldown restarts
            CircuitState::HalfOpen => self.transition_to_open(),
            CircuitState::Open => {
                tracing::warn!(name = %self.name, "failure recorded while circuit is OPEN");
                // restart the cooldown window
                let mut opened_at = self
                    .opened_at
                    .write()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                *opened_at = Some(Instant::now());
            }
        }
    }

    /// Remaining cooldown, `Some` only while the circuit is OPEN.
    #[must_use]
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        self.check_state_transition();

        let state = *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state != CircuitState::Open {
            return None;
        }

        let opened_at = *self
            .opened_at
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        opened_at.map(|opened| self.config.cooldown.saturating_sub(opened.elapsed()))
    }

    /// Check for the time-based transition (`OPEN` -> `HALF_OPEN`).
    fn check_state_transition(&self) {
        let state = *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if state == CircuitState::Open
            && let Some(opened) = *self
                .opened_at
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
            && opened.elapsed() >= self.config.cooldown
        {
            self.transition_to_half_open();
        }
    }

    /// Transition to `OPEN`.
    fn transition_to_open(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = *state;

        *state = CircuitState::Open;
        drop(state);

        let mut opened_at = self
            .opened_at
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *opened_at = Some(Instant::now());
        drop(opened_at);

        if previous != CircuitState::Open {
            self.state_transitions.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                name = %self.name,
                from = %previous,
                to = "OPEN",
                cooldown_secs = self.config.cooldown.as_secs(),
                "Circuit breaker opened"
            );
        }
    }

    /// Transition to `HALF_OPEN`.
    fn transition_to_half_open(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = *state;

        if previous == CircuitState::Open {
            *state = CircuitState::HalfOpen;
            drop(state);

            self.trial_in_flight.store(false, Ordering::Release);
            self.state_transitions.fetch_add(1, Ordering::Relaxed);

            tracing::info!(
                name = %self.name,
                from = %previous,
                to = "HALF_OPEN",
                "Circuit breaker permitting trial attempt"
            );
        }
    }

    /// Transition to `CLOSED`.
    fn transition_to_closed(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = *state;

        if previous != CircuitState::Closed {
            *state = CircuitState::Closed;
            drop(state);

            let mut opened_at = self
                .opened_at
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *opened_at = None;
            drop(opened_at);

            self.state_transitions.fetch_add(1, Ordering::Relaxed);

            tracing::info!(
                name = %self.name,
                from = %previous,
                to = "CLOSED",
                "Circuit breaker closed"
            );
        }
    }

    /// Snapshot for the gateway's status endpoint.
    #[must_use]
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: self.state(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            state_transitions: self.state_transitions.load(Ordering::Relaxed),
            remaining_cooldown_secs: self.remaining_cooldown().map(|d| d.as_secs_f64()),
        }
    }
}

/// Point-in-time breaker status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Total failures.
    pub total_failures: u64,
    /// Number of state transitions.
    pub state_transitions: u64,
    /// Remaining cooldown in seconds, present only while OPEN.
    pub remaining_cooldown_secs: Option<f64>,
}
