//! Restart decision engine.
//!
//! Owns the consecutive-failure counter, the startup grace flag, and the
//! rolling history of restart attempts. It never talks to the outside world:
//! the monitor loop feeds it probe outcomes and observed unit states together
//! with the current monotonic time, and asks whether a restart may be
//! attempted right now.
//!
//! # Decision order
//!
//! 1. `failed` → skip, systemd's own restart policy owns recovery
//! 2. `inactive` → skip, treated as an intentional stop
//! 3. transitional → skip, the loop waits these out
//! 4. `maintenance` → skip
//! 5. active, no response since (re)start → skip (grace period)
//! 6. active, inside cooldown → skip with remaining seconds
//! 7. active, hourly limit reached → skip with current count
//! 8. otherwise → allowed
//!
//! An unknown state is an error, not a skip.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::MonitorError;
use crate::unit_state::{ServiceState, Transition};

/// Length of the rate-limiting window.
pub const ROLLING_WINDOW: Duration = Duration::from_secs(3600);

/// Restart limits, taken from the monitor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub cooldown: Duration,
    /// 0 means unlimited.
    pub max_per_hour: u32,
}

/// Why a restart was not attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnitFailed,
    Inactive,
    Transitional(Transition),
    Maintenance,
    NoResponseSinceStart,
    Cooldown { remaining_secs: u64 },
    RateLimited { count: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnitFailed => f.write_str("unit failed; recovery belongs to systemd"),
            Self::Inactive => f.write_str("unit is inactive"),
            Self::Transitional(t) => write!(f, "unit is in transitional state {}", t.as_str()),
            Self::Maintenance => f.write_str("unit is in maintenance"),
            Self::NoResponseSinceStart => {
                f.write_str("no successful response since start; likely still starting up")
            }
            Self::Cooldown { remaining_secs } => write!(f, "cooldown ({remaining_secs}s remaining)"),
            Self::RateLimited { count } => {
                write!(f, "rate limit reached ({count} restarts in last hour)")
            }
        }
    }
}

/// Outcome of [`RestartDecisionEngine::is_restart_allowed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartDecision {
    Allowed,
    Skipped(SkipReason),
}

impl RestartDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Monotonic timestamps of past restart attempts, ascending.
#[derive(Debug, Clone, Default)]
pub struct RestartHistory {
    attempts: VecDeque<Instant>,
}

impl RestartHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attempt. Timestamps older than the last entry are clamped
    /// to it so the sequence stays sorted.
    pub fn push(&mut self, at: Instant) {
        let at = match self.attempts.back() {
            Some(&last) if at < last => last,
            _ => at,
        };
        self.attempts.push_back(at);
    }

    /// Drop every attempt older than [`ROLLING_WINDOW`] relative to `now`.
    pub fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(ROLLING_WINDOW) else {
            return;
        };
        let idx = self.attempts.partition_point(|&t| t < cutoff);
        self.attempts.drain(..idx);
    }

    pub fn last(&self) -> Option<Instant> {
        self.attempts.back().copied()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instant> {
        self.attempts.iter()
    }
}

/// Single-writer restart bookkeeping owned by the monitor loop.
#[derive(Debug, Clone)]
pub struct RestartDecisionEngine {
    policy: RestartPolicy,
    consecutive_failures: u32,
    responded_since_start: bool,
    history: RestartHistory,
}

impl RestartDecisionEngine {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
            responded_since_start: false,
            history: RestartHistory::new(),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn responded_since_start(&self) -> bool {
        self.responded_since_start
    }

    pub fn history(&self) -> &RestartHistory {
        &self.history
    }

    pub fn record_probe_success(&mut self) {
        self.responded_since_start = true;
        self.consecutive_failures = 0;
    }

    /// Count a failed probe. Ignored until the unit has answered at least
    /// once since its last (re)start, so a slow launch is never a failure.
    pub fn record_probe_failure(&mut self) {
        if self.responded_since_start {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
    }

    /// The unit was observed outside `active`.
    pub fn reset_on_state_exit(&mut self) {
        self.consecutive_failures = 0;
        self.responded_since_start = false;
    }

    /// Record one restart attempt at `now`, whatever its outcome.
    pub fn record_restart_attempt(&mut self, now: Instant) {
        self.history.push(now);
        self.consecutive_failures = 0;
        self.responded_since_start = false;
    }

    /// Decide whether a restart may be attempted for a unit in `state`.
    ///
    /// Prunes the attempt history first. Returns an error for
    /// [`ServiceState::Unknown`].
    pub fn is_restart_allowed(
        &mut self,
        unit: &str,
        state: &ServiceState,
        now: Instant,
    ) -> Result<RestartDecision, MonitorError> {
        self.history.prune(now);

        let reason = match state {
            ServiceState::Failed => SkipReason::UnitFailed,
            ServiceState::Inactive => SkipReason::Inactive,
            ServiceState::Transitional(t) => SkipReason::Transitional(*t),
            ServiceState::Maintenance => SkipReason::Maintenance,
            ServiceState::Unknown(raw) => {
                return Err(MonitorError::UnknownState {
                    unit: unit.to_string(),
                    raw: raw.clone(),
                });
            }
            ServiceState::Active => match self.active_skip_reason(now) {
                Some(reason) => reason,
                None => return Ok(RestartDecision::Allowed),
            },
        };
        Ok(RestartDecision::Skipped(reason))
    }

    fn active_skip_reason(&self, now: Instant) -> Option<SkipReason> {
        if !self.responded_since_start {
            return Some(SkipReason::NoResponseSinceStart);
        }

        if let Some(last) = self.history.last() {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.policy.cooldown {
                return Some(SkipReason::Cooldown {
                    remaining_secs: (self.policy.cooldown - elapsed).as_secs(),
                });
            }
        }

        let max = self.policy.max_per_hour as usize;
        if max > 0 && self.history.len() >= max {
            return Some(SkipReason::RateLimited {
                count: self.history.len(),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(cooldown_secs: u64, max_per_hour: u32) -> RestartDecisionEngine {
        RestartDecisionEngine::new(RestartPolicy {
            cooldown: Duration::from_secs(cooldown_secs),
            max_per_hour,
        })
    }

    #[test]
    fn failure_before_first_response_is_ignored() {
        let mut e = engine(0, 0);
        e.record_probe_failure();
        e.record_probe_failure();
        assert_eq!(e.consecutive_failures(), 0);

        e.record_probe_success();
        e.record_probe_failure();
        assert_eq!(e.consecutive_failures(), 1);
    }

    #[test]
    fn success_and_state_exit_reset_failures() {
        let mut e = engine(0, 0);
        e.record_probe_success();
        e.record_probe_failure();
        e.record_probe_failure();
        e.record_probe_success();
        assert_eq!(e.consecutive_failures(), 0);

        e.record_probe_failure();
        e.reset_on_state_exit();
        assert_eq!(e.consecutive_failures(), 0);
        assert!(!e.responded_since_start());
    }

    #[test]
    fn push_keeps_history_sorted() {
        let t0 = Instant::now() + Duration::from_secs(10);
        let mut h = RestartHistory::new();
        h.push(t0);
        h.push(t0 - Duration::from_secs(5));
        let v: Vec<_> = h.iter().copied().collect();
        assert_eq!(v, vec![t0, t0]);
    }

    #[test]
    fn prune_keeps_entries_exactly_one_hour_old() {
        let t0 = Instant::now();
        let mut h = RestartHistory::new();
        h.push(t0);
        h.push(t0 + Duration::from_secs(1));
        h.prune(t0 + ROLLING_WINDOW);
        assert_eq!(h.len(), 2);
        h.prune(t0 + ROLLING_WINDOW + Duration::from_millis(500));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn cooldown_remaining_is_truncated() {
        let t0 = Instant::now();
        let mut e = engine(300, 0);
        e.record_restart_attempt(t0);
        e.record_probe_success();
        let d = e
            .is_restart_allowed("u", &ServiceState::Active, t0 + Duration::from_millis(100_700))
            .unwrap();
        assert_eq!(
            d,
            RestartDecision::Skipped(SkipReason::Cooldown { remaining_secs: 199 })
        );
    }

    #[test]
    fn skip_reason_text() {
        assert_eq!(
            SkipReason::Cooldown { remaining_secs: 200 }.to_string(),
            "cooldown (200s remaining)"
        );
        assert_eq!(
            SkipReason::RateLimited { count: 4 }.to_string(),
            "rate limit reached (4 restarts in last hour)"
        );
        assert_eq!(
            SkipReason::Transitional(Transition::Reloading).to_string(),
            "unit is in transitional state reloading"
        );
    }
}
