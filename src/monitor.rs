//! The monitor loop.
//!
//! One tick:
//! 1. ask the control channel for the unit state, waiting out transitional
//!    states in 10s steps for at most 300s
//! 2. unit not active → reset the engine, log why, skip probing
//! 3. unit active → probe; feed the outcome to the engine
//! 4. failure threshold reached → ask the engine, restart if allowed
//!
//! Ticks run strictly one after another on the calling thread. A shutdown
//! request is honoured between ticks and between transitional re-queries,
//! never during a probe or control call.

use std::time::Duration;

use log::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::control::ControlChannel;
use crate::engine::{RestartDecision, RestartDecisionEngine, SkipReason};
use crate::error::{ControlError, MonitorError};
use crate::probe::{HealthProbe, HealthSnapshot};
use crate::unit_state::ServiceState;

/// Re-query interval while the unit is in a transitional state.
pub const TRANSITION_POLL: Duration = Duration::from_secs(10);

/// How long a unit may stay transitional before the monitor gives up.
pub const TRANSITION_LIMIT: Duration = Duration::from_secs(300);

/// Granularity of the shutdown check while sleeping between ticks.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// What a single tick observed and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The control channel could not report the unit state.
    StateUnavailable(ControlError),
    /// Unit is not active; probing skipped.
    NotActive(ServiceState),
    Healthy(HealthSnapshot),
    /// Probe failed without reaching the failure threshold.
    Unhealthy { consecutive_failures: u32 },
    RestartSkipped(SkipReason),
    Restarted,
    /// A restart was attempted but the control call failed.
    RestartFailed(ControlError),
    /// Stop was requested while waiting out a transitional state.
    Interrupted,
}

/// Result of waiting out transitional states.
enum Settled {
    State(ServiceState),
    Unavailable(ControlError),
    Interrupted,
}

pub struct MonitorLoop<C, P, K> {
    config: MonitorConfig,
    channel: C,
    probe: P,
    clock: K,
    engine: RestartDecisionEngine,
}

impl<C: ControlChannel, P: HealthProbe, K: Clock> MonitorLoop<C, P, K> {
    pub fn new(config: MonitorConfig, channel: C, probe: P, clock: K) -> Self {
        let engine = RestartDecisionEngine::new(config.restart_policy());
        Self {
            config,
            channel,
            probe,
            clock,
            engine,
        }
    }

    pub fn engine(&self) -> &RestartDecisionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RestartDecisionEngine {
        &mut self.engine
    }

    /// Tick until `stop` returns true. Only a fatal [`MonitorError`] ends the
    /// loop early.
    pub fn run(&mut self, stop: impl Fn() -> bool) -> Result<(), MonitorError> {
        info!(
            "Starting monitor for {} every {}s; will restart unit {} via {} after {} failures",
            self.config.endpoint,
            self.config.interval.as_secs_f64(),
            self.config.unit,
            self.channel.mode(),
            self.config.failure_threshold,
        );

        while !stop() {
            self.tick_until(&stop)?;
            self.sleep_unless(self.config.interval, &stop);
        }
        Ok(())
    }

    /// Run one tick.
    pub fn tick(&mut self) -> Result<TickOutcome, MonitorError> {
        self.tick_until(&|| false)
    }

    /// Run one tick, abandoning a transitional wait once `stop` is true.
    pub fn tick_until(&mut self, stop: &dyn Fn() -> bool) -> Result<TickOutcome, MonitorError> {
        let state = match self.settled_state(stop)? {
            Settled::State(state) => state,
            Settled::Unavailable(e) => {
                error!("Could not determine state of {}: {e}", self.config.unit);
                return Ok(TickOutcome::StateUnavailable(e));
            }
            Settled::Interrupted => {
                info!("Stop requested while waiting for {}", self.config.unit);
                return Ok(TickOutcome::Interrupted);
            }
        };

        let unit = &self.config.unit;
        match &state {
            ServiceState::Active => return self.probe_active(&state),
            ServiceState::Unknown(raw) => {
                return Err(MonitorError::UnknownState {
                    unit: unit.clone(),
                    raw: raw.clone(),
                });
            }
            ServiceState::Maintenance => info!("Unit is in maintenance; refusing restart: {unit}"),
            ServiceState::Inactive => {
                info!("Unit is inactive, but not failed; refusing restart: {unit}")
            }
            ServiceState::Failed => info!("Unit has failed; restart handled by systemd: {unit}"),
            ServiceState::Transitional(_) => {
                // settled_state never returns a transitional state
                debug!("Unit {unit} is {state}; skipping probe");
            }
        }

        self.engine.reset_on_state_exit();
        Ok(TickOutcome::NotActive(state))
    }

    /// Query the unit state, waiting while it is transitional. Every
    /// transitional observation resets the engine, so a unit that relaunches
    /// within one tick starts a fresh grace period.
    fn settled_state(&mut self, stop: &dyn Fn() -> bool) -> Result<Settled, MonitorError> {
        let mut state = match self.channel.active_state(&self.config.unit) {
            Ok(state) => state,
            Err(e) => return Ok(Settled::Unavailable(e)),
        };

        let mut waited = Duration::ZERO;
        while let ServiceState::Transitional(t) = state {
            self.engine.reset_on_state_exit();
            let unit = &self.config.unit;
            if waited > TRANSITION_LIMIT {
                return Err(MonitorError::StuckTransitional {
                    unit: unit.clone(),
                    state: t.as_str().to_string(),
                    waited,
                });
            }
            debug!("Unit {unit} is {}; waited {}s so far", t.as_str(), waited.as_secs());
            if self.sleep_unless(TRANSITION_POLL, stop) {
                return Ok(Settled::Interrupted);
            }
            waited += TRANSITION_POLL;
            state = match self.channel.active_state(&self.config.unit) {
                Ok(state) => state,
                Err(e) => return Ok(Settled::Unavailable(e)),
            };
        }
        Ok(Settled::State(state))
    }

    fn probe_active(&mut self, state: &ServiceState) -> Result<TickOutcome, MonitorError> {
        let endpoint = &self.config.endpoint;
        let snapshot = match self.probe.query(endpoint, self.config.timeout) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let counted = self.engine.responded_since_start();
                self.engine.record_probe_failure();
                let failures = self.engine.consecutive_failures();
                if !counted {
                    info!("No response from {endpoint} since unit start ({e}); not counted as failure");
                    return Ok(TickOutcome::Unhealthy {
                        consecutive_failures: failures,
                    });
                }

                error!("ERROR querying server: {endpoint} {e} (consecutive failures={failures})");
                if failures < self.config.failure_threshold {
                    return Ok(TickOutcome::Unhealthy {
                        consecutive_failures: failures,
                    });
                }

                warn!(
                    "Failure threshold reached ({failures} >= {})",
                    self.config.failure_threshold
                );
                return self.attempt_restart(state);
            }
        };

        self.engine.record_probe_success();
        info!("OK {endpoint} {snapshot}");
        Ok(TickOutcome::Healthy(snapshot))
    }

    fn attempt_restart(&mut self, state: &ServiceState) -> Result<TickOutcome, MonitorError> {
        let unit = &self.config.unit;
        let decision = self
            .engine
            .is_restart_allowed(unit, state, self.clock.now())?;
        if let RestartDecision::Skipped(reason) = decision {
            warn!("Skipping restart: {reason}");
            return Ok(TickOutcome::RestartSkipped(reason));
        }

        info!("Restarting unit {unit} via {}", self.channel.mode());
        let result = self.channel.restart(unit);
        self.engine.record_restart_attempt(self.clock.now());

        match result {
            Ok(()) => {
                info!("Restart of unit succeeded: {unit}");
                Ok(TickOutcome::Restarted)
            }
            Err(e) => {
                error!("Restart failed: {e}");
                Ok(TickOutcome::RestartFailed(e))
            }
        }
    }

    /// Sleep for `total` in short slices. Returns true if `stop` cut the
    /// sleep short.
    fn sleep_unless(&self, total: Duration, stop: &dyn Fn() -> bool) -> bool {
        let mut remaining = total;
        while !remaining.is_zero() {
            if stop() {
                return true;
            }
            let step = remaining.min(SHUTDOWN_POLL);
            self.clock.sleep(step);
            remaining -= step;
        }
        false
    }
}
