//! Scripted fakes for the monitor's collaborators.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

use srcdsmond::{
    ControlChannel, ControlError, ControlMode, Endpoint, HealthProbe, HealthSnapshot,
    MonitorConfig, MonitorSettings, ProbeError, ServiceState, UnitScope,
};

pub const UNIT: &str = "srcds@test.service";

pub fn config(threshold: u32, cooldown_secs: f64, max_per_hour: u32) -> MonitorConfig {
    MonitorSettings {
        server_host: Some("127.0.0.1".into()),
        port: Some(27015),
        unit: Some(UNIT.into()),
        interval_secs: Some(30.0),
        timeout_secs: Some(5.0),
        failure_threshold: Some(threshold),
        restart_cooldown_secs: Some(cooldown_secs),
        max_restarts_per_hour: Some(max_per_hour),
        unit_scope: Some(UnitScope::User),
    }
    .resolve()
    .expect("valid test config")
}

/// Reports queued states, then repeats the last one forever.
pub struct ScriptedChannel {
    states: RefCell<VecDeque<Result<ServiceState, ControlError>>>,
    last: RefCell<ServiceState>,
    pub queries: Cell<u32>,
    pub restarts: Cell<u32>,
    restart_error: RefCell<Option<String>>,
}

impl ScriptedChannel {
    pub fn always(state: ServiceState) -> Self {
        Self {
            states: RefCell::new(VecDeque::new()),
            last: RefCell::new(state),
            queries: Cell::new(0),
            restarts: Cell::new(0),
            restart_error: RefCell::new(None),
        }
    }

    pub fn then(self, state: ServiceState) -> Self {
        self.states.borrow_mut().push_back(Ok(state));
        self
    }

    pub fn then_error(self, detail: &str) -> Self {
        self.states
            .borrow_mut()
            .push_back(Err(ControlError::new("fake", "state query", UNIT, detail)));
        self
    }

    /// Queue a state for later ticks, after the ones already queued.
    pub fn push(&self, state: ServiceState) {
        self.states.borrow_mut().push_back(Ok(state));
    }

    pub fn set_default(&self, state: ServiceState) {
        *self.last.borrow_mut() = state;
    }

    pub fn fail_restarts(&self, detail: &str) {
        *self.restart_error.borrow_mut() = Some(detail.to_string());
    }
}

impl ControlChannel for ScriptedChannel {
    fn mode(&self) -> ControlMode {
        ControlMode::Systemctl
    }

    fn active_state(&self, _unit: &str) -> Result<ServiceState, ControlError> {
        self.queries.set(self.queries.get() + 1);
        match self.states.borrow_mut().pop_front() {
            Some(Ok(state)) => {
                *self.last.borrow_mut() = state.clone();
                Ok(state)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last.borrow().clone()),
        }
    }

    fn start(&self, unit: &str) -> Result<(), ControlError> {
        Err(ControlError::new("fake", "start", unit, "monitor must never start units"))
    }

    fn restart(&self, unit: &str) -> Result<(), ControlError> {
        self.restarts.set(self.restarts.get() + 1);
        match self.restart_error.borrow().as_ref() {
            Some(detail) => Err(ControlError::new("fake", "restart", unit, detail.clone())),
            None => Ok(()),
        }
    }
}

/// Answers queued outcomes in order; `true` = server answered.
/// Fails once the queue is empty.
#[derive(Default)]
pub struct ScriptedProbe {
    outcomes: RefCell<VecDeque<bool>>,
    pub calls: Cell<u32>,
}

impl ScriptedProbe {
    pub fn new(outcomes: &[bool]) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.iter().copied().collect()),
            calls: Cell::new(0),
        }
    }

    pub fn push(&self, outcomes: &[bool]) {
        self.outcomes.borrow_mut().extend(outcomes.iter().copied());
    }
}

impl HealthProbe for ScriptedProbe {
    fn query(&self, endpoint: &Endpoint, _timeout: Duration) -> Result<HealthSnapshot, ProbeError> {
        self.calls.set(self.calls.get() + 1);
        if self.outcomes.borrow_mut().pop_front().unwrap_or(false) {
            Ok(HealthSnapshot {
                players: 3,
                max_players: 24,
                map: "cs_office".to_string(),
            })
        } else {
            Err(ProbeError::Query {
                endpoint: endpoint.to_string(),
                reason: "timed out".to_string(),
            })
        }
    }
}
