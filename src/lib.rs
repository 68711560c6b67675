//! srcdsmond: keeps a Source dedicated server's systemd unit alive.
//!
//! The monitor polls the unit state through the service manager, probes the
//! server with an A2S query while the unit is active, and restarts the unit
//! after a configurable number of consecutive failed probes. Restarts are
//! gated by a startup grace period, a cooldown and an hourly rate limit.

pub mod clock;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod probe;
pub mod signals;
pub mod unit_state;

pub use config::{MonitorConfig, MonitorSettings};
pub use control::{ControlChannel, ControlMode, UnitScope};
pub use engine::{RestartDecision, RestartDecisionEngine, RestartHistory, RestartPolicy, SkipReason};
pub use error::{ConfigError, ControlError, MonitorError, ProbeError};
pub use monitor::{MonitorLoop, TickOutcome};
pub use probe::{A2sProbe, Endpoint, HealthProbe, HealthSnapshot};
pub use unit_state::{ServiceState, Transition};
