//! Error taxonomy for the monitor.
//!
//! Recoverable errors ([`ControlError`], [`ProbeError`]) are logged by the
//! monitor loop and re-evaluated on the next tick. [`MonitorError`] carries
//! the conditions that terminate the loop or the process.

use std::time::Duration;

use thiserror::Error;

/// Invalid or missing configuration. Always fatal before the loop starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("server host must be provided and non-empty (--server-host or SERVER_HOST)")]
    EmptyHost,

    #[error("port must be in range 1..65535, got {0}")]
    PortOutOfRange(u32),

    #[error("systemd unit must be provided and non-empty (--systemd-unit or SERVER_UNIT)")]
    EmptyUnit,

    #[error("{name} must be a positive number of seconds, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("{name} must be a non-negative number of seconds, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("{name} of {value} seconds is too large")]
    TooLarge { name: &'static str, value: f64 },

    #[error("failure threshold must be >= 1")]
    ZeroThreshold,

    #[error("could not determine local hostname: {0}")]
    Hostname(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("no control channel available: {0}")]
    NoControlChannel(String),
}

/// A control-channel call (state query, start, restart) failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{mode} {action} of {unit} failed: {detail}")]
pub struct ControlError {
    pub mode: &'static str,
    pub action: &'static str,
    pub unit: String,
    pub detail: String,
}

impl ControlError {
    pub fn new(
        mode: &'static str,
        action: &'static str,
        unit: &str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            action,
            unit: unit.to_string(),
            detail: detail.into(),
        }
    }
}

/// The health probe could not obtain a snapshot.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("could not resolve {endpoint}: {reason}")]
    Resolve { endpoint: String, reason: String },

    #[error("query to {endpoint} failed: {reason}")]
    Query { endpoint: String, reason: String },
}

/// Conditions that stop the monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unit {unit} has been in state {state} for over {}s", .waited.as_secs())]
    StuckTransitional {
        unit: String,
        state: String,
        waited: Duration,
    },

    #[error("unit {unit} reported unknown state {raw:?}")]
    UnknownState { unit: String, raw: String },

    #[error(transparent)]
    Control(#[from] ControlError),
}

impl MonitorError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            MonitorError::Config(_) => 2,
            _ => 1,
        }
    }
}
