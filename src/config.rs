//! Monitor configuration.
//!
//! [`MonitorSettings`] is the layered, partially-filled form read from a TOML
//! file and from command-line/environment overrides. [`MonitorSettings::resolve`]
//! applies the defaults, validates everything and produces the immutable
//! [`MonitorConfig`] used for the rest of the process lifetime.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::control::UnitScope;
use crate::engine::RestartPolicy;
use crate::error::ConfigError;
use crate::probe::Endpoint;

pub const DEFAULT_PORT: u32 = 27015;
pub const DEFAULT_INTERVAL_SECS: f64 = 30.0;
pub const DEFAULT_TIMEOUT_SECS: f64 = 5.0;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_RESTART_COOLDOWN_SECS: f64 = 300.0;
pub const DEFAULT_MAX_RESTARTS_PER_HOUR: u32 = 0;

/// On-disk TOML description of the monitor. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorSettings {
    pub server_host: Option<String>,
    pub port: Option<u32>,
    pub unit: Option<String>,
    pub interval_secs: Option<f64>,
    pub timeout_secs: Option<f64>,
    pub failure_threshold: Option<u32>,
    pub restart_cooldown_secs: Option<f64>,
    /// 0 means unlimited.
    pub max_restarts_per_hour: Option<u32>,
    pub unit_scope: Option<UnitScope>,
}

impl MonitorSettings {
    pub fn from_toml_str(s: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let origin = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: origin.clone(),
            source,
        })?;
        Self::from_toml_str(&content, &origin)
    }

    /// Fields set in `other` win over fields set in `self`.
    pub fn overlay(self, other: MonitorSettings) -> Self {
        Self {
            server_host: other.server_host.or(self.server_host),
            port: other.port.or(self.port),
            unit: other.unit.or(self.unit),
            interval_secs: other.interval_secs.or(self.interval_secs),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
            failure_threshold: other.failure_threshold.or(self.failure_threshold),
            restart_cooldown_secs: other.restart_cooldown_secs.or(self.restart_cooldown_secs),
            max_restarts_per_hour: other.max_restarts_per_hour.or(self.max_restarts_per_hour),
            unit_scope: other.unit_scope.or(self.unit_scope),
        }
    }

    /// Apply defaults and validate. A missing host falls back to the local
    /// hostname.
    pub fn resolve(self) -> Result<MonitorConfig, ConfigError> {
        let host = match self.server_host {
            Some(host) => host,
            None => local_hostname()?,
        };
        if host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        let port = self.port.unwrap_or(DEFAULT_PORT);
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(ConfigError::PortOutOfRange(port))?;

        let unit = self.unit.unwrap_or_default();
        if unit.trim().is_empty() {
            return Err(ConfigError::EmptyUnit);
        }

        let interval = positive_secs("interval", self.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS))?;
        let timeout = positive_secs("timeout", self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))?;

        let failure_threshold = self.failure_threshold.unwrap_or(DEFAULT_FAILURE_THRESHOLD);
        if failure_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }

        let cooldown = self
            .restart_cooldown_secs
            .unwrap_or(DEFAULT_RESTART_COOLDOWN_SECS);
        if !cooldown.is_finite() || cooldown < 0.0 {
            return Err(ConfigError::Negative {
                name: "restart cooldown",
                value: cooldown,
            });
        }

        Ok(MonitorConfig {
            endpoint: Endpoint::new(host, port),
            unit,
            interval,
            timeout,
            failure_threshold,
            restart_cooldown: secs_to_duration("restart cooldown", cooldown)?,
            max_restarts_per_hour: self
                .max_restarts_per_hour
                .unwrap_or(DEFAULT_MAX_RESTARTS_PER_HOUR),
            scope: self.unit_scope.unwrap_or_default(),
        })
    }
}

fn positive_secs(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::NotPositive { name, value });
    }
    secs_to_duration(name, value)
}

fn secs_to_duration(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::TooLarge { name, value })
}

fn local_hostname() -> Result<String, ConfigError> {
    let name = nix::unistd::gethostname().map_err(|e| ConfigError::Hostname(e.to_string()))?;
    name.into_string()
        .map_err(|raw| ConfigError::Hostname(format!("not valid UTF-8: {raw:?}")))
}

/// Validated, immutable monitor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub endpoint: Endpoint,
    pub unit: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub restart_cooldown: Duration,
    pub max_restarts_per_hour: u32,
    pub scope: UnitScope,
}

impl MonitorConfig {
    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            cooldown: self.restart_cooldown,
            max_per_hour: self.max_restarts_per_hour,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> MonitorSettings {
        MonitorSettings {
            server_host: Some("127.0.0.1".into()),
            unit: Some("srcds.service".into()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_apply() {
        let cfg = minimal().resolve().unwrap();
        assert_eq!(cfg.endpoint, Endpoint::new("127.0.0.1", 27015));
        assert_eq!(cfg.interval, Duration::from_secs(30));
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert_eq!(cfg.failure_threshold, 3);
        assert_eq!(cfg.restart_cooldown, Duration::from_secs(300));
        assert_eq!(cfg.max_restarts_per_hour, 0);
        assert_eq!(cfg.scope, UnitScope::User);
    }

    #[test]
    fn rejects_bad_port() {
        for port in [0, 65536, 100_000] {
            let s = MonitorSettings {
                port: Some(port),
                ..minimal()
            };
            assert!(matches!(s.resolve(), Err(ConfigError::PortOutOfRange(p)) if p == port));
        }
    }

    #[test]
    fn rejects_non_positive_interval_and_timeout() {
        let s = MonitorSettings {
            interval_secs: Some(0.0),
            ..minimal()
        };
        assert!(matches!(s.resolve(), Err(ConfigError::NotPositive { name: "interval", .. })));

        let s = MonitorSettings {
            timeout_secs: Some(-1.0),
            ..minimal()
        };
        assert!(matches!(s.resolve(), Err(ConfigError::NotPositive { name: "timeout", .. })));

        let s = MonitorSettings {
            interval_secs: Some(f64::NAN),
            ..minimal()
        };
        assert!(s.resolve().is_err());
    }

    #[test]
    fn rejects_zero_threshold_and_negative_cooldown() {
        let s = MonitorSettings {
            failure_threshold: Some(0),
            ..minimal()
        };
        assert!(matches!(s.resolve(), Err(ConfigError::ZeroThreshold)));

        let s = MonitorSettings {
            restart_cooldown_secs: Some(-0.5),
            ..minimal()
        };
        assert!(matches!(s.resolve(), Err(ConfigError::Negative { .. })));
    }

    #[test]
    fn zero_cooldown_is_allowed() {
        let s = MonitorSettings {
            restart_cooldown_secs: Some(0.0),
            ..minimal()
        };
        assert_eq!(s.resolve().unwrap().restart_cooldown, Duration::ZERO);
    }

    #[test]
    fn rejects_empty_host_and_unit() {
        let s = MonitorSettings {
            server_host: Some("  ".into()),
            ..minimal()
        };
        assert!(matches!(s.resolve(), Err(ConfigError::EmptyHost)));

        let s = MonitorSettings {
            unit: None,
            ..minimal()
        };
        assert!(matches!(s.resolve(), Err(ConfigError::EmptyUnit)));
    }

    #[test]
    fn overlay_prefers_later_layer() {
        let file = MonitorSettings {
            port: Some(27016),
            failure_threshold: Some(5),
            ..minimal()
        };
        let cli = MonitorSettings {
            failure_threshold: Some(2),
            ..Default::default()
        };
        let merged = file.overlay(cli);
        assert_eq!(merged.port, Some(27016));
        assert_eq!(merged.failure_threshold, Some(2));
        assert_eq!(merged.unit.as_deref(), Some("srcds.service"));
    }
}
