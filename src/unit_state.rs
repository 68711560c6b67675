//! Service-manager unit state as observed on a single tick.
//!
//! Maps systemd's `ActiveState` property onto a closed enum. Values are
//! produced fresh by every control-channel query and are never cached.

use std::fmt;

/// Sub-states systemd reports while a unit is changing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Activating,
    Deactivating,
    Reloading,
    Refreshing,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activating => "activating",
            Self::Deactivating => "deactivating",
            Self::Reloading => "reloading",
            Self::Refreshing => "refreshing",
        }
    }
}

/// High-level unit state (systemd `ActiveState`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceState {
    Active,
    Inactive,
    Failed,
    Transitional(Transition),
    Maintenance,
    /// Anything systemd reported that this crate does not know about.
    Unknown(String),
}

impl ServiceState {
    /// Parse an `ActiveState` value. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "active" => Self::Active,
            "inactive" => Self::Inactive,
            "failed" => Self::Failed,
            "activating" => Self::Transitional(Transition::Activating),
            "deactivating" => Self::Transitional(Transition::Deactivating),
            "reloading" => Self::Transitional(Transition::Reloading),
            "refreshing" => Self::Transitional(Transition::Refreshing),
            "maintenance" => Self::Maintenance,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Inactive => f.write_str("inactive"),
            Self::Failed => f.write_str("failed"),
            Self::Transitional(t) => f.write_str(t.as_str()),
            Self::Maintenance => f.write_str("maintenance"),
            Self::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_known_active_state() {
        assert_eq!(ServiceState::parse("active"), ServiceState::Active);
        assert_eq!(ServiceState::parse("inactive"), ServiceState::Inactive);
        assert_eq!(ServiceState::parse("failed"), ServiceState::Failed);
        assert_eq!(ServiceState::parse("maintenance"), ServiceState::Maintenance);
        for t in [
            Transition::Activating,
            Transition::Deactivating,
            Transition::Reloading,
            Transition::Refreshing,
        ] {
            assert_eq!(ServiceState::parse(t.as_str()), ServiceState::Transitional(t));
        }
    }

    #[test]
    fn trims_trailing_newline() {
        assert_eq!(ServiceState::parse("active\n"), ServiceState::Active);
    }

    #[test]
    fn unknown_keeps_raw_value() {
        assert_eq!(
            ServiceState::parse("exploded"),
            ServiceState::Unknown("exploded".to_string())
        );
        assert_eq!(ServiceState::parse("").to_string(), "unknown()");
    }
}
