//! Unit control - delegates to the systemd service manager
//!
//! Two interchangeable channels implement [`ControlChannel`]:
//! - D-Bus: structured IPC against `org.freedesktop.systemd1` (feature `dbus`)
//! - systemctl: the command-line tool, used when D-Bus is unavailable
//!
//! The channel is chosen once by [`select_channel`] and used for the whole
//! process lifetime. A failing call is reported, never retried in the other
//! mode.

use std::fmt;

use log::{info, warn};
use serde::Deserialize;

use crate::error::{ConfigError, ControlError};
use crate::unit_state::ServiceState;

mod systemctl_control;
pub use systemctl_control::SystemctlControl;

cfg_if::cfg_if! {
    if #[cfg(feature = "dbus")] {
        mod dbus_control;
        pub use dbus_control::DbusControl;

        fn connect_dbus(scope: UnitScope) -> Result<Box<dyn ControlChannel>, String> {
            DbusControl::connect(scope)
                .map(|c| Box::new(c) as Box<dyn ControlChannel>)
                .map_err(|e| e.to_string())
        }
    } else {
        fn connect_dbus(_scope: UnitScope) -> Result<Box<dyn ControlChannel>, String> {
            Err("built without the `dbus` feature".to_string())
        }
    }
}

/// Which service-manager instance owns the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UnitScope {
    /// Per-user manager (`systemctl --user`, session bus)
    #[default]
    User,
    /// System manager (system bus)
    System,
}

impl fmt::Display for UnitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnitScope::User => "user",
            UnitScope::System => "system",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    DBus,
    Systemctl,
}

impl ControlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMode::DBus => "D-Bus",
            ControlMode::Systemctl => "systemctl",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service-manager operations consumed by the monitor.
pub trait ControlChannel {
    fn mode(&self) -> ControlMode;

    /// Current `ActiveState` of `unit`.
    fn active_state(&self, unit: &str) -> Result<ServiceState, ControlError>;

    /// Request a start of `unit` and wait for the manager to acknowledge it.
    fn start(&self, unit: &str) -> Result<(), ControlError>;

    /// Request a restart of `unit` and wait for the manager to acknowledge it.
    fn restart(&self, unit: &str) -> Result<(), ControlError>;
}

macro_rules! forward_control_channel {
    ($($ty:ty),*) => {$(
        impl<T: ControlChannel + ?Sized> ControlChannel for $ty {
            fn mode(&self) -> ControlMode {
                (**self).mode()
            }

            fn active_state(&self, unit: &str) -> Result<ServiceState, ControlError> {
                (**self).active_state(unit)
            }

            fn start(&self, unit: &str) -> Result<(), ControlError> {
                (**self).start(unit)
            }

            fn restart(&self, unit: &str) -> Result<(), ControlError> {
                (**self).restart(unit)
            }
        }
    )*};
}

forward_control_channel!(Box<T>, &T);

/// Pick the control channel for this process: D-Bus when a bus connection
/// can be opened, otherwise `systemctl` from `PATH`.
pub fn select_channel(scope: UnitScope) -> Result<Box<dyn ControlChannel>, ConfigError> {
    let dbus_err = match connect_dbus(scope) {
        Ok(channel) => {
            info!("Using D-Bus to control {scope} units");
            return Ok(channel);
        }
        Err(e) => e,
    };

    match SystemctlControl::locate(scope) {
        Ok(channel) => {
            warn!("D-Bus unavailable ({dbus_err}); falling back to systemctl");
            Ok(Box::new(channel))
        }
        Err(e) => Err(ConfigError::NoControlChannel(format!(
            "D-Bus: {dbus_err}; systemctl: {e}"
        ))),
    }
}
