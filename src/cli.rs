use std::path::PathBuf;

use clap::{Parser, Subcommand};
use srcdsmond::{MonitorSettings, UnitScope};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "SRCDS monitor that restarts its systemd unit when the server stops answering"
)]
pub struct Args {
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Sub‑commands (run, status, etc.)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(clap::Args, Debug, Default)]
pub struct SettingsArgs {
    /// Path to a TOML configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// SRCDS host/IP (defaults to the local hostname)
    #[arg(long, env = "SERVER_HOST", global = true)]
    pub server_host: Option<String>,

    /// SRCDS query port
    #[arg(long, env = "SERVER_PORT", global = true)]
    pub port: Option<u32>,

    /// systemd unit to control (e.g. my-server@instance.service)
    #[arg(long, env = "SERVER_UNIT", global = true)]
    pub systemd_unit: Option<String>,

    /// Seconds between checks
    #[arg(long, env = "INTERVAL", global = true)]
    pub interval: Option<f64>,

    /// A2S query timeout in seconds
    #[arg(long, env = "TIMEOUT", global = true)]
    pub timeout: Option<f64>,

    /// Consecutive failed queries before a restart
    #[arg(long, env = "FAILURE_THRESHOLD", global = true)]
    pub failure_threshold: Option<u32>,

    /// Minimum seconds between restarts
    #[arg(long, env = "RESTART_COOLDOWN", global = true)]
    pub restart_cooldown: Option<f64>,

    /// Max restarts in a rolling hour (0 = unlimited)
    #[arg(long, env = "MAX_RESTARTS_PER_HOUR", global = true)]
    pub max_restarts_per_hour: Option<u32>,

    /// Control a user or system unit
    #[arg(long, env = "SERVER_UNIT_SCOPE", value_enum, global = true)]
    pub unit_scope: Option<UnitScope>,
}

impl SettingsArgs {
    /// Command-line / environment layer of the configuration.
    pub fn to_settings(&self) -> MonitorSettings {
        MonitorSettings {
            server_host: self.server_host.clone(),
            port: self.port,
            unit: self.systemd_unit.clone(),
            interval_secs: self.interval,
            timeout_secs: self.timeout,
            failure_threshold: self.failure_threshold,
            restart_cooldown_secs: self.restart_cooldown,
            max_restarts_per_hour: self.max_restarts_per_hour,
            unit_scope: self.unit_scope,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Monitor the server (default if no sub‑command)
    Run,
    /// Print the unit state (Exit 0 = active, 1 = anything else)
    Status,
    /// Start the unit once (Exit 0 = success, 1 = failed)
    Start,
    /// Restart the unit once (Exit 0 = success, 1 = failed)
    Restart,
    /// Query the server once and print the result (Exit 0 = answered, 1 = failed)
    Probe,
}
