mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use srcdsmond::clock::SystemClock;
use srcdsmond::control::{self, ControlChannel};
use srcdsmond::{
    A2sProbe, ConfigError, HealthProbe, MonitorConfig, MonitorError, MonitorLoop, MonitorSettings,
    logging, signals,
};

fn main() {
    logging::init();

    let args = cli::Args::parse();
    match real_main(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(exit_code(&e));
        }
    }
}

fn real_main(args: cli::Args) -> Result<i32> {
    let cfg = load_config(&args.settings).context("Configuration error")?;

    match args.sub.unwrap_or(cli::Cmd::Run) {
        cli::Cmd::Run => run_monitor(cfg),
        cli::Cmd::Status => handle_status(&cfg),
        cli::Cmd::Start => handle_start(&cfg),
        cli::Cmd::Restart => handle_restart(&cfg),
        cli::Cmd::Probe => handle_probe(&cfg),
    }
}

/// Defaults < TOML file < environment / flags.
fn load_config(args: &cli::SettingsArgs) -> Result<MonitorConfig, ConfigError> {
    let file = match &args.config {
        Some(path) => MonitorSettings::load(path)?,
        None => MonitorSettings::default(),
    };
    file.overlay(args.to_settings()).resolve()
}

/// Configuration problems exit with 2, everything else with 1.
fn exit_code(e: &anyhow::Error) -> i32 {
    if e.downcast_ref::<ConfigError>().is_some() {
        return 2;
    }
    e.downcast_ref::<MonitorError>()
        .map(MonitorError::exit_code)
        .unwrap_or(1)
}

fn run_monitor(cfg: MonitorConfig) -> Result<i32> {
    let channel = control::select_channel(cfg.scope)?;
    signals::install_signal_handlers()?;

    let probe = A2sProbe::new().context("Failed to start probe runtime")?;

    info!("srcdsmond started (pid {})", std::process::id());
    let mut monitor = MonitorLoop::new(cfg, channel, probe, SystemClock);
    monitor.run(signals::shutdown_requested)?;

    match signals::received_signal() {
        Some(sig) => info!("Interrupted by {sig}, exiting"),
        None => info!("Interrupted by signal, exiting"),
    }
    Ok(0)
}

/// Handle status command - print the unit's ActiveState
fn handle_status(cfg: &MonitorConfig) -> Result<i32> {
    let channel = control::select_channel(cfg.scope)?;
    let state = channel
        .active_state(&cfg.unit)
        .map_err(MonitorError::Control)?;
    println!("{} is {state}", cfg.unit);
    Ok(if state.is_active() { 0 } else { 1 })
}

/// Handle start command - start the unit through the service manager
fn handle_start(cfg: &MonitorConfig) -> Result<i32> {
    let channel = control::select_channel(cfg.scope)?;
    match channel.start(&cfg.unit) {
        Ok(()) => {
            println!("{} started successfully", cfg.unit);
            Ok(0)
        }
        Err(e) => {
            eprintln!("Failed to start: {e}");
            Ok(1)
        }
    }
}

/// Handle restart command - restart the unit through the service manager
fn handle_restart(cfg: &MonitorConfig) -> Result<i32> {
    let channel = control::select_channel(cfg.scope)?;
    match channel.restart(&cfg.unit) {
        Ok(()) => {
            println!("{} restarted successfully", cfg.unit);
            Ok(0)
        }
        Err(e) => {
            eprintln!("Failed to restart: {e}");
            Ok(1)
        }
    }
}

/// Handle probe command - one A2S query against the endpoint
fn handle_probe(cfg: &MonitorConfig) -> Result<i32> {
    let probe = A2sProbe::new().context("Failed to start probe runtime")?;
    match probe.query(&cfg.endpoint, cfg.timeout) {
        Ok(snapshot) => {
            println!("OK {} {snapshot}", cfg.endpoint);
            Ok(0)
        }
        Err(e) => {
            eprintln!("ERROR {e}");
            Ok(1)
        }
    }
}
