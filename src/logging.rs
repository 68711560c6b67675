//! Process-wide logger: local ISO-8601 timestamp, level, message.

use std::io::Write;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Logger builder with the monitor's line format. `RUST_LOG` overrides the
/// default `info` level.
pub fn builder() -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} {}",
                chrono::Local::now().format(TIMESTAMP_FORMAT),
                record.level(),
                record.args()
            )
        });
    builder
}

pub fn init() {
    builder().init();
}
