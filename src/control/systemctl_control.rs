//! Unit control through the `systemctl` command-line tool

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::debug;

use super::{ControlChannel, ControlMode, UnitScope};
use crate::error::ControlError;
use crate::unit_state::ServiceState;

const MODE: &str = "systemctl";

/// Upper bound for any single systemctl invocation.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

const WAIT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct SystemctlControl {
    program: PathBuf,
    scope: UnitScope,
    timeout: Duration,
}

impl SystemctlControl {
    /// Find `systemctl` on `PATH`.
    pub fn locate(scope: UnitScope) -> Result<Self, which::Error> {
        let program = which::which("systemctl")?;
        Ok(Self::with_program(program, scope))
    }

    /// Use an explicit executable instead of searching `PATH`.
    pub fn with_program(program: impl Into<PathBuf>, scope: UnitScope) -> Self {
        Self {
            program: program.into(),
            scope,
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn args<'a>(&self, verb: &[&'a str], unit: &'a str) -> Vec<&'a str> {
        let mut args = Vec::with_capacity(verb.len() + 2);
        if self.scope == UnitScope::User {
            args.push("--user");
        }
        args.extend_from_slice(verb);
        args.push(unit);
        args
    }

    /// Run systemctl and return its stdout, or the failure reason.
    fn run(&self, action: &'static str, verb: &[&str], unit: &str) -> Result<String, ControlError> {
        let args = self.args(verb, unit);
        debug!("{} {}", self.program.display(), args.join(" "));

        let err = |detail: String| ControlError::new(MODE, action, unit, detail);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| err(format!("failed to execute {}: {e}", self.program.display())))?;

        // drain both pipes while waiting so a chatty child cannot block on a full pipe
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait_with_deadline(&mut child, self.timeout)
            .map_err(|e| err(format!("failed waiting for systemctl: {e}")))?;
        let Some(status) = status else {
            // readers are left to finish once the killed child's pipes close
            return Err(err(format!(
                "systemctl did not finish within {}s",
                self.timeout.as_secs()
            )));
        };

        let stdout = collect(stdout).map_err(|e| err(format!("failed reading systemctl stdout: {e}")))?;
        let stderr = collect(stderr).map_err(|e| err(format!("failed reading systemctl stderr: {e}")))?;

        if !status.success() {
            let stderr = stderr.trim();
            let detail = if stderr.is_empty() {
                format!("systemctl exited with {status}")
            } else {
                stderr.to_string()
            };
            return Err(err(detail));
        }

        Ok(stdout)
    }
}

impl ControlChannel for SystemctlControl {
    fn mode(&self) -> ControlMode {
        ControlMode::Systemctl
    }

    fn active_state(&self, unit: &str) -> Result<ServiceState, ControlError> {
        let stdout = self.run("state query", &["show", "-p", "ActiveState"], unit)?;
        Ok(ServiceState::parse(parse_show_value(&stdout, "ActiveState")))
    }

    fn start(&self, unit: &str) -> Result<(), ControlError> {
        self.run("start", &["start"], unit).map(|_| ())
    }

    fn restart(&self, unit: &str) -> Result<(), ControlError> {
        self.run("restart", &["restart"], unit).map(|_| ())
    }
}

/// Wait for `child`, killing it once `timeout` has passed. `Ok(None)` means
/// the deadline was hit.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            // already exited or unkillable; either way we give up on it
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(WAIT_POLL);
    }
}

type PipeReader = Option<JoinHandle<io::Result<Vec<u8>>>>;

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> PipeReader {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn collect(reader: PipeReader) -> io::Result<String> {
    let Some(reader) = reader else {
        return Ok(String::new());
    };
    let buf = reader
        .join()
        .map_err(|_| io::Error::other("pipe reader thread panicked"))??;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Extract the value from `systemctl show -p <key>` output (`key=value`).
/// A bare value without the prefix is returned as is.
fn parse_show_value<'a>(stdout: &'a str, key: &str) -> &'a str {
    let line = stdout.trim();
    line.strip_prefix(key)
        .and_then(|rest| rest.strip_prefix('='))
        .unwrap_or(line)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_scope_prefixes_user_flag() {
        let ctl = SystemctlControl::with_program("systemctl", UnitScope::User);
        assert_eq!(
            ctl.args(&["show", "-p", "ActiveState"], "srcds@a.service"),
            vec!["--user", "show", "-p", "ActiveState", "srcds@a.service"]
        );
    }

    #[test]
    fn system_scope_has_no_user_flag() {
        let ctl = SystemctlControl::with_program("systemctl", UnitScope::System);
        assert_eq!(ctl.args(&["restart"], "srcds.service"), vec!["restart", "srcds.service"]);
    }

    #[test]
    fn show_value_parsing() {
        assert_eq!(parse_show_value("ActiveState=active\n", "ActiveState"), "active");
        assert_eq!(parse_show_value("activating", "ActiveState"), "activating");
        assert_eq!(parse_show_value("ActiveState=\n", "ActiveState"), "");
    }
}
