//! Unit control over D-Bus (`org.freedesktop.systemd1`)

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use zbus::blocking::{Connection, Proxy};
use zbus::zvariant::OwnedObjectPath;

use super::{ControlChannel, ControlMode, UnitScope};
use crate::error::ControlError;
use crate::unit_state::ServiceState;

const MODE: &str = "D-Bus";

const DESTINATION: &str = "org.freedesktop.systemd1";
const MANAGER_PATH: &str = "/org/freedesktop/systemd1";
const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";
const UNIT_INTERFACE: &str = "org.freedesktop.systemd1.Unit";

/// Job mode passed to StartUnit / RestartUnit.
const JOB_MODE: &str = "replace";

/// Upper bound for any single method call, matching the systemctl limit.
pub const METHOD_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DbusControl {
    conn: Connection,
    timeout: Duration,
}

impl DbusControl {
    /// Open the session bus for user units or the system bus for system units.
    pub fn connect(scope: UnitScope) -> zbus::Result<Self> {
        let conn = match scope {
            UnitScope::User => Connection::session()?,
            UnitScope::System => Connection::system()?,
        };
        Ok(Self {
            conn,
            timeout: METHOD_TIMEOUT,
        })
    }
}

/// Run `call` on a worker thread and give up on it after `timeout`. A call
/// that never returns only parks its own thread.
fn with_deadline<T, F>(timeout: Duration, call: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> zbus::Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    thread::spawn(move || {
        // receiver gone means the caller already timed out
        let _ = tx.send(call());
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(format!(
            "no reply from systemd within {}s",
            timeout.as_secs()
        )),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err("D-Bus worker thread exited without a reply".to_string())
        }
    }
}

fn manager(conn: &Connection) -> zbus::Result<Proxy<'static>> {
    Proxy::new(conn, DESTINATION, MANAGER_PATH, MANAGER_INTERFACE)
}

fn query_active_state(conn: Connection, unit: String) -> zbus::Result<String> {
    let path: OwnedObjectPath = manager(&conn)?.call("GetUnit", &(unit.as_str(),))?;
    let unit_proxy = Proxy::new(&conn, DESTINATION, path.into_inner(), UNIT_INTERFACE)?;
    unit_proxy.get_property::<String>("ActiveState")
}

fn submit_job(conn: Connection, method: &'static str, unit: String) -> zbus::Result<()> {
    let _job: OwnedObjectPath = manager(&conn)?.call(method, &(unit.as_str(), JOB_MODE))?;
    Ok(())
}

impl ControlChannel for DbusControl {
    fn mode(&self) -> ControlMode {
        ControlMode::DBus
    }

    fn active_state(&self, unit: &str) -> Result<ServiceState, ControlError> {
        let (conn, owned) = (self.conn.clone(), unit.to_string());
        with_deadline(self.timeout, move || query_active_state(conn, owned))
            .map(|raw| ServiceState::parse(&raw))
            .map_err(|e| ControlError::new(MODE, "state query", unit, e))
    }

    fn start(&self, unit: &str) -> Result<(), ControlError> {
        let (conn, owned) = (self.conn.clone(), unit.to_string());
        with_deadline(self.timeout, move || submit_job(conn, "StartUnit", owned))
            .map_err(|e| ControlError::new(MODE, "start", unit, e))
    }

    fn restart(&self, unit: &str) -> Result<(), ControlError> {
        let (conn, owned) = (self.conn.clone(), unit.to_string());
        with_deadline(self.timeout, move || submit_job(conn, "RestartUnit", owned))
            .map_err(|e| ControlError::new(MODE, "restart", unit, e))
    }
}
