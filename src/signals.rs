//! Polling-based SIGINT / SIGTERM handling.
//!
//! The handler only stores the signal number; the monitor loop polls it
//! between ticks.

use std::sync::atomic::{AtomicI32, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

static RECEIVED_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn handler(sig: i32) {
    RECEIVED_SIGNAL.store(sig, Ordering::SeqCst);
}

/// Install handlers for SIGINT and SIGTERM. `SA_RESTART` keeps blocking
/// probe and control calls from being cut short.
pub fn install_signal_handlers() -> anyhow::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handler),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only performs an atomic store.
        unsafe { signal::sigaction(sig, &action) }
            .map_err(|e| anyhow::anyhow!("Failed to register {sig} handler: {e}"))?;
    }
    Ok(())
}

/// The signal received so far, if any. Does not clear it.
pub fn received_signal() -> Option<Signal> {
    match RECEIVED_SIGNAL.load(Ordering::SeqCst) {
        0 => None,
        n => match Signal::try_from(n) {
            Ok(sig) => Some(sig),
            Err(e) => {
                log::error!("BUG: invalid signal number {n} from signal handler: {e}");
                None
            }
        },
    }
}

pub fn shutdown_requested() -> bool {
    RECEIVED_SIGNAL.load(Ordering::SeqCst) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raised_signal_is_reported_by_name() {
        install_signal_handlers().unwrap();
        assert_eq!(received_signal(), None);
        signal::raise(Signal::SIGTERM).unwrap();
        assert_eq!(received_signal(), Some(Signal::SIGTERM));
        assert!(shutdown_requested());
    }
}
