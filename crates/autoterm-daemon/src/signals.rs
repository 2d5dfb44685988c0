//! Signal handling for graceful daemon shutdown.
//!
//! SIGTERM and SIGINT request shutdown, SIGHUP requests a state snapshot
//! in the log. Handlers only flip atomic flags; the main loop polls them.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);
static RELOAD_FLAG: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn handle_signal(signum: libc::c_int) {
    // Async-signal-safe: nothing but atomic stores.
    match signum {
        libc::SIGTERM | libc::SIGINT => SHUTDOWN_FLAG.store(true, Ordering::Relaxed),
        libc::SIGHUP => RELOAD_FLAG.store(true, Ordering::Relaxed),
        _ => {}
    }
}

/// Handle for signal management.
#[derive(Clone)]
pub struct SignalHandler {
    _private: (),
}

impl SignalHandler {
    /// Register handlers for SIGTERM, SIGINT, and SIGHUP.
    ///
    /// On non-Unix platforms only manual shutdown requests work.
    pub fn new() -> std::io::Result<Self> {
        #[cfg(unix)]
        Self::register_unix_handlers()?;
        debug!("signal handlers installed");
        Ok(Self { _private: () })
    }

    #[cfg(unix)]
    fn register_unix_handlers() -> std::io::Result<()> {
        for signum in [libc::SIGTERM, libc::SIGINT, libc::SIGHUP] {
            let previous = unsafe { libc::signal(signum, handle_signal as libc::sighandler_t) };
            if previous == libc::SIG_ERR {
                return Err(std::io::Error::last_os_error());
            }
        }
        Ok(())
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        SHUTDOWN_FLAG.load(Ordering::Relaxed)
    }

    /// Check if a reload/snapshot was requested, clearing the flag.
    #[inline]
    pub fn take_reload_request(&self) -> bool {
        RELOAD_FLAG.swap(false, Ordering::Relaxed)
    }

    /// Request shutdown from any thread.
    pub fn request_shutdown(&self) {
        SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
    }

    /// Request a snapshot from any thread.
    pub fn request_reload(&self) {
        RELOAD_FLAG.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_request_is_taken_once() {
        let handler = SignalHandler { _private: () };
        handler.request_reload();
        assert!(handler.take_reload_request());
        assert!(!handler.take_reload_request());
    }

    #[test]
    fn test_manual_shutdown_request() {
        let handler = SignalHandler { _private: () };
        handler.request_shutdown();
        assert!(handler.shutdown_requested());
        // Clear for other tests in this process.
        SHUTDOWN_FLAG.store(false, Ordering::Relaxed);
    }
}
