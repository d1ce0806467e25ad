//! The external sync process boundary.
//!
//! The monitor treats the file synchronizer as a black box: a
//! [`SyncLauncher`] starts one detached process per session and hands
//! back a [`SyncHandle`] that can be probed and signalled on teardown.
//! [`UnisonLauncher`] is the production implementation; tests substitute
//! in-memory fakes.
mod error;
mod unison;

pub use error::{Error, Result};
pub use unison::{UnisonLauncher, session_log_path};

/// URL of the sync listener published on the given host port, in the form
/// the external synchronizer expects as its second root.
pub fn socket_endpoint(host_port: u16) -> String {
    format!("socket://localhost:{host_port}/")
}

/// A running sync process. Outlives the handling of the event that
/// launched it; the monitor only ever signals it to stop.
pub trait SyncHandle: Send + Sync {
    /// OS process id, for logging.
    fn pid(&self) -> u32;

    /// Whether the process has not yet exited, so callers can decide if
    /// signalling is meaningful.
    fn is_alive(&mut self) -> bool;

    /// Requests a graceful stop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signal`] if the signal cannot be delivered, e.g.
    /// because the process exited in the meantime.
    fn signal_stop(&mut self) -> Result<()>;
}

/// Launches sync processes for provisioned sessions.
pub trait SyncLauncher: Send + Sync {
    /// Starts a detached watch-mode sync between `source` and `endpoint`,
    /// logging to `log_path` (whose directory is created if missing).
    fn launch(
        &self,
        source: &std::path::Path,
        endpoint: &str,
        log_path: &std::path::Path,
    ) -> Result<Box<dyn SyncHandle>>;
}
