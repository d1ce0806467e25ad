//! Sync session state and lifecycle.
//!
//! A session pairs one sidecar container with one external sync process.
//! [`SessionRegistry`] owns all live sessions and enforces
//! at-most-one-session-per-volume; [`provision`] creates sessions for
//! in-scope mounts and [`teardown`] removes them on unmounts.
use std::path::PathBuf;

use crate::sync::SyncHandle;

mod error;
mod provision;
mod registry;
mod teardown;

pub use error::{Error, Result};
pub use provision::ensure_session;
pub use registry::SessionRegistry;
pub use teardown::remove_session;

/// One live synchronization session for a volume.
pub struct SyncSession {
    sidecar: String,
    host_port: u16,
    process: Option<Box<dyn SyncHandle>>,
    log_path: PathBuf,
}

impl SyncSession {
    pub fn new(
        sidecar: String,
        host_port: u16,
        process: Box<dyn SyncHandle>,
        log_path: PathBuf,
    ) -> Self {
        Self {
            sidecar,
            host_port,
            process: Some(process),
            log_path,
        }
    }

    /// A session rebuilt from live engine state after a monitor restart.
    /// The sync process launched by the previous run is detached and
    /// cannot be re-acquired, so the session carries no handle.
    pub fn recovered(sidecar: String, host_port: u16, log_path: PathBuf) -> Self {
        Self {
            sidecar,
            host_port,
            process: None,
            log_path,
        }
    }

    pub fn sidecar(&self) -> &str {
        &self.sidecar
    }

    pub fn host_port(&self) -> u16 {
        self.host_port
    }

    pub fn log_path(&self) -> &std::path::Path {
        &self.log_path
    }

    pub(crate) fn process_mut(&mut self) -> Option<&mut Box<dyn SyncHandle>> {
        self.process.as_mut()
    }
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("sidecar", &self.sidecar)
            .field("host_port", &self.host_port)
            .field("pid", &self.process.as_ref().map(|p| p.pid()))
            .field("log_path", &self.log_path)
            .finish()
    }
}
