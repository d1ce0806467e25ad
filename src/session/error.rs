use std::time::Duration;

use crate::volume::VolumeID;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] crate::engine::Error),
    #[error(transparent)]
    Sync(#[from] crate::sync::Error),
    #[error("volume `{volume}` is enabled but carries no `vsync.source` label")]
    MissingSource { volume: VolumeID },
    #[error("sidecar `{sidecar}` exposes no published host port")]
    MissingHostPort { sidecar: String },
    #[error("sync listener in sidecar `{sidecar}` not ready after {waited:?}")]
    ProvisioningTimeout { sidecar: String, waited: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;
