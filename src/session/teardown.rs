use crate::engine::ContainerEngine;
use crate::volume::VolumeID;

use super::{Result, SessionRegistry};

/// Tears down the sync session of the given volume.
///
/// Idempotent: a volume with no registry entry and no sidecar is left
/// alone. The sidecar lookup runs independently of the registry, so a
/// sidecar surviving from a previous monitor run is stopped even when the
/// in-memory state never knew it. Returns `true` if anything was stopped.
///
/// # Errors
///
/// Returns [`Error::Engine`] if stopping an existing sidecar fails.
/// Signalling a sync process that already exited is tolerated and logged,
/// never surfaced.
///
/// [`Error::Engine`]: super::Error::Engine
pub async fn remove_session<E: ContainerEngine>(
    engine: &E,
    registry: &SessionRegistry,
    volume: &VolumeID,
) -> Result<bool> {
    let mut stopped = false;

    if let Some(mut session) = registry.remove(volume) {
        if let Some(handle) = session.process_mut() {
            if handle.is_alive() {
                let pid = handle.pid();
                match handle.signal_stop() {
                    Ok(()) => {
                        log::info!("stopping unison (pid={}) for volume `{}`", pid, volume)
                    }
                    Err(err) => {
                        log::debug!("sync process for volume `{}` was already gone: {}", volume, err)
                    }
                }
            }
        }
        stopped = true;
    }

    let sidecar = volume.sidecar_name();
    if engine.stop_sidecar(&sidecar).await? {
        log::info!("stopped sync sidecar `{}`", sidecar);
        stopped = true;
    } else {
        log::debug!("no sync sidecar `{}` to stop", sidecar);
    }

    Ok(stopped)
}
