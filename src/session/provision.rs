use std::time::Duration;

use crate::config::Config;
use crate::engine::{ContainerEngine, SidecarSpec};
use crate::sync::{self, SyncLauncher};
use crate::volume::VolumeRef;

use super::{Error, Result, SessionRegistry, SyncSession};

/// First readiness probe delay; doubles on every retry.
const PROBE_DELAY: Duration = Duration::from_millis(100);

/// Upper bound for a single readiness probe delay.
const PROBE_DELAY_CAP: Duration = Duration::from_secs(2);

/// Ensures a live sync session exists for the given in-scope volume.
///
/// Idempotent: if the registry already tracks the volume, or the
/// deterministic sidecar already exists in the engine (a duplicate mount
/// event, or engine state surviving a monitor restart), nothing new is
/// created. Returns `true` only when a fresh session was provisioned.
///
/// # Errors
///
/// - [`Error::MissingSource`] if the volume is enabled but names no host
///   path to synchronize.
/// - [`Error::ProvisioningTimeout`] if the sidecar's sync listener does
///   not come up within the configured bound; the half-created sidecar is
///   stopped best-effort.
/// - [`Error::MissingHostPort`] if the engine reports no published port
///   for the sidecar.
/// - [`Error::Engine`] / [`Error::Sync`] for failing engine calls or a
///   failing process launch.
pub async fn ensure_session<E, L>(
    engine: &E,
    launcher: &L,
    registry: &SessionRegistry,
    config: &Config,
    volume: &VolumeRef,
) -> Result<bool>
where
    E: ContainerEngine,
    L: SyncLauncher + ?Sized,
{
    let id = volume.id();
    if registry.contains(id) {
        log::debug!("volume `{}` already has a sync session", id);
        return Ok(false);
    }

    let sidecar = id.sidecar_name();
    if engine.sidecar_exists(&sidecar).await? {
        adopt_live_sidecar(engine, registry, config, volume, &sidecar).await?;
        return Ok(false);
    }

    let source = volume
        .source()
        .ok_or_else(|| Error::MissingSource { volume: id.clone() })?;

    engine.ensure_image(&config.sync_image).await?;
    engine
        .create_sidecar(SidecarSpec::for_volume(id, &config.sync_image))
        .await?;
    log::info!("created sync sidecar `{}` for volume `{}`", sidecar, id);

    if let Err(err) = await_listener(engine, &sidecar, config.ready_timeout).await {
        if let Err(stop_err) = engine.stop_sidecar(&sidecar).await {
            log::warn!("failed to clean up sidecar `{}`: {}", sidecar, stop_err);
        }
        return Err(err);
    }

    let host_port = engine
        .sidecar_host_port(&sidecar)
        .await?
        .ok_or_else(|| Error::MissingHostPort {
            sidecar: sidecar.clone(),
        })?;

    let log_path = sync::session_log_path(&config.log_root, &sidecar);
    let handle = launcher.launch(source, &sync::socket_endpoint(host_port), &log_path)?;

    let session = SyncSession::new(sidecar, host_port, handle, log_path);
    if let Some(mut rejected) = registry.insert_if_absent(id.clone(), session) {
        log::warn!("volume `{}` gained a session concurrently", id);
        if let Some(handle) = rejected.process_mut() {
            if let Err(err) = handle.signal_stop() {
                log::debug!("extra sync process was already gone: {}", err);
            }
        }
        return Ok(false);
    }

    Ok(true)
}

/// Records a registry entry for a sidecar that is already running in the
/// engine, typically created by a previous monitor instance.
async fn adopt_live_sidecar<E: ContainerEngine>(
    engine: &E,
    registry: &SessionRegistry,
    config: &Config,
    volume: &VolumeRef,
    sidecar: &str,
) -> Result<()> {
    log::debug!(
        "sidecar `{}` already exists; not provisioning volume `{}` again",
        sidecar,
        volume.id()
    );
    let Some(host_port) = engine.sidecar_host_port(sidecar).await? else {
        return Ok(());
    };
    let session = SyncSession::recovered(
        sidecar.to_owned(),
        host_port,
        sync::session_log_path(&config.log_root, sidecar),
    );
    if registry.insert_if_absent(volume.id().clone(), session).is_none() {
        log::info!(
            "adopted live sync sidecar `{}` for volume `{}`",
            sidecar,
            volume.id()
        );
    }

    Ok(())
}

/// Polls the sidecar until its sync listener is confirmed running,
/// backing off exponentially up to `timeout` in total.
async fn await_listener<E: ContainerEngine>(
    engine: &E,
    sidecar: &str,
    timeout: Duration,
) -> Result<()> {
    let mut delay = PROBE_DELAY;
    let mut waited = Duration::ZERO;
    loop {
        match engine.sidecar_listener_running(sidecar).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(err) => log::debug!("listener probe for `{}` failed: {}", sidecar, err),
        }

        if waited >= timeout {
            return Err(Error::ProvisioningTimeout {
                sidecar: sidecar.to_owned(),
                waited,
            });
        }
        tokio::time::sleep(delay).await;
        waited += delay;
        delay = (delay * 2).min(PROBE_DELAY_CAP);
    }
}
