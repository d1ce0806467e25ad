use std::sync::Arc;

/// vsync: watches a container engine's volume mount/unmount events and
/// keeps volumes labelled `vsync.enable` synchronized with the host path
/// named by their `vsync.source` label, for as long as they stay
/// attached to any container.
///
/// Each opted-in volume gets one sidecar container running a sync
/// listener plus one detached unison process on the host; both live
/// until the volume's unmount event and are tracked in an in-memory
/// session registry rebuilt from live engine state at startup.
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod fsutil;
pub mod monitor;
pub mod session;
pub mod sync;
pub mod volume;

use engine::ContainerEngine;

/// Runs the monitor until the event source is lost for good or the
/// process is interrupted.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid environment configuration (bad durations, no usable log
///   root).
/// - Failure to connect to or ping the container engine at startup.
/// - The event source staying unreachable past the retry budget.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config::Config::from_env()?);
    log::debug!("configuration: {:?}", config);

    let docker = engine::DockerEngine::connect()?;
    docker.ping().await?;
    log::debug!("container engine is reachable");

    let registry = Arc::new(session::SessionRegistry::default());
    let launcher = Arc::new(sync::UnisonLauncher);
    let monitor = monitor::Monitor::new(Arc::new(docker), launcher, registry, config);

    tokio::select! {
        result = monitor.run() => result.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            // Live sessions are left running; their unmount events (or a
            // later monitor run) tear them down.
            log::info!("interrupted; shutting down");
            Ok(())
        }
    }
}
