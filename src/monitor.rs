//! The event-driven monitor loop.
//!
//! Pages through the engine's volume event feed in fixed watermark
//! windows, classifies each event, and hands in-scope work to one worker
//! task per volume. The per-volume channel serializes provisioning and
//! teardown for a volume, so a slow sidecar readiness poll never stalls
//! events for other volumes and mount/unmount ordering is preserved.
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::Config;
use crate::engine::{ContainerEngine, Error as EngineError};
use crate::error::ResultOkLogExt;
use crate::event::{self, Classification};
use crate::session::{self, SessionRegistry, SyncSession};
use crate::sync::{self, SyncLauncher};
use crate::volume::{VolumeID, VolumeRef};

/// Backlog of session commands one volume worker may accumulate.
const WORKER_QUEUE: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("event source unavailable after {attempts} attempts: {source}")]
    EventSource {
        attempts: u32,
        #[source]
        source: EngineError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A session operation routed to a volume's worker.
#[derive(Debug, Clone)]
enum SessionCommand {
    Provision(VolumeRef),
    Teardown(VolumeRef),
}

impl SessionCommand {
    fn volume(&self) -> &VolumeID {
        match self {
            Self::Provision(volume) | Self::Teardown(volume) => volume.id(),
        }
    }
}

/// Drives the whole system: reconciliation, the poll loop, and dispatch.
pub struct Monitor<E, L> {
    engine: Arc<E>,
    launcher: Arc<L>,
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
    workers: HashMap<VolumeID, tokio::sync::mpsc::Sender<SessionCommand>>,
}

impl<E, L> Monitor<E, L>
where
    E: ContainerEngine + Send + Sync + 'static,
    L: SyncLauncher + 'static,
{
    pub fn new(
        engine: Arc<E>,
        launcher: Arc<L>,
        registry: Arc<SessionRegistry>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            engine,
            launcher,
            registry,
            config,
            workers: HashMap::default(),
        }
    }

    /// Runs until the event source stays unreachable past the retry
    /// budget. Externally cancelled by dropping the future (the binary
    /// races it against an interrupt signal).
    pub async fn run(mut self) -> Result<()> {
        let recovered =
            rebuild_registry(self.engine.as_ref(), &self.registry, &self.config.log_root).await?;
        if recovered > 0 {
            log::info!("recovered {} sync session(s) from live engine state", recovered);
        }

        let window = chrono::Duration::from_std(self.config.poll_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(2));
        let mut since = Utc::now();
        let mut failures: u32 = 0;
        log::info!("watching volume mount/unmount events");

        loop {
            let until = since + window;
            let batch = self.engine.volume_events(since, until).await;
            match batch {
                Ok(events) => {
                    failures = 0;
                    for raw in events {
                        log::debug!(
                            "event: action={} volume={} container={:?}",
                            raw.action,
                            raw.volume,
                            raw.container
                        );
                        let classified = event::classify(self.engine.as_ref(), &raw).await;
                        match classified {
                            Classification::Mount(volume) => {
                                self.dispatch(SessionCommand::Provision(volume)).await
                            }
                            Classification::Unmount(volume) => {
                                self.dispatch(SessionCommand::Teardown(volume)).await
                            }
                            Classification::Ignore => {}
                        }
                    }
                    since = until;
                }
                Err(source) => {
                    failures += 1;
                    if failures >= self.config.max_event_failures {
                        return Err(Error::EventSource {
                            attempts: failures,
                            source,
                        });
                    }
                    let delay = retry_delay(failures);
                    log::warn!(
                        "event query failed (attempt {}/{}), retrying in {:?}: {}",
                        failures,
                        self.config.max_event_failures,
                        delay,
                        source
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Routes a command to the volume's worker, spawning the worker on
    /// first contact.
    async fn dispatch(&mut self, command: SessionCommand) {
        let volume = command.volume().clone();
        if !self.workers.contains_key(&volume) {
            let (tx, rx) = tokio::sync::mpsc::channel(WORKER_QUEUE);
            tokio::spawn(session_worker(
                rx,
                Arc::clone(&self.engine),
                Arc::clone(&self.launcher),
                Arc::clone(&self.registry),
                Arc::clone(&self.config),
            ));
            self.workers.insert(volume.clone(), tx);
        }

        if let Some(tx) = self.workers.get(&volume).cloned() {
            if tx.send(command).await.is_err() {
                log::error!("session worker for volume `{}` is gone", volume);
                self.workers.remove(&volume);
            }
        }
    }
}

/// Applies session commands for one volume, strictly in order.
async fn session_worker<E, L>(
    mut rx: tokio::sync::mpsc::Receiver<SessionCommand>,
    engine: Arc<E>,
    launcher: Arc<L>,
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
) where
    E: ContainerEngine + Send + Sync + 'static,
    L: SyncLauncher + 'static,
{
    while let Some(command) = rx.recv().await {
        match command {
            SessionCommand::Provision(volume) => {
                match session::ensure_session(
                    engine.as_ref(),
                    launcher.as_ref(),
                    &registry,
                    &config,
                    &volume,
                )
                .await
                {
                    Ok(true) => log::info!("started syncing volume `{}`", volume.id()),
                    Ok(false) => {}
                    Err(err) => log::error!(
                        "failed to provision sync session for volume `{}`: {}",
                        volume.id(),
                        err
                    ),
                }
            }
            SessionCommand::Teardown(volume) => {
                if let Some(stopped) = session::remove_session(engine.as_ref(), &registry, volume.id())
                    .await
                    .ok_log(&format!(
                        "failed to tear down sync session for volume `{}`",
                        volume.id()
                    ))
                {
                    if stopped {
                        log::info!("stopped syncing volume `{}`", volume.id());
                    }
                }
            }
        }
    }
}

/// Rebuilds the session registry from live infrastructure-labelled
/// containers, treating the engine as ground truth after a restart.
/// Returns the number of sessions recovered.
pub async fn rebuild_registry<E: ContainerEngine>(
    engine: &E,
    registry: &SessionRegistry,
    log_root: &Path,
) -> Result<usize> {
    let mut recovered = 0;
    for name in engine.list_sidecars().await? {
        let Some(volume) = VolumeID::from_sidecar_name(&name) else {
            log::warn!("infrastructure container `{}` has no volume suffix; skipping", name);
            continue;
        };
        let Some(host_port) = engine
            .sidecar_host_port(&name)
            .await
            .ok_log(&format!("failed to resolve port of sidecar `{}`", name))
            .flatten()
        else {
            // The next unmount still stops the sidecar through the
            // registry-independent engine lookup.
            log::warn!("sidecar `{}` has no resolvable host port; not tracking it", name);
            continue;
        };

        let session =
            SyncSession::recovered(name.clone(), host_port, sync::session_log_path(log_root, &name));
        if registry.insert_if_absent(volume.clone(), session).is_none() {
            log::debug!("recovered session for volume `{}` (sidecar `{}`)", volume, name);
            recovered += 1;
        }
    }

    Ok(recovered)
}

/// Delay before retrying a failed event query: 500 ms doubling per
/// consecutive failure, capped at 8 s.
fn retry_delay(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(4);
    Duration::from_millis(500) * 2_u32.pow(exponent)
}
