//! The container-engine boundary.
//!
//! Everything the monitor needs from the engine is expressed through the
//! [`ContainerEngine`] trait: metadata lookups for event classification,
//! the windowed volume event feed, and the sidecar lifecycle primitives.
//! [`DockerEngine`] implements it against the Docker daemon; tests
//! substitute an in-memory implementation.
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::volume::VolumeID;

mod docker;
mod error;

pub use docker::DockerEngine;
pub use error::{Error, Result};

/// Container label marking synchronization infrastructure. Mount events
/// originating from a container carrying this label never trigger
/// provisioning.
pub const INFRA_LABEL: &str = "vsync.container";

/// Port the sync listener exposes inside the sidecar.
pub const SYNC_PORT: &str = "5000/tcp";

/// Path the synchronized volume is mounted at inside the sidecar.
pub const DATA_MOUNT: &str = "/data";

/// A volume lifecycle event as delivered by the engine, reduced to the
/// fields the classifier consumes.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Engine action string, e.g. `mount` or `unmount`.
    pub action: String,
    /// The volume the event concerns.
    pub volume: VolumeID,
    /// The container whose attach/detach caused the event, when reported.
    pub container: Option<String>,
}

/// Everything needed to create a sync sidecar for one volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarSpec {
    pub name: String,
    pub volume: VolumeID,
    pub image: String,
}

impl SidecarSpec {
    pub fn for_volume(volume: &VolumeID, image: &str) -> Self {
        Self {
            name: volume.sidecar_name(),
            volume: volume.clone(),
            image: image.to_owned(),
        }
    }
}

/// Access to the container engine's volume registry, container registry,
/// event feed, and sidecar lifecycle.
///
/// Metadata lookups return `Ok(None)` when the subject no longer exists in
/// the engine; callers decide whether that is fail-safe or fail-open.
pub trait ContainerEngine {
    /// Verifies the engine is reachable.
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;

    /// Labels of the given volume, or `None` if the volume is gone.
    fn volume_labels(
        &self,
        volume: &VolumeID,
    ) -> impl Future<Output = Result<Option<HashMap<String, String>>>> + Send;

    /// Labels of the given container, or `None` if the container is gone.
    fn container_labels(
        &self,
        container: &str,
    ) -> impl Future<Output = Result<Option<HashMap<String, String>>>> + Send;

    /// All local-scope volume mount/unmount events with timestamps in
    /// `[since, until)`, in arrival order. Blocks until the window has
    /// closed.
    fn volume_events(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<RawEvent>>> + Send;

    /// Whether a container with the given sidecar name exists.
    fn sidecar_exists(&self, name: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Creates and starts the sidecar described by `spec`.
    fn create_sidecar(&self, spec: SidecarSpec) -> impl Future<Output = Result<()>> + Send;

    /// The host port the sidecar's sync listener is published on, or
    /// `None` if the sidecar is gone or carries no published port.
    fn sidecar_host_port(&self, name: &str) -> impl Future<Output = Result<Option<u16>>> + Send;

    /// Whether the sync listener process is confirmed running inside the
    /// sidecar.
    fn sidecar_listener_running(&self, name: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Stops the named sidecar. Returns `false` if no such container
    /// exists, which is not an error.
    fn stop_sidecar(&self, name: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Names of all running containers labelled as sync infrastructure.
    fn list_sidecars(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Ensures the given image is available locally, pulling it if needed.
    fn ensure_image(&self, image: &str) -> impl Future<Output = Result<()>> + Send;
}
