//! Classification of raw volume events.
//!
//! Decides for each event whether it is in scope (volume opted in, not
//! self-triggered by sync infrastructure) and routes it by action. All
//! engine lookup failures degrade per event: the volume side fails safe
//! (treated as not opted in), the container side fails open (treated as
//! not infrastructure, since a vanished container cannot be the sidecar).
use crate::engine::{ContainerEngine, INFRA_LABEL, RawEvent};
use crate::volume::{VolumeRef, is_truthy};

/// Recognized volume lifecycle actions. Anything the engine may add in
/// the future lands on [`VolumeAction::Other`] and stays a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeAction {
    Mount,
    Unmount,
    Other,
}

impl From<&str> for VolumeAction {
    fn from(action: &str) -> Self {
        match action {
            "mount" => Self::Mount,
            "unmount" => Self::Unmount,
            _ => Self::Other,
        }
    }
}

/// The classifier's verdict on one raw event.
#[derive(Debug, Clone)]
pub enum Classification {
    /// In-scope mount: a sync session should exist for this volume.
    Mount(VolumeRef),
    /// In-scope unmount: the session for this volume should be removed.
    Unmount(VolumeRef),
    /// Out of scope; dropped without further action.
    Ignore,
}

/// Classifies a raw event against live engine metadata.
///
/// Never fails: lookup errors are logged and fold into the fail-safe or
/// fail-open default of the check they interrupted, so one broken event
/// cannot stall the monitor.
pub async fn classify<E: ContainerEngine>(engine: &E, event: &RawEvent) -> Classification {
    let volume = match engine.volume_labels(&event.volume).await {
        Ok(labels) => VolumeRef::from_labels(event.volume.clone(), labels.as_ref()),
        Err(err) => {
            log::warn!("failed to look up volume `{}`: {}", event.volume, err);
            VolumeRef::from_labels(event.volume.clone(), None)
        }
    };
    if !volume.enabled() {
        log::trace!("ignoring event for volume `{}`: not opted in", event.volume);
        return Classification::Ignore;
    }

    if let Some(container) = &event.container {
        if is_infrastructure(engine, container).await {
            log::debug!(
                "ignoring self-triggered event for volume `{}` from `{}`",
                event.volume,
                container
            );
            return Classification::Ignore;
        }
    }

    match VolumeAction::from(event.action.as_str()) {
        VolumeAction::Mount => Classification::Mount(volume),
        VolumeAction::Unmount => Classification::Unmount(volume),
        VolumeAction::Other => {
            log::debug!(
                "ignoring unrecognized action `{}` for volume `{}`",
                event.action,
                event.volume
            );
            Classification::Ignore
        }
    }
}

/// Whether the originating container is marked as sync infrastructure.
async fn is_infrastructure<E: ContainerEngine>(engine: &E, container: &str) -> bool {
    match engine.container_labels(container).await {
        Ok(Some(labels)) => labels.get(INFRA_LABEL).is_some_and(|v| is_truthy(v)),
        Ok(None) => false,
        Err(err) => {
            log::warn!("failed to look up container `{}`: {}", container, err);
            false
        }
    }
}
