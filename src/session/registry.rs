use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::volume::VolumeID;

use super::SyncSession;

/// Tracks the live sync session of every volume.
///
/// A key is present if and only if a sidecar/process pair is believed
/// live for that volume. The narrow API keeps the at-most-one invariant
/// inside this type: sessions enter only through [`insert_if_absent`] and
/// leave only through [`remove`].
///
/// [`insert_if_absent`]: SessionRegistry::insert_if_absent
/// [`remove`]: SessionRegistry::remove
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<VolumeID, SyncSession>,
}

impl SessionRegistry {
    /// Records a session for the volume unless one already exists.
    ///
    /// Returns `None` on success. If the volume already has a session,
    /// the registry is unchanged and the rejected session is handed back
    /// so the caller can release whatever it holds.
    pub fn insert_if_absent(
        &self,
        volume: VolumeID,
        session: SyncSession,
    ) -> Option<SyncSession> {
        match self.sessions.entry(volume) {
            Entry::Occupied(_) => Some(session),
            Entry::Vacant(entry) => {
                entry.insert(session);
                None
            }
        }
    }

    /// Removes and returns the session for the volume. Removing a volume
    /// without a session is a no-op, not an error.
    pub fn remove(&self, volume: &VolumeID) -> Option<SyncSession> {
        self.sessions.remove(volume).map(|(_, session)| session)
    }

    pub fn contains(&self, volume: &VolumeID) -> bool {
        self.sessions.contains_key(volume)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
