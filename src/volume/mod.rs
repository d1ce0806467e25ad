use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

mod error;

pub use error::{Error, Result};

/// The maximum allowed length for a [`VolumeID`].
const VOLUME_ID_MAX_LEN: usize = 255;

/// Name suffix identifying the sync sidecar container of a volume.
const SIDECAR_SUFFIX: &str = "-vsync";

/// Volume label that opts a volume into synchronization.
pub const ENABLE_LABEL: &str = "vsync.enable";

/// Volume label naming the host path to synchronize against.
pub const SOURCE_LABEL: &str = "vsync.source";

/// A validated volume identifier as assigned by the container engine.
///
/// # Examples
///
/// ```
/// # use vsync::volume::VolumeID;
/// let volume_id = VolumeID::new("projectdata").unwrap();
/// assert_eq!(volume_id.as_ref(), "projectdata");
/// assert_eq!(volume_id.sidecar_name(), "projectdata-vsync");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeID(Arc<str>);

impl VolumeID {
    /// Creates a new `VolumeID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVolumeID`] if the input is empty, exceeds
    /// [`VOLUME_ID_MAX_LEN`], or contains characters outside the engine's
    /// volume name alphabet (`A-Z a-z 0-9 _ . -`).
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > VOLUME_ID_MAX_LEN {
            return Err(Error::InvalidVolumeID(src.to_owned()));
        }
        if !src
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(Error::InvalidVolumeID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// Returns the deterministic name of the sync sidecar for this volume.
    pub fn sidecar_name(&self) -> String {
        format!("{}{}", self.0, SIDECAR_SUFFIX)
    }

    /// Recovers the volume id encoded in a sidecar name, if the name
    /// carries the sidecar suffix.
    pub fn from_sidecar_name(name: &str) -> Option<Self> {
        name.strip_suffix(SIDECAR_SUFFIX)
            .and_then(|id| Self::new(id).ok())
    }
}

impl AsRef<str> for VolumeID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for VolumeID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for VolumeID {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for VolumeID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A read-only snapshot of a volume's sync-relevant metadata, taken at the
/// time an event is classified.
#[derive(Debug, Clone)]
pub struct VolumeRef {
    id: VolumeID,
    enabled: bool,
    source: Option<PathBuf>,
}

impl VolumeRef {
    /// Derives the snapshot from the engine's label map for the volume.
    ///
    /// `labels = None` means the volume no longer exists in the engine; the
    /// snapshot then reports `enabled = false`, so vanished volumes are
    /// never synchronized.
    pub fn from_labels(id: VolumeID, labels: Option<&HashMap<String, String>>) -> Self {
        match labels {
            None => Self {
                id,
                enabled: false,
                source: None,
            },
            Some(labels) => Self {
                enabled: labels.get(ENABLE_LABEL).is_some_and(|v| is_truthy(v)),
                source: labels.get(SOURCE_LABEL).map(PathBuf::from),
                id,
            },
        }
    }

    pub fn id(&self) -> &VolumeID {
        &self.id
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Host path named by the `vsync.source` label, if present.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

/// Returns true if a label value opts its subject in.
///
/// Only the usual affirmative spellings count; in particular the literal
/// string `"false"` does not enable anything.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
