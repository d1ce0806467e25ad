use std::path::PathBuf;

use crate::fsutil;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    LogDir(#[from] fsutil::DirCreateError),
    #[error("failed to spawn sync process for `{source_path}`: {source}")]
    Spawn {
        source_path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to signal sync process (pid={pid}): {source}")]
    Signal {
        pid: u32,
        #[source]
        source: nix::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
