use std::io;
use std::path::{Path, PathBuf};

/// Error that occurs when creating a directory tree fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to create directory `{path}`: {source}")]
pub struct DirCreateError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Creates the given directory and all missing parents. Existing
/// directories are left untouched.
///
/// # Errors
///
/// Returns a [`DirCreateError`] if any component cannot be created.
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<(), DirCreateError> {
    let path = path.as_ref();
    std::fs::create_dir_all(path).map_err(|source| DirCreateError {
        path: path.to_path_buf(),
        source,
    })
}
