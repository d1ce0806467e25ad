#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid volume id: {0}")]
    InvalidVolumeID(String),
}
pub type Result<T> = std::result::Result<T, Error>;
