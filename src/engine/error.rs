use crate::volume::VolumeID;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to container engine: {0}")]
    Connect(#[source] bollard::errors::Error),
    #[error("container engine is unreachable: {0}")]
    Ping(#[source] bollard::errors::Error),
    #[error("failed to query volume events: {0}")]
    Events(#[source] bollard::errors::Error),
    #[error("failed to inspect volume `{volume}`: {source}")]
    VolumeInspect {
        volume: VolumeID,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("failed to inspect container `{container}`: {source}")]
    ContainerInspect {
        container: String,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("failed to list containers: {0}")]
    ContainerList(#[source] bollard::errors::Error),
    #[error("failed to pull image `{image}`: {source}")]
    ImagePull {
        image: String,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("failed to create sidecar `{name}`: {source}")]
    SidecarCreate {
        name: String,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("failed to start sidecar `{name}`: {source}")]
    SidecarStart {
        name: String,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("failed to stop sidecar `{name}`: {source}")]
    SidecarStop {
        name: String,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("failed to exec in container `{container}`: {source}")]
    Exec {
        container: String,
        #[source]
        source: bollard::errors::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
