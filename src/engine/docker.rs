use std::collections::HashMap;

use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{EventMessage, HostConfig, Mount, MountTypeEnum, PortBinding};
use bollard::system::EventsOptions;
use chrono::{DateTime, Utc};
use futures::StreamExt;

use crate::volume::VolumeID;

use super::{ContainerEngine, DATA_MOUNT, Error, INFRA_LABEL, RawEvent, Result, SidecarSpec, SYNC_PORT};

/// Seconds the engine waits for a sidecar to exit before killing it.
const STOP_GRACE_SECS: i64 = 10;

/// [`ContainerEngine`] backed by the local Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connects with the daemon's local defaults (`DOCKER_HOST` or the
    /// platform socket).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if no connection can be established.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(Error::Connect)?;
        Ok(Self { docker })
    }
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Reduces an engine event message to a [`RawEvent`], dropping messages
/// without an actor id or with an id that is not a valid volume name.
fn decode_event(message: EventMessage) -> Option<RawEvent> {
    let action = message.action?;
    let actor = message.actor?;
    let id = actor.id?;
    let volume = match VolumeID::new(&id) {
        Ok(volume) => volume,
        Err(err) => {
            log::warn!("dropping event with unusable actor id `{}`: {}", id, err);
            return None;
        }
    };
    let container = actor.attributes.and_then(|mut attrs| attrs.remove("container"));

    Some(RawEvent {
        action,
        volume,
        container,
    })
}

impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map(|_| ()).map_err(Error::Ping)
    }

    async fn volume_labels(&self, volume: &VolumeID) -> Result<Option<HashMap<String, String>>> {
        match self.docker.inspect_volume(volume.as_ref()).await {
            Ok(details) => Ok(Some(details.labels)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(source) => Err(Error::VolumeInspect {
                volume: volume.clone(),
                source,
            }),
        }
    }

    async fn container_labels(&self, container: &str) -> Result<Option<HashMap<String, String>>> {
        match self
            .docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => Ok(Some(
                details
                    .config
                    .and_then(|config| config.labels)
                    .unwrap_or_default(),
            )),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(source) => Err(Error::ContainerInspect {
                container: container.to_owned(),
                source,
            }),
        }
    }

    async fn volume_events(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>> {
        let filters = HashMap::from([
            ("type".to_owned(), vec!["volume".to_owned()]),
            (
                "event".to_owned(),
                vec!["mount".to_owned(), "unmount".to_owned()],
            ),
            ("scope".to_owned(), vec!["local".to_owned()]),
        ]);
        let options = EventsOptions::<String> {
            since: Some(since.to_string()),
            until: Some(until.to_string()),
            filters,
        };

        let mut stream = self.docker.events(Some(options));
        let mut events = Vec::new();
        while let Some(message) = stream.next().await {
            let message = message.map_err(Error::Events)?;
            if let Some(event) = decode_event(message) {
                events.push(event);
            }
        }

        Ok(events)
    }

    async fn sidecar_exists(&self, name: &str) -> Result<bool> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(source) => Err(Error::ContainerInspect {
                container: name.to_owned(),
                source,
            }),
        }
    }

    async fn create_sidecar(&self, spec: SidecarSpec) -> Result<()> {
        let host_config = HostConfig {
            mounts: Some(vec![Mount {
                target: Some(DATA_MOUNT.to_owned()),
                source: Some(spec.volume.as_ref().to_owned()),
                typ: Some(MountTypeEnum::VOLUME),
                ..Default::default()
            }]),
            port_bindings: Some(HashMap::from([(
                SYNC_PORT.to_owned(),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: None,
                }]),
            )])),
            auto_remove: Some(true),
            ..Default::default()
        };
        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(vec![format!("UNISON_DIR={DATA_MOUNT}")]),
            labels: Some(HashMap::from([(
                INFRA_LABEL.to_owned(),
                "true".to_owned(),
            )])),
            exposed_ports: Some(HashMap::from([(SYNC_PORT.to_owned(), HashMap::new())])),
            host_config: Some(host_config),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        self.docker
            .create_container(Some(options), config)
            .await
            .map_err(|source| Error::SidecarCreate {
                name: spec.name.clone(),
                source,
            })?;
        self.docker
            .start_container(&spec.name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|source| Error::SidecarStart {
                name: spec.name,
                source,
            })?;

        Ok(())
    }

    async fn sidecar_host_port(&self, name: &str) -> Result<Option<u16>> {
        let details = match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => details,
            Err(err) if is_not_found(&err) => return Ok(None),
            Err(source) => {
                return Err(Error::ContainerInspect {
                    container: name.to_owned(),
                    source,
                });
            }
        };

        let port = details
            .network_settings
            .and_then(|settings| settings.ports)
            .and_then(|mut ports| ports.remove(SYNC_PORT))
            .flatten()
            .into_iter()
            .flatten()
            .find_map(|binding| binding.host_port)
            .and_then(|port| port.parse().ok());

        Ok(port)
    }

    async fn sidecar_listener_running(&self, name: &str) -> Result<bool> {
        let exec = self
            .docker
            .create_exec(
                name,
                CreateExecOptions::<String> {
                    cmd: Some(vec!["pgrep".to_owned(), "-f".to_owned(), "unison".to_owned()]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|source| Error::Exec {
                container: name.to_owned(),
                source,
            })?;

        let results = self
            .docker
            .start_exec(&exec.id, None::<StartExecOptions>)
            .await
            .map_err(|source| Error::Exec {
                container: name.to_owned(),
                source,
            })?;
        if let StartExecResults::Attached { mut output, .. } = results {
            while let Some(chunk) = output.next().await {
                log::trace!("listener probe output: {:?}", chunk);
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|source| Error::Exec {
                container: name.to_owned(),
                source,
            })?;

        Ok(inspect.exit_code == Some(0))
    }

    async fn stop_sidecar(&self, name: &str) -> Result<bool> {
        match self
            .docker
            .stop_container(name, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
        {
            Ok(()) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(source) => Err(Error::SidecarStop {
                name: name.to_owned(),
                source,
            }),
        }
    }

    async fn list_sidecars(&self) -> Result<Vec<String>> {
        let filters = HashMap::from([(
            "label".to_owned(),
            vec![format!("{INFRA_LABEL}=true")],
        )]);
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                filters,
                ..Default::default()
            }))
            .await
            .map_err(Error::ContainerList)?;

        Ok(containers
            .into_iter()
            .filter_map(|container| {
                container
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|name| name.trim_start_matches('/').to_owned())
            })
            .collect())
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        log::info!("pulling sync image `{}`", image);
        let options = CreateImageOptions {
            from_image: image.to_owned(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(|source| Error::ImagePull {
                image: image.to_owned(),
                source,
            })?;
        }

        Ok(())
    }
}
