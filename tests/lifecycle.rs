//! End-to-end session lifecycle scenarios against in-memory engine and
//! launcher fakes.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use vsync::config::Config;
use vsync::engine::{ContainerEngine, Error, RawEvent, Result, SidecarSpec};
use vsync::event::{self, Classification};
use vsync::monitor;
use vsync::session::{self, SessionRegistry};
use vsync::sync::{self, SyncHandle, SyncLauncher};
use vsync::volume::VolumeID;

struct FakeEngine {
    volumes: Mutex<HashMap<String, HashMap<String, String>>>,
    containers: Mutex<HashMap<String, HashMap<String, String>>>,
    sidecars: Mutex<HashMap<String, u16>>,
    created: Mutex<Vec<SidecarSpec>>,
    pulled: Mutex<Vec<String>>,
    listener_ready: AtomicBool,
    fail_container_lookups: AtomicBool,
    next_port: AtomicU16,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self {
            volumes: Mutex::default(),
            containers: Mutex::default(),
            sidecars: Mutex::default(),
            created: Mutex::default(),
            pulled: Mutex::default(),
            listener_ready: AtomicBool::new(true),
            fail_container_lookups: AtomicBool::new(false),
            next_port: AtomicU16::new(32768),
        }
    }
}

impl FakeEngine {
    fn add_volume(&self, id: &str, labels: &[(&str, &str)]) {
        self.volumes.lock().unwrap().insert(
            id.to_owned(),
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }

    fn add_container(&self, id: &str, labels: &[(&str, &str)]) {
        self.containers.lock().unwrap().insert(
            id.to_owned(),
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }

    fn add_sidecar(&self, name: &str, port: u16) {
        self.sidecars.lock().unwrap().insert(name.to_owned(), port);
    }

    fn sidecar_names(&self) -> Vec<String> {
        self.sidecars.lock().unwrap().keys().cloned().collect()
    }

    fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

fn engine_error() -> Error {
    Error::ContainerList(bollard::errors::Error::DockerResponseServerError {
        status_code: 500,
        message: "engine unavailable".to_owned(),
    })
}

impl ContainerEngine for FakeEngine {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn volume_labels(&self, volume: &VolumeID) -> Result<Option<HashMap<String, String>>> {
        Ok(self.volumes.lock().unwrap().get(volume.as_ref()).cloned())
    }

    async fn container_labels(&self, container: &str) -> Result<Option<HashMap<String, String>>> {
        if self.fail_container_lookups.load(Ordering::SeqCst) {
            return Err(engine_error());
        }
        Ok(self.containers.lock().unwrap().get(container).cloned())
    }

    async fn volume_events(
        &self,
        _since: DateTime<Utc>,
        _until: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>> {
        Ok(Vec::new())
    }

    async fn sidecar_exists(&self, name: &str) -> Result<bool> {
        Ok(self.sidecars.lock().unwrap().contains_key(name))
    }

    async fn create_sidecar(&self, spec: SidecarSpec) -> Result<()> {
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        self.sidecars.lock().unwrap().insert(spec.name.clone(), port);
        self.created.lock().unwrap().push(spec);
        Ok(())
    }

    async fn sidecar_host_port(&self, name: &str) -> Result<Option<u16>> {
        Ok(self.sidecars.lock().unwrap().get(name).copied())
    }

    async fn sidecar_listener_running(&self, _name: &str) -> Result<bool> {
        Ok(self.listener_ready.load(Ordering::SeqCst))
    }

    async fn stop_sidecar(&self, name: &str) -> Result<bool> {
        Ok(self.sidecars.lock().unwrap().remove(name).is_some())
    }

    async fn list_sidecars(&self) -> Result<Vec<String>> {
        Ok(self.sidecar_names())
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        self.pulled.lock().unwrap().push(image.to_owned());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Launch {
    source: PathBuf,
    endpoint: String,
    log_path: PathBuf,
}

#[derive(Default)]
struct FakeLauncher {
    launches: Mutex<Vec<Launch>>,
    signaled: Arc<Mutex<Vec<u32>>>,
    next_pid: AtomicU32,
}

impl FakeLauncher {
    fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    fn signaled_pids(&self) -> Vec<u32> {
        self.signaled.lock().unwrap().clone()
    }
}

impl SyncLauncher for FakeLauncher {
    fn launch(
        &self,
        source: &Path,
        endpoint: &str,
        log_path: &Path,
    ) -> sync::Result<Box<dyn SyncHandle>> {
        self.launches.lock().unwrap().push(Launch {
            source: source.to_path_buf(),
            endpoint: endpoint.to_owned(),
            log_path: log_path.to_path_buf(),
        });
        let pid = 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeHandle {
            pid,
            alive: true,
            signaled: Arc::clone(&self.signaled),
        }))
    }
}

struct FakeHandle {
    pid: u32,
    alive: bool,
    signaled: Arc<Mutex<Vec<u32>>>,
}

impl SyncHandle for FakeHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_alive(&mut self) -> bool {
        self.alive
    }

    fn signal_stop(&mut self) -> sync::Result<()> {
        self.signaled.lock().unwrap().push(self.pid);
        self.alive = false;
        Ok(())
    }
}

fn test_config() -> Config {
    Config {
        sync_image: "onnimonni/unison".to_owned(),
        poll_window: Duration::from_secs(2),
        ready_timeout: Duration::from_millis(200),
        max_event_failures: 5,
        log_root: PathBuf::from("/home/user/.vsync"),
    }
}

fn volume(id: &str) -> VolumeID {
    VolumeID::new(id).unwrap()
}

fn mount_event(id: &str, container: Option<&str>) -> RawEvent {
    RawEvent {
        action: "mount".to_owned(),
        volume: volume(id),
        container: container.map(str::to_owned),
    }
}

fn unmount_event(id: &str, container: Option<&str>) -> RawEvent {
    RawEvent {
        action: "unmount".to_owned(),
        volume: volume(id),
        container: container.map(str::to_owned),
    }
}

async fn classify_mount(engine: &FakeEngine, event: &RawEvent) -> vsync::volume::VolumeRef {
    match event::classify(engine, event).await {
        Classification::Mount(volume) => volume,
        other => panic!("expected mount classification, got {:?}", other),
    }
}

#[tokio::test]
async fn test_provisioning_is_idempotent() {
    let engine = FakeEngine::default();
    engine.add_volume(
        "V1",
        &[("vsync.enable", "true"), ("vsync.source", "/home/user/project")],
    );
    let launcher = FakeLauncher::default();
    let registry = SessionRegistry::default();
    let config = test_config();

    let volume_ref = classify_mount(&engine, &mount_event("V1", Some("C1"))).await;
    let first = session::ensure_session(&engine, &launcher, &registry, &config, &volume_ref)
        .await
        .unwrap();
    let second = session::ensure_session(&engine, &launcher, &registry, &config, &volume_ref)
        .await
        .unwrap();

    assert!(first);
    assert!(!second);
    assert_eq!(registry.len(), 1);
    assert_eq!(engine.created_count(), 1);
    assert_eq!(launcher.launch_count(), 1);
}

#[tokio::test]
async fn test_unmount_without_session_is_noop() {
    let engine = FakeEngine::default();
    let registry = SessionRegistry::default();

    let stopped = session::remove_session(&engine, &registry, &volume("V1"))
        .await
        .unwrap();

    assert!(!stopped);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_mount_without_opt_in_is_ignored() {
    let engine = FakeEngine::default();
    engine.add_volume("plain", &[("vsync.source", "/src")]);
    engine.add_volume("denied", &[("vsync.enable", "false"), ("vsync.source", "/src")]);

    for id in ["plain", "denied", "unknown"] {
        let classified = event::classify(&engine, &mount_event(id, Some("C1"))).await;
        assert!(
            matches!(classified, Classification::Ignore),
            "volume `{id}` must not be in scope"
        );
    }
}

#[tokio::test]
async fn test_self_triggered_mount_is_ignored() {
    let engine = FakeEngine::default();
    engine.add_volume(
        "V1",
        &[("vsync.enable", "true"), ("vsync.source", "/home/user/project")],
    );
    engine.add_container("sidecar", &[("vsync.container", "true")]);

    let classified = event::classify(&engine, &mount_event("V1", Some("sidecar"))).await;
    assert!(matches!(classified, Classification::Ignore));
}

#[tokio::test]
async fn test_vanished_container_does_not_block_mount() {
    let engine = FakeEngine::default();
    engine.add_volume(
        "V1",
        &[("vsync.enable", "true"), ("vsync.source", "/home/user/project")],
    );

    // Originating container is gone entirely.
    let classified = event::classify(&engine, &mount_event("V1", Some("gone"))).await;
    assert!(matches!(classified, Classification::Mount(_)));

    // Engine failure on the container lookup is also treated as
    // "not infrastructure".
    engine.fail_container_lookups.store(true, Ordering::SeqCst);
    let classified = event::classify(&engine, &mount_event("V1", Some("C1"))).await;
    assert!(matches!(classified, Classification::Mount(_)));
}

#[tokio::test]
async fn test_unrecognized_action_is_ignored() {
    let engine = FakeEngine::default();
    engine.add_volume(
        "V1",
        &[("vsync.enable", "true"), ("vsync.source", "/home/user/project")],
    );

    let destroy = RawEvent {
        action: "destroy".to_owned(),
        volume: volume("V1"),
        container: None,
    };
    assert!(matches!(
        event::classify(&engine, &destroy).await,
        Classification::Ignore
    ));
}

#[tokio::test]
async fn test_volumes_are_tracked_independently() {
    let engine = FakeEngine::default();
    engine.add_volume("A", &[("vsync.enable", "true"), ("vsync.source", "/a")]);
    engine.add_volume("B", &[("vsync.enable", "true"), ("vsync.source", "/b")]);
    let launcher = FakeLauncher::default();
    let registry = SessionRegistry::default();
    let config = test_config();

    for id in ["A", "B"] {
        let volume_ref = classify_mount(&engine, &mount_event(id, Some("C1"))).await;
        session::ensure_session(&engine, &launcher, &registry, &config, &volume_ref)
            .await
            .unwrap();
    }
    assert_eq!(registry.len(), 2);

    session::remove_session(&engine, &registry, &volume("A"))
        .await
        .unwrap();

    assert!(!registry.contains(&volume("A")));
    assert!(registry.contains(&volume("B")));
    assert_eq!(engine.sidecar_names(), vec!["B-vsync".to_owned()]);
}

#[tokio::test]
async fn test_full_lifecycle() {
    let engine = FakeEngine::default();
    engine.add_volume(
        "V1",
        &[("vsync.enable", "true"), ("vsync.source", "/home/user/project")],
    );
    engine.add_container("C1", &[]);
    let launcher = FakeLauncher::default();
    let registry = SessionRegistry::default();
    let config = test_config();

    // Mount from a regular container provisions the session.
    let volume_ref = classify_mount(&engine, &mount_event("V1", Some("C1"))).await;
    let provisioned = session::ensure_session(&engine, &launcher, &registry, &config, &volume_ref)
        .await
        .unwrap();
    assert!(provisioned);
    assert_eq!(engine.sidecar_names(), vec!["V1-vsync".to_owned()]);
    assert!(registry.contains(&volume("V1")));

    let launches = launcher.launches.lock().unwrap().clone();
    assert_eq!(
        launches,
        vec![Launch {
            source: PathBuf::from("/home/user/project"),
            endpoint: "socket://localhost:32768/".to_owned(),
            log_path: PathBuf::from("/home/user/.vsync/V1-vsync/unison.log"),
        }]
    );

    // Unmount signals the process, stops the sidecar, clears the entry.
    let classified = event::classify(&engine, &unmount_event("V1", Some("C1"))).await;
    assert!(matches!(classified, Classification::Unmount(_)));
    let stopped = session::remove_session(&engine, &registry, &volume("V1"))
        .await
        .unwrap();

    assert!(stopped);
    assert_eq!(launcher.signaled_pids(), vec![1000]);
    assert!(engine.sidecar_names().is_empty());
    assert!(!registry.contains(&volume("V1")));
}

#[tokio::test]
async fn test_provisioning_times_out_without_listener() {
    let engine = FakeEngine::default();
    engine.listener_ready.store(false, Ordering::SeqCst);
    engine.add_volume(
        "V1",
        &[("vsync.enable", "true"), ("vsync.source", "/home/user/project")],
    );
    let launcher = FakeLauncher::default();
    let registry = SessionRegistry::default();
    let config = test_config();

    let volume_ref = classify_mount(&engine, &mount_event("V1", Some("C1"))).await;
    let err = session::ensure_session(&engine, &launcher, &registry, &config, &volume_ref)
        .await
        .unwrap_err();

    assert!(matches!(err, session::Error::ProvisioningTimeout { .. }));
    assert_eq!(launcher.launch_count(), 0);
    assert!(registry.is_empty());
    // The half-created sidecar is cleaned up again.
    assert!(engine.sidecar_names().is_empty());
}

#[tokio::test]
async fn test_enabled_volume_without_source_fails() {
    let engine = FakeEngine::default();
    engine.add_volume("V1", &[("vsync.enable", "true")]);
    let launcher = FakeLauncher::default();
    let registry = SessionRegistry::default();
    let config = test_config();

    let volume_ref = classify_mount(&engine, &mount_event("V1", None)).await;
    let err = session::ensure_session(&engine, &launcher, &registry, &config, &volume_ref)
        .await
        .unwrap_err();

    assert!(matches!(err, session::Error::MissingSource { .. }));
    assert_eq!(engine.created_count(), 0);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_existing_sidecar_is_adopted_not_reprovisioned() {
    let engine = FakeEngine::default();
    engine.add_volume(
        "V1",
        &[("vsync.enable", "true"), ("vsync.source", "/home/user/project")],
    );
    engine.add_sidecar("V1-vsync", 40000);
    let launcher = FakeLauncher::default();
    let registry = SessionRegistry::default();
    let config = test_config();

    let volume_ref = classify_mount(&engine, &mount_event("V1", Some("C1"))).await;
    let provisioned = session::ensure_session(&engine, &launcher, &registry, &config, &volume_ref)
        .await
        .unwrap();

    assert!(!provisioned);
    assert_eq!(engine.created_count(), 0);
    assert_eq!(launcher.launch_count(), 0);
    assert!(registry.contains(&volume("V1")));
}

#[tokio::test]
async fn test_registry_rebuilt_from_live_sidecars() {
    let engine = FakeEngine::default();
    engine.add_sidecar("V1-vsync", 40000);
    engine.add_sidecar("V2-vsync", 40001);
    let registry = SessionRegistry::default();

    let recovered = monitor::rebuild_registry(&engine, &registry, Path::new("/home/user/.vsync"))
        .await
        .unwrap();

    assert_eq!(recovered, 2);
    assert!(registry.contains(&volume("V1")));
    assert!(registry.contains(&volume("V2")));

    // A late unmount after the rebuild still tears everything down.
    let stopped = session::remove_session(&engine, &registry, &volume("V1"))
        .await
        .unwrap();
    assert!(stopped);
    assert!(!registry.contains(&volume("V1")));
    assert_eq!(engine.sidecar_names(), vec!["V2-vsync".to_owned()]);
}
