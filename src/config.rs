use std::path::PathBuf;
use std::time::Duration;

/// Sidecar image to run when none is configured.
const DEFAULT_IMAGE: &str = "onnimonni/unison";

/// Default length of one event poll window.
const DEFAULT_POLL_WINDOW: Duration = Duration::from_secs(2);

/// Default bound on the sidecar readiness poll.
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Consecutive event-source failures tolerated before the monitor gives
/// up and reports to the operator.
const DEFAULT_MAX_EVENT_FAILURES: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("environment variable `{var}` holds invalid value `{value}`: {source}")]
    InvalidSeconds {
        var: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("`HOME` is not set and `VSYNC_LOG_ROOT` was not given")]
    MissingHome,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Image the sync sidecars run (`VSYNC_IMAGE`).
    pub sync_image: String,
    /// Length of one event poll window (`VSYNC_POLL_WINDOW_SECS`).
    pub poll_window: Duration,
    /// Bound on the sidecar readiness poll (`VSYNC_READY_TIMEOUT_SECS`).
    pub ready_timeout: Duration,
    /// Consecutive event-source failures before terminating.
    pub max_event_failures: u32,
    /// Root directory for per-session sync logs (`VSYNC_LOG_ROOT`,
    /// defaults to `$HOME/.vsync`).
    pub log_root: PathBuf,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSeconds`] for unparsable duration
    /// variables and [`Error::MissingHome`] when no log root can be
    /// derived.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            sync_image: std::env::var("VSYNC_IMAGE").unwrap_or_else(|_| DEFAULT_IMAGE.to_owned()),
            poll_window: seconds_var(
                "VSYNC_POLL_WINDOW_SECS",
                std::env::var("VSYNC_POLL_WINDOW_SECS").ok(),
                DEFAULT_POLL_WINDOW,
            )?,
            ready_timeout: seconds_var(
                "VSYNC_READY_TIMEOUT_SECS",
                std::env::var("VSYNC_READY_TIMEOUT_SECS").ok(),
                DEFAULT_READY_TIMEOUT,
            )?,
            max_event_failures: DEFAULT_MAX_EVENT_FAILURES,
            log_root: log_root(
                std::env::var("VSYNC_LOG_ROOT").ok(),
                std::env::var("HOME").ok(),
            )?,
        })
    }
}

fn seconds_var(
    var: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration> {
    match value {
        None => Ok(default),
        Some(raw) => {
            let secs = raw.trim().parse::<u64>().map_err(|source| Error::InvalidSeconds {
                var,
                value: raw.clone(),
                source,
            })?;
            Ok(Duration::from_secs(secs))
        }
    }
}

fn log_root(configured: Option<String>, home: Option<String>) -> Result<PathBuf> {
    match configured {
        Some(root) => Ok(PathBuf::from(root)),
        None => home
            .map(|home| PathBuf::from(home).join(".vsync"))
            .ok_or(Error::MissingHome),
    }
}
