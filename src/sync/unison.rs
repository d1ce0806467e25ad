use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::fsutil;

use super::{Error, Result, SyncHandle, SyncLauncher};

/// File name of the per-session sync log.
const LOG_FILE: &str = "unison.log";

/// Log file for one session: `<root>/<sidecar>/unison.log`.
pub fn session_log_path(root: &Path, sidecar: &str) -> PathBuf {
    root.join(sidecar).join(LOG_FILE)
}

/// Command line for one continuous bidirectional sync: the two roots
/// followed by watch-mode, quiet operation, and file logging.
fn unison_args(source: &Path, endpoint: &str, log_path: &Path) -> Vec<OsString> {
    vec![
        source.into(),
        endpoint.into(),
        "-auto".into(),
        "-repeat".into(),
        "watch".into(),
        "-log".into(),
        "-silent".into(),
        "-logfile".into(),
        log_path.into(),
    ]
}

/// [`SyncLauncher`] that spawns the `unison` binary found on `PATH`.
#[derive(Debug, Default)]
pub struct UnisonLauncher;

impl SyncLauncher for UnisonLauncher {
    fn launch(
        &self,
        source: &Path,
        endpoint: &str,
        log_path: &Path,
    ) -> Result<Box<dyn SyncHandle>> {
        if let Some(dir) = log_path.parent() {
            fsutil::ensure_dir(dir)?;
        }

        let child = Command::new("unison")
            .args(unison_args(source, endpoint, log_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source_err| Error::Spawn {
                source_path: source.to_path_buf(),
                source: source_err,
            })?;
        log::info!(
            "started unison (pid={}) syncing `{}` with {}",
            child.id(),
            source.display(),
            endpoint
        );

        Ok(Box::new(UnisonProcess { child }))
    }
}

/// Handle to a detached unison process.
#[derive(Debug)]
pub struct UnisonProcess {
    child: Child,
}

impl SyncHandle for UnisonProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn signal_stop(&mut self) -> Result<()> {
        let pid = self.child.id();
        signal::kill(Pid::from_raw(pid as i32), Signal::SIGINT)
            .map_err(|source| Error::Signal { pid, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_log_path_layout() {
        let path = session_log_path(Path::new("/home/user/.vsync"), "V1-vsync");
        assert_eq!(path, PathBuf::from("/home/user/.vsync/V1-vsync/unison.log"));
    }

    #[test]
    fn test_unison_args_shape() {
        let args = unison_args(
            Path::new("/home/user/project"),
            "socket://localhost:32768/",
            Path::new("/home/user/.vsync/V1-vsync/unison.log"),
        );
        assert_eq!(args[0], OsString::from("/home/user/project"));
        assert_eq!(args[1], OsString::from("socket://localhost:32768/"));
        assert!(args.contains(&OsString::from("-repeat")));
        assert!(args.contains(&OsString::from("watch")));
        assert!(args.contains(&OsString::from("-silent")));
        let logfile = args.iter().position(|a| *a == "-logfile").unwrap();
        assert_eq!(
            args[logfile + 1],
            OsString::from("/home/user/.vsync/V1-vsync/unison.log")
        );
    }
}
