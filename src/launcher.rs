//! Autostart of the remote process when nothing answers on the port.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::RobolinkError;

/// Substring the remote prints on stdout once it accepts connections.
pub const READY_MARKER: &str = "Running";

pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchConfig {
    pub path: PathBuf,
    /// Space-joined argument string, split on whitespace before spawning.
    pub args: String,
    pub ready_timeout: Duration,
}

impl LaunchConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: String::new(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    pub fn args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

/// Spawns the remote and waits for [`READY_MARKER`] on its stdout.
///
/// The child keeps running after this returns; a background thread keeps
/// draining its stdout so it never blocks on a full pipe.
pub fn launch(config: &LaunchConfig) -> Result<Child, RobolinkError> {
    let path = config.display_path();
    info!(path = %path, args = %config.args, "launching remote process");

    let mut child = Command::new(&config.path)
        .args(config.args.split_whitespace())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| RobolinkError::Launch {
            path: path.clone(),
            reason: err.to_string(),
        })?;

    let Some(stdout) = child.stdout.take() else {
        let _ = child.kill();
        return Err(RobolinkError::Launch {
            path,
            reason: "child stdout was not captured".to_string(),
        });
    };

    let (line_tx, line_rx) = mpsc::channel::<String>();
    let reader_name = format!("robolink-launch-{}", child.id());
    thread::Builder::new()
        .name(reader_name)
        .spawn(move || {
            let mut forwarding = true;
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if forwarding {
                    forwarding = line_tx.send(line).is_ok();
                } else {
                    trace!(line = %line, "remote stdout");
                }
            }
        })
        .map_err(|err| RobolinkError::Launch {
            path: path.clone(),
            reason: err.to_string(),
        })?;

    let deadline = Instant::now() + config.ready_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match line_rx.recv_timeout(remaining) {
            Ok(line) => {
                debug!(line = %line, "remote stdout");
                if line.contains(READY_MARKER) {
                    info!(pid = child.id(), "remote process reported ready");
                    return Ok(child);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(path = %path, "remote process never reported ready; killing it");
                let _ = child.kill();
                let _ = child.wait();
                return Err(RobolinkError::LaunchTimeout {
                    path,
                    timeout: config.ready_timeout,
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                let status = child
                    .wait()
                    .map(|status| status.to_string())
                    .unwrap_or_else(|err| err.to_string());
                return Err(RobolinkError::Launch {
                    path,
                    reason: format!("exited before reporting ready ({status})"),
                });
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::{launch, LaunchConfig};
    use crate::error::RobolinkError;

    #[test]
    fn ready_marker_is_detected_on_stdout() {
        let config = LaunchConfig::new("echo").args("station Running on port 20500");
        let mut child = launch(&config).expect("echo prints the marker");
        let _ = child.wait();
    }

    #[test]
    fn exit_without_marker_is_a_launch_error() {
        let config = LaunchConfig::new("true");
        let err = launch(&config).expect_err("true prints nothing");
        assert!(matches!(err, RobolinkError::Launch { .. }));
    }

    #[test]
    fn missing_executable_is_a_launch_error() {
        let config = LaunchConfig::new("/nonexistent/robot-station");
        let err = launch(&config).expect_err("nothing to spawn");
        assert!(matches!(err, RobolinkError::Launch { .. }));
    }

    #[test]
    fn silent_process_times_out() {
        let config = LaunchConfig::new("sleep")
            .args("5")
            .ready_timeout(Duration::from_millis(200));
        let err = launch(&config).expect_err("sleep never prints");
        assert!(matches!(err, RobolinkError::LaunchTimeout { .. }));
    }
}
