//! Service supervision.
//!
//! The daemon is supervised through a pidfile: `start` respawns the current
//! executable detached with the hidden `--daemon` flag, `running` probes the
//! recorded PID with `kill(pid, 0)`, `stop` sends SIGTERM. The [`Supervisor`]
//! trait keeps this swappable for platforms with a real init framework.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, info, warn};

use tapdeck_core::{Error, Result};

/// Start/stop/status operations over the daemon process.
pub trait Supervisor {
    fn running(&self) -> bool;
    fn start(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
}

/// Pidfile-based supervisor.
#[derive(Debug, Clone)]
pub struct PidfileSupervisor {
    pid_path: PathBuf,
    daemon_args: Vec<String>,
}

impl PidfileSupervisor {
    pub fn new(pid_path: PathBuf) -> Self {
        Self {
            pid_path,
            daemon_args: Vec::new(),
        }
    }

    /// Extra arguments passed to the respawned daemon (e.g. `--config`).
    pub fn with_daemon_args(mut self, args: Vec<String>) -> Self {
        self.daemon_args = args;
        self
    }

    /// Record the current process in the pidfile (called by the daemon).
    pub fn write_pidfile(&self) -> Result<()> {
        if let Some(parent) = self.pid_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.pid_path, std::process::id().to_string())?;
        Ok(())
    }

    /// Remove the pidfile (called by the daemon on clean exit).
    pub fn remove_pidfile(&self) {
        let _ = std::fs::remove_file(&self.pid_path);
    }

    fn read_pid(&self) -> Option<i32> {
        let raw = std::fs::read_to_string(&self.pid_path).ok()?;
        raw.trim().parse().ok()
    }

    /// Restart: stop if running, wait for exit, start again.
    pub fn restart(&self) -> Result<()> {
        if self.running() {
            self.stop()?;
            for _ in 0..50 {
                if !self.running() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            if self.running() {
                return Err(Error::service("service did not stop for restart"));
            }
        }
        self.start()
    }
}

impl Supervisor for PidfileSupervisor {
    fn running(&self) -> bool {
        let Some(pid) = self.read_pid() else {
            return false;
        };
        // Signal 0 probes existence without touching the process
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        if !alive {
            debug!(pid, "pidfile is stale");
        }
        alive
    }

    fn start(&self) -> Result<()> {
        if self.running() {
            info!("service already running");
            return Ok(());
        }

        let exe = std::env::current_exe()?;
        Command::new(exe)
            .arg("--daemon")
            .args(&self.daemon_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::service(format!("spawning daemon: {e}")))?;

        // Wait for the daemon to come up and write its pidfile
        for _ in 0..20 {
            if self.running() {
                info!("service started");
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        Err(Error::service("daemon did not start"))
    }

    fn stop(&self) -> Result<()> {
        let Some(pid) = self.read_pid() else {
            info!("service not running");
            return Ok(());
        };
        if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
            // Already gone; clean up the stale pidfile
            warn!(pid, "stale pidfile, removing");
            self.remove_pidfile();
        } else {
            info!(pid, "sent SIGTERM");
        }
        Ok(())
    }
}
