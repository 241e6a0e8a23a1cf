//! The launch primitive boundary.
//!
//! The actual game-launching machinery (menu cores, INI switching) lives in
//! the host platform; the daemon only pushes short textual commands at it.
//! [`GameHost`] is that boundary: [`PipeHost`] writes to the host's command
//! pipe, [`RecordingHost`] captures calls for tests.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::info;

use tapdeck_core::{Error, Result};

/// Launch operations the host exposes.
pub trait GameHost: Send + Sync {
    /// Launch the game at `path` as a title of `system`.
    fn launch_game(&self, system: &str, path: &Path) -> Result<()>;

    /// Open the menu of the named system.
    fn launch_system_menu(&self, system: &str) -> Result<()>;

    /// Switch the host to INI profile `profile`.
    fn set_ini(&self, profile: u8) -> Result<()>;
}

/// Production host: textual commands down the host's command pipe.
#[derive(Debug, Clone)]
pub struct PipeHost {
    pipe: PathBuf,
}

impl PipeHost {
    pub fn new(pipe: PathBuf) -> Self {
        Self { pipe }
    }

    fn send(&self, command: &str) -> Result<()> {
        let mut pipe = std::fs::OpenOptions::new()
            .write(true)
            .open(&self.pipe)
            .map_err(|e| {
                Error::launch_failed(format!("opening {}: {e}", self.pipe.display()))
            })?;
        writeln!(pipe, "{command}")
            .map_err(|e| Error::launch_failed(format!("writing host command: {e}")))?;
        info!(command, "sent to host");
        Ok(())
    }
}

impl GameHost for PipeHost {
    fn launch_game(&self, system: &str, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(Error::launch_failed(format!(
                "no such game: {}",
                path.display()
            )));
        }
        self.send(&format!("load_game {system} {}", path.display()))
    }

    fn launch_system_menu(&self, system: &str) -> Result<()> {
        self.send(&format!("show_menu {system}"))
    }

    fn set_ini(&self, profile: u8) -> Result<()> {
        self.send(&format!("set_ini {profile}"))
    }
}

/// What a [`RecordingHost`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Game(String, PathBuf),
    SystemMenu(String),
    Ini(u8),
}

/// Test host that records every call instead of acting.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    events: Arc<Mutex<Vec<HostEvent>>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the recorded events.
    pub fn take_events(&self) -> Vec<HostEvent> {
        std::mem::take(&mut self.events.lock().unwrap())
    }

    /// Number of recorded events without draining them.
    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl GameHost for RecordingHost {
    fn launch_game(&self, system: &str, path: &Path) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(HostEvent::Game(system.to_string(), path.to_path_buf()));
        Ok(())
    }

    fn launch_system_menu(&self, system: &str) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(HostEvent::SystemMenu(system.to_string()));
        Ok(())
    }

    fn set_ini(&self, profile: u8) -> Result<()> {
        self.events.lock().unwrap().push(HostEvent::Ini(profile));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_host_writes_commands() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = dir.path().join("host_cmd");
        std::fs::write(&pipe, b"").unwrap();

        let host = PipeHost::new(pipe.clone());
        host.launch_system_menu("snes").unwrap();

        let written = std::fs::read_to_string(&pipe).unwrap();
        assert_eq!(written, "show_menu snes\n");
    }

    #[test]
    fn test_pipe_host_missing_game() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = dir.path().join("host_cmd");
        std::fs::write(&pipe, b"").unwrap();

        let host = PipeHost::new(pipe);
        let result = host.launch_game("snes", Path::new("/nonexistent/game.sfc"));
        assert!(matches!(result, Err(Error::LaunchFailed { .. })));
    }

    #[test]
    fn test_pipe_host_missing_pipe() {
        let host = PipeHost::new(PathBuf::from("/nonexistent/host_cmd"));
        assert!(host.set_ini(1).is_err());
    }

    #[test]
    fn test_recording_host() {
        let host = RecordingHost::new();
        host.launch_system_menu("snes").unwrap();
        host.set_ini(3).unwrap();

        assert_eq!(
            host.take_events(),
            vec![
                HostEvent::SystemMenu("snes".to_string()),
                HostEvent::Ini(3),
            ]
        );
        assert_eq!(host.event_count(), 0);
    }
}
