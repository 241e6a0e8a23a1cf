//! Daemon configuration.
//!
//! Configuration is a TOML file read once at startup. A missing file is not
//! an error; every field has a default so a bare install runs with probing
//! enabled and sounds on.
//!
//! ```toml
//! [reader]
//! connection = "pn532_uart:/dev/ttyUSB0"
//! probe = false
//!
//! [sound]
//! disabled = true
//!
//! [paths]
//! mappings = "/media/data/tapdeck.csv"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_COMMAND_PIPE, DEFAULT_MAPPINGS_PATH, DEFAULT_RUNTIME_DIR, FAIL_SOUND_FILE,
    LAST_SCAN_FILE, LAUNCHER_DISABLED_FILE, PID_FILE, SOCKET_FILE, SUCCESS_SOUND_FILE,
};
use crate::error::{Error, Result};

/// Reader connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// libnfc-style connection string, e.g. `pn532_uart:/dev/ttyUSB0`.
    /// Empty means "probe if allowed".
    pub connection: String,

    /// Whether to enumerate `/dev/serial/by-id` when no connection string
    /// is configured.
    pub probe: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            connection: String::new(),
            probe: true,
        }
    }
}

/// Sound feedback settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    /// Suppress the success/fail sounds entirely.
    pub disabled: bool,
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for the socket, pidfile, sentinel and sound files.
    pub runtime_dir: PathBuf,

    /// User-editable mappings database.
    pub mappings: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            runtime_dir: PathBuf::from(DEFAULT_RUNTIME_DIR),
            mappings: PathBuf::from(DEFAULT_MAPPINGS_PATH),
        }
    }
}

/// Launch host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Command pipe of the game-launch host.
    pub command_pipe: PathBuf,

    /// Directories scanned to index games per system.
    pub library_roots: Vec<PathBuf>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            command_pipe: PathBuf::from(DEFAULT_COMMAND_PIPE),
            library_roots: vec![PathBuf::from("/media/games")],
        }
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub reader: ReaderConfig,
    pub sound: SoundConfig,
    pub paths: PathsConfig,
    pub launcher: LauncherConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults; a present but malformed file is
    /// an error so a typo never silently reverts the reader settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| Error::config(format!("parsing {}: {e}", path.display())))
    }

    /// Set the reader connection string.
    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.reader.connection = connection.into();
        self
    }

    /// Set the runtime directory.
    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.paths.runtime_dir = dir.into();
        self
    }

    /// Set the mappings database path.
    pub fn with_mappings(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.mappings = path.into();
        self
    }

    pub fn socket_path(&self) -> PathBuf {
        self.paths.runtime_dir.join(SOCKET_FILE)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.paths.runtime_dir.join(PID_FILE)
    }

    pub fn sentinel_path(&self) -> PathBuf {
        self.paths.runtime_dir.join(LAUNCHER_DISABLED_FILE)
    }

    pub fn last_scan_path(&self) -> PathBuf {
        self.paths.runtime_dir.join(LAST_SCAN_FILE)
    }

    pub fn success_sound_path(&self) -> PathBuf {
        self.paths.runtime_dir.join(SUCCESS_SOUND_FILE)
    }

    pub fn fail_sound_path(&self) -> PathBuf {
        self.paths.runtime_dir.join(FAIL_SOUND_FILE)
    }
}
