//! The launch command grammar.
//!
//! A resolved command string is dispatched by prefix:
//!
//! | Prefix      | Effect                                         |
//! |-------------|------------------------------------------------|
//! | `system:`   | open the named system's menu on the host       |
//! | `random:`   | launch a random game from that system's library|
//! | `ini:`      | switch the host to an INI profile              |
//! | `command:`  | run a shell command                            |
//! | anything    | treat as a filesystem path to a game           |

use std::str::FromStr;

use tapdeck_core::{Error, Result};

/// A parsed launch command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchCommand {
    /// Open a system menu: `system:snes`.
    System(String),

    /// Launch a random game from a system: `random:nes`.
    Random(String),

    /// Switch INI profile: `ini:2`.
    Ini(u8),

    /// Run a shell command: `command:reboot`.
    Shell(String),

    /// Launch the game at this path.
    Path(String),
}

impl FromStr for LaunchCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::UnknownCommand("empty command".to_string()));
        }

        if let Some(id) = s.strip_prefix("system:") {
            if id.is_empty() {
                return Err(Error::UnknownCommand(s.to_string()));
            }
            return Ok(Self::System(id.to_string()));
        }
        if let Some(id) = s.strip_prefix("random:") {
            if id.is_empty() {
                return Err(Error::UnknownCommand(s.to_string()));
            }
            return Ok(Self::Random(id.to_string()));
        }
        if let Some(profile) = s.strip_prefix("ini:") {
            let profile: u8 = profile
                .parse()
                .map_err(|_| Error::UnknownCommand(s.to_string()))?;
            if profile == 0 {
                return Err(Error::UnknownCommand(s.to_string()));
            }
            return Ok(Self::Ini(profile));
        }
        if let Some(shell) = s.strip_prefix("command:") {
            if shell.is_empty() {
                return Err(Error::UnknownCommand(s.to_string()));
            }
            return Ok(Self::Shell(shell.to_string()));
        }

        Ok(Self::Path(s.to_string()))
    }
}
