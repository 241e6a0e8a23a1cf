//! Command dispatch: from a resolved command string to a host effect.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::info;

use tapdeck_core::{Error, Result};

use crate::command::LaunchCommand;
use crate::host::GameHost;
use crate::library::GameLibrary;

/// Dispatch a resolved command string.
///
/// Best-effort by contract: any failure is returned for the caller to log
/// and play the fail sound; nothing here retries or changes state.
///
/// # Errors
///
/// Returns the parse error for an invalid command string,
/// [`Error::UnknownSystem`] for a bare path no library root accounts for,
/// and whatever the host or library reported for a failed launch.
pub fn dispatch(command: &str, host: &dyn GameHost, library: &GameLibrary) -> Result<()> {
    match command.parse::<LaunchCommand>()? {
        LaunchCommand::System(id) => host.launch_system_menu(&id),
        LaunchCommand::Random(id) => {
            let game = library.random_game(&id)?;
            info!(system = %id, game = %game.display(), "random pick");
            host.launch_game(&id, &game)
        }
        LaunchCommand::Ini(profile) => host.set_ini(profile),
        LaunchCommand::Shell(shell) => run_shell(&shell),
        LaunchCommand::Path(path) => {
            let path = Path::new(&path);
            // A game outside every library root has no system to launch
            // under; that is a failure, not a pass-through
            let system = library
                .system_for_path(path)
                .ok_or_else(|| Error::UnknownSystem(path.display().to_string()))?;
            host.launch_game(&system, path)
        }
    }
}

/// Spawn a shell command: no stdin, environment inherited, not awaited.
///
/// The poll loop must keep its cadence, so the child is left to run; only
/// spawn failures are reported.
fn run_shell(shell: &str) -> Result<()> {
    info!(shell, "running shell command");
    Command::new("sh")
        .arg("-c")
        .arg(shell)
        .stdin(Stdio::null())
        .spawn()
        .map_err(|e| Error::launch_failed(format!("spawning `{shell}`: {e}")))?;
    Ok(())
}
