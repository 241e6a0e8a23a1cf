//! Game library index.
//!
//! A "system" is a directory named after it under one of the configured
//! library roots; its games are the files underneath, any depth. The index
//! is computed on demand: `random:` tags are occasional, and scanning one
//! system directory is cheap next to the 6-second polling window.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use tracing::debug;

use tapdeck_core::{Error, Result};

/// Filesystem game library spread over one or more roots.
#[derive(Debug, Clone)]
pub struct GameLibrary {
    roots: Vec<PathBuf>,
}

impl GameLibrary {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// All indexed games for a system, across every root that has it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSystem`] when no root contains a directory
    /// with the system's name.
    pub fn index_system(&self, system: &str) -> Result<Vec<PathBuf>> {
        let mut games = Vec::new();
        let mut found_dir = false;

        for root in &self.roots {
            let dir = root.join(system);
            if !dir.is_dir() {
                continue;
            }
            found_dir = true;
            collect_files(&dir, &mut games)?;
        }

        if !found_dir {
            return Err(Error::UnknownSystem(system.to_string()));
        }

        debug!(system, count = games.len(), "indexed system");
        Ok(games)
    }

    /// Pick a random game from a system's index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSystem`] for a system with no directory and
    /// [`Error::EmptyLibrary`] for one with a directory but no games. The
    /// empty case is a real error, never an index into nothing.
    pub fn random_game(&self, system: &str) -> Result<PathBuf> {
        let games = self.index_system(system)?;
        games
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| Error::EmptyLibrary(system.to_string()))
    }

    /// Infer the system a game path belongs to: the first path component
    /// under the library root that contains it.
    pub fn system_for_path(&self, path: &Path) -> Option<String> {
        for root in &self.roots {
            if let Ok(rest) = path.strip_prefix(root) {
                let system = rest.components().next()?;
                return Some(system.as_os_str().to_string_lossy().into_owned());
            }
        }
        None
    }
}

/// Recursively collect regular files, skipping dotfiles.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
