//! Debounced change notifications for the mappings file.
//!
//! Editors produce messy event streams: several writes per save, or a
//! delete-and-recreate that silently kills the watch. This module folds all
//! of that into a single [`MappingsEvent::Changed`] per edit burst using a
//! one-shot pending timer:
//!
//! - any write/create arms (or re-arms) a reload deadline one quiet period
//!   away; the event fires when the deadline passes with no further noise;
//! - a remove switches the timer into rewatch mode, which waits for the
//!   file to reappear, re-adds the watch and then fires.
//!
//! The receiver side applies the last-load check (events within one quiet
//! period of the previous load are dropped) because only it knows when it
//! last loaded.

use std::path::PathBuf;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use tapdeck_core::constants::DB_RELOAD_QUIET_PERIOD;
use tapdeck_core::{Error, Result};

/// Events delivered to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingsEvent {
    /// The mappings file settled after a change and should be reloaded.
    Changed,
}

/// How many quiet periods to wait for a removed file to reappear.
const REWATCH_ATTEMPTS: u32 = 5;

/// Timer state: at most one pending deadline at a time.
#[derive(Debug, Clone, Copy)]
enum Pending {
    Idle,
    Reload { deadline: Instant },
    Rewatch { deadline: Instant, attempts: u32 },
}

/// Start watching the mappings file.
///
/// Returns a channel receiving one [`MappingsEvent::Changed`] per settled
/// edit. Watching a path that does not exist yet is an error; the caller
/// skips the watcher in that case and keeps the empty snapshot.
///
/// # Errors
///
/// Returns [`Error::Watcher`] if the watch cannot be established.
pub fn watch_mappings(path: PathBuf) -> Result<mpsc::Receiver<MappingsEvent>> {
    let (raw_tx, raw_rx) = channel();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        let _ = raw_tx.send(result);
    })
    .map_err(|e| Error::Watcher(format!("creating watcher: {e}")))?;

    watcher
        .watch(&path, RecursiveMode::NonRecursive)
        .map_err(|e| Error::Watcher(format!("watching {}: {e}", path.display())))?;

    let (tx, rx) = mpsc::channel(8);
    std::thread::Builder::new()
        .name("mappings-watcher".to_string())
        .spawn(move || debounce_loop(watcher, raw_rx, path, tx))
        .map_err(|e| Error::Watcher(format!("spawning watcher thread: {e}")))?;

    Ok(rx)
}

fn debounce_loop(
    mut watcher: RecommendedWatcher,
    raw_rx: std::sync::mpsc::Receiver<notify::Result<Event>>,
    path: PathBuf,
    tx: mpsc::Sender<MappingsEvent>,
) {
    let mut pending = Pending::Idle;

    loop {
        let timeout = match pending {
            Pending::Idle => Duration::from_secs(3600),
            Pending::Reload { deadline } | Pending::Rewatch { deadline, .. } => {
                deadline.saturating_duration_since(Instant::now())
            }
        };

        match raw_rx.recv_timeout(timeout) {
            Ok(Ok(event)) => pending = on_event(&event, pending),
            Ok(Err(e)) => warn!(error = %e, "watch error"),
            Err(RecvTimeoutError::Timeout) => {
                match pending {
                    Pending::Idle => {} // periodic wakeup, nothing armed
                    Pending::Reload { .. } => {
                        pending = Pending::Idle;
                        if tx.blocking_send(MappingsEvent::Changed).is_err() {
                            return;
                        }
                    }
                    Pending::Rewatch { attempts, .. } => {
                        pending = try_rewatch(&mut watcher, &path, attempts, &tx);
                        if matches!(pending, Pending::Idle) && tx.is_closed() {
                            return;
                        }
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Fold a raw notify event into the timer state.
fn on_event(event: &Event, pending: Pending) -> Pending {
    match event.kind {
        EventKind::Modify(_) | EventKind::Create(_) => {
            debug!(kind = ?event.kind, "mappings activity, arming reload");
            match pending {
                // A rewatch in progress stays a rewatch; the create will be
                // picked up when its deadline checks the file.
                Pending::Rewatch { deadline, attempts } => Pending::Rewatch { deadline, attempts },
                _ => Pending::Reload {
                    deadline: Instant::now() + DB_RELOAD_QUIET_PERIOD,
                },
            }
        }
        EventKind::Remove(_) => {
            debug!("mappings removed, waiting for it to reappear");
            Pending::Rewatch {
                deadline: Instant::now() + DB_RELOAD_QUIET_PERIOD,
                attempts: 0,
            }
        }
        _ => pending,
    }
}

/// Rewatch deadline fired: re-add the watch if the file is back.
fn try_rewatch(
    watcher: &mut RecommendedWatcher,
    path: &PathBuf,
    attempts: u32,
    tx: &mpsc::Sender<MappingsEvent>,
) -> Pending {
    if path.exists() {
        // The old watch followed the deleted inode; replace it
        let _ = watcher.unwatch(path);
        match watcher.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                debug!("mappings reappeared, watch re-added");
                let _ = tx.blocking_send(MappingsEvent::Changed);
            }
            Err(e) => warn!(error = %e, "re-adding watch failed"),
        }
        return Pending::Idle;
    }

    if attempts + 1 >= REWATCH_ATTEMPTS {
        warn!(
            path = %path.display(),
            "mappings file did not reappear, giving up on this edit"
        );
        return Pending::Idle;
    }

    Pending::Rewatch {
        deadline: Instant::now() + DB_RELOAD_QUIET_PERIOD,
        attempts: attempts + 1,
    }
}
