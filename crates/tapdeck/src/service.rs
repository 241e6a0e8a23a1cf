//! Daemon assembly: state, watcher, control socket, poll loop, signals.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use tapdeck_core::constants::DB_RELOAD_QUIET_PERIOD;
use tapdeck_core::{Config, Result};
use tapdeck_db::{load_mappings, watch_mappings, MappingsEvent, MappingsSnapshot};
use tapdeck_launcher::{GameLibrary, PipeHost};
use tapdeck_reader::open_with_retries;

use crate::poll::{PollRunner, ReaderFactory};
use crate::socket;
use crate::sound::{AplaySound, NullSound, Sound};
use crate::state::ServiceState;
use crate::supervisor::PidfileSupervisor;

/// Run the service until SIGTERM/SIGINT.
///
/// Four long-running pieces: the blocking poll loop, the mappings watcher,
/// the control socket acceptor, and this function itself waiting on
/// signals. Everything stops through the shared cancellation token; the
/// worst-case shutdown latency is one full polling window.
pub async fn run(config: Config) -> Result<()> {
    std::fs::create_dir_all(&config.paths.runtime_dir)?;

    let supervisor = PidfileSupervisor::new(config.pid_path());
    supervisor.write_pidfile()?;

    let state = ServiceState::new(config.sentinel_path());

    match load_mappings(&config.paths.mappings) {
        Ok(snapshot) => {
            info!(mappings = snapshot.len(), "mappings loaded");
            state.set_db(snapshot);
        }
        Err(e) => {
            warn!(error = %e, "error loading mappings, starting empty");
            state.set_db(MappingsSnapshot::empty());
        }
    }

    let sound = build_sound(&config);
    spawn_mappings_watcher(config.paths.mappings.clone(), Arc::clone(&state));

    let socket_path = config.socket_path();
    let listener = socket::bind(&socket_path)?;
    let socket_task = tokio::spawn(socket::serve(
        listener,
        socket_path,
        Arc::clone(&state),
    ));

    let reader_config = config.reader.clone();
    let factory: ReaderFactory =
        Box::new(move || open_with_retries(&reader_config.connection, reader_config.probe));
    let runner = PollRunner::new(
        Arc::clone(&state),
        factory,
        Box::new(PipeHost::new(config.launcher.command_pipe.clone())),
        GameLibrary::new(config.launcher.library_roots.clone()),
        sound,
        config.last_scan_path(),
    );
    let poll_task = tokio::task::spawn_blocking(move || runner.run());

    wait_for_shutdown(&state).await;

    let _ = poll_task.await;
    let _ = socket_task.await;
    supervisor.remove_pidfile();
    info!("service stopped");
    Ok(())
}

fn build_sound(config: &Config) -> Arc<dyn Sound> {
    if config.sound.disabled {
        return Arc::new(NullSound);
    }
    match AplaySound::install(config.success_sound_path(), config.fail_sound_path()) {
        Ok(player) => Arc::new(player),
        Err(e) => {
            warn!(error = %e, "error writing sound files, sounds off");
            Arc::new(NullSound)
        }
    }
}

/// Reload the mappings when the watcher reports a settled change.
fn spawn_mappings_watcher(mappings: PathBuf, state: Arc<ServiceState>) {
    let rx = match watch_mappings(mappings.clone()) {
        Ok(rx) => rx,
        Err(e) => {
            // A missing file is created by the user later; the daemon still
            // runs, it just will not hot-reload until restarted.
            warn!(error = %e, "mappings watcher unavailable");
            return;
        }
    };

    tokio::spawn(async move {
        let token = state.stop_token();
        let mut rx = rx;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = rx.recv() => {
                    match event {
                        Some(MappingsEvent::Changed) => {
                            if state.db_load_time().elapsed() < DB_RELOAD_QUIET_PERIOD {
                                continue;
                            }
                            info!("mappings changed, reloading");
                            match load_mappings(&mappings) {
                                Ok(snapshot) => state.set_db(snapshot),
                                Err(e) => {
                                    warn!(error = %e, "error reloading mappings, publishing empty");
                                    state.set_db(MappingsSnapshot::empty());
                                }
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });
}

async fn wait_for_shutdown(state: &Arc<ServiceState>) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "cannot install SIGTERM handler");
            state.stop_token().cancelled().await;
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "cannot install SIGINT handler");
            state.stop_token().cancelled().await;
            return;
        }
    };

    let stop_token = state.stop_token();
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
        _ = stop_token.cancelled() => {}
    }
    state.request_stop();
}
