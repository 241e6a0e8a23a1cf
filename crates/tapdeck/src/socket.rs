//! Control socket.
//!
//! A Unix stream socket under the runtime directory, one request per
//! connection:
//!
//! - `status` → `<unix_ts>,<uid>,<launcher_enabled>,<text>` for the last
//!   scanned card, or `0,,<bool>,` when nothing has been scanned yet;
//! - `disable` / `enable` → flip the launcher kill-switch, empty reply;
//! - anything else → empty reply, logged.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use tapdeck_core::constants::SOCKET_READ_LIMIT;
use tapdeck_core::{Error, Result};

use crate::state::ServiceState;

/// Bind the control socket, replacing any stale file from a previous run.
pub fn bind(path: &PathBuf) -> Result<UnixListener> {
    let _ = std::fs::remove_file(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    UnixListener::bind(path)
        .map_err(|e| Error::service(format!("binding {}: {e}", path.display())))
}

/// Accept loop. Runs until the stop token fires, then unlinks the socket.
pub async fn serve(listener: UnixListener, path: PathBuf, state: Arc<ServiceState>) {
    let token = state.stop_token();
    info!(path = %path.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(handle_connection(stream, state));
                    }
                    Err(e) => {
                        error!(error = %e, "error accepting connection");
                        break;
                    }
                }
            }
        }
    }

    let _ = std::fs::remove_file(&path);
    info!("control socket closed");
}

/// Serve one request and close.
async fn handle_connection(mut stream: UnixStream, state: Arc<ServiceState>) {
    debug!("new socket connection");

    let mut buf = vec![0u8; SOCKET_READ_LIMIT];
    let n = match stream.read(&mut buf).await {
        Ok(0) => return,
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "error reading from connection");
            return;
        }
    };

    let request = String::from_utf8_lossy(&buf[..n]);
    let payload = respond(request.trim(), &state);

    if let Err(e) = stream.write_all(payload.as_bytes()).await {
        error!(error = %e, "error writing to connection");
    }
}

/// Compute the reply for one request line.
fn respond(request: &str, state: &ServiceState) -> String {
    match request {
        "status" => {
            let enabled = !state.launcher_disabled();
            match state.last_scanned() {
                Some(card) => format!(
                    "{},{},{},{}",
                    card.scanned_at.timestamp(),
                    card.uid.as_hex(),
                    enabled,
                    card.text
                ),
                None => format!("0,,{enabled},"),
            }
        }
        "disable" => {
            state.disable_launcher();
            info!("launcher disabled");
            String::new()
        }
        "enable" => {
            state.enable_launcher();
            info!("launcher enabled");
            String::new()
        }
        other => {
            warn!(request = other, "unknown command");
            String::new()
        }
    }
}
