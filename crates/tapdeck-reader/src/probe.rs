//! Device discovery and resilient opening.

use std::time::Duration;

use tracing::{debug, error, info};

use tapdeck_core::constants::{CONNECT_MAX_TRIES, PN532_UART_PREFIX, SERIAL_BY_ID_DIR};

use crate::devices::AnyTagReader;
use crate::error::{ReaderError, ReaderResult};
use crate::pn532::Pn532Uart;
use crate::traits::TagReader;

const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Enumerate `/dev/serial/by-id` and return the first connection string a
/// PN532 answers on.
pub fn detect_connection_string() -> Option<String> {
    info!("probing for an NFC reader");
    let entries = match std::fs::read_dir(SERIAL_BY_ID_DIR) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(error = %e, "cannot enumerate {SERIAL_BY_ID_DIR}");
            return None;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let connection = format!("{PN532_UART_PREFIX}{}", path.display());
        info!(%connection, "trying");
        match Pn532Uart::open(&connection) {
            Ok(mut reader) => {
                let _ = reader.close();
                info!(%connection, "probe succeeded");
                return Some(connection);
            }
            Err(e) => debug!(%connection, error = %e, "probe failed"),
        }
    }

    None
}

/// Resolve the connection string from config (probing if allowed) and open
/// it, retrying transient failures up to [`CONNECT_MAX_TRIES`].
///
/// # Errors
///
/// Returns [`ReaderError::Open`] when no connection string can be resolved
/// or the device still refuses after the retry cap.
pub fn open_with_retries(connection: &str, probe: bool) -> ReaderResult<AnyTagReader> {
    let resolved = if !connection.is_empty() {
        connection.to_string()
    } else if probe {
        detect_connection_string()
            .ok_or_else(|| ReaderError::open("no reader found while probing"))?
    } else {
        return Err(ReaderError::open(
            "no connection string configured and probing is disabled",
        ));
    };

    let mut tries = 0;
    loop {
        match Pn532Uart::open(&resolved) {
            Ok(reader) => {
                if tries > 0 {
                    info!(tries, "connected after retries");
                }
                return Ok(AnyTagReader::Pn532(reader));
            }
            Err(e) => {
                tries += 1;
                if tries >= CONNECT_MAX_TRIES {
                    error!(tries, error = %e, "could not open reader");
                    return Err(e);
                }
                debug!(tries, error = %e, "open failed, retrying");
                std::thread::sleep(RETRY_DELAY);
            }
        }
    }
}
