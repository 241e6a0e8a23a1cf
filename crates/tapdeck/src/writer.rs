//! Write mode: `tapdeck --write <text>`.
//!
//! The reader belongs to the running service, so write mode stops it first,
//! takes the device for one poll-and-write, and always restarts the service
//! afterwards, success or failure. SIGTERM is deferred for the duration of
//! the write so a supervisor restart cannot abort a tag mid-block; a
//! deferred signal is honored once the service is back up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use tapdeck_core::constants::{STOP_POLL_INTERVAL, STOP_POLL_TRIES};
use tapdeck_core::{Config, Error, Result};
use tapdeck_reader::{open_with_retries, tags, TagReader};

use crate::supervisor::{PidfileSupervisor, Supervisor};

/// Exit status of a completed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Tag written.
    Done,
    /// Tag written, but a SIGTERM arrived during the write; the caller
    /// should exit as if terminated.
    DoneThenTerminate,
}

/// Run write mode end to end.
///
/// # Errors
///
/// Fails when the service will not stop, no card is on the reader, the
/// card rejects the write, or the device cannot be opened. The service is
/// restarted (if it was running) on every path out of here.
pub async fn run(
    config: &Config,
    text: String,
    supervisor: &PidfileSupervisor,
) -> Result<WriteOutcome> {
    let was_running = supervisor.running();
    if was_running {
        info!("stopping service for write mode");
        supervisor.stop()?;
        let mut stopped = false;
        for _ in 0..STOP_POLL_TRIES {
            if !supervisor.running() {
                stopped = true;
                break;
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
        if !stopped {
            return Err(Error::service("service did not stop for write mode"));
        }
    }

    // Defer termination while the tag is being written
    let deferred = Arc::new(AtomicBool::new(false));
    let guard = spawn_sigterm_guard(Arc::clone(&deferred))?;

    let connection = config.reader.connection.clone();
    let probe = config.reader.probe;
    let result = tokio::task::spawn_blocking(move || write_once(&connection, probe, &text))
        .await
        .map_err(|e| Error::service(format!("write task panicked: {e}")))?;

    guard.abort();

    if was_running {
        info!("restarting service");
        if let Err(e) = supervisor.start() {
            error!(error = %e, "error restarting service");
        }
    }

    let written = result?;
    info!(bytes = written.len(), "successfully wrote to card");

    if deferred.load(Ordering::SeqCst) {
        warn!("honoring SIGTERM deferred during write");
        return Ok(WriteOutcome::DoneThenTerminate);
    }
    Ok(WriteOutcome::Done)
}

/// Swallow SIGTERM for as long as the returned task is alive.
fn spawn_sigterm_guard(deferred: Arc<AtomicBool>) -> Result<tokio::task::JoinHandle<()>> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| Error::service(format!("installing SIGTERM handler: {e}")))?;
    Ok(tokio::spawn(async move {
        while sigterm.recv().await.is_some() {
            warn!("deferring SIGTERM until the tag write completes");
            deferred.store(true, Ordering::SeqCst);
        }
    }))
}

/// One poll window, one write.
fn write_once(connection: &str, probe: bool, text: &str) -> Result<Vec<u8>> {
    let mut reader =
        open_with_retries(connection, probe).map_err(|e| Error::service(e.to_string()))?;

    let outcome = poll_and_write(&mut reader, text);
    if let Err(e) = reader.close() {
        warn!(error = %e, "error closing reader");
    }
    outcome
}

fn poll_and_write<R: TagReader>(reader: &mut R, text: &str) -> Result<Vec<u8>> {
    let target = reader
        .poll_once()
        .map_err(|e| Error::service(format!("could not poll: {e}")))?
        .ok_or_else(|| Error::service("could not find a card"))?;

    info!(uid = %target.uid, card_type = %target.card_type(), "found card");

    tags::write_tag(reader, &target, text).map_err(|e| Error::service(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapdeck_ndef::decode_text;
    use tapdeck_reader::MockReader;

    #[test]
    fn test_poll_and_write_roundtrip() {
        let (mut reader, handle) = MockReader::new();
        handle.place_ntag(vec![0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0x80], &[]);

        let written = poll_and_write(&mut reader, "hello").unwrap();
        assert!(!written.is_empty());

        // A fresh poll reads back what was written
        let target = reader.poll_once().unwrap().unwrap();
        let bytes = tags::read_tag(&mut reader, &target).unwrap();
        assert_eq!(decode_text(&bytes), "hello");
    }

    #[test]
    fn test_no_card_fails() {
        let (mut reader, _handle) = MockReader::new();
        let result = poll_and_write(&mut reader, "hello");
        assert!(result.is_err());
    }

    #[test]
    fn test_unformatted_mifare_reports_hint() {
        let (mut reader, handle) = MockReader::new();
        handle.place_mifare_with_keys(
            vec![0xDE, 0xAD, 0xBE, 0xEF],
            &[],
            vec![[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]],
        );

        let error = poll_and_write(&mut reader, "hello").unwrap_err();
        assert!(error.to_string().contains("NDEF-formatted"));
    }
}
