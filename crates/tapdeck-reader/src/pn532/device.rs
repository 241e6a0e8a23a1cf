//! PN532 over UART.
//!
//! Implements the handful of PN532 commands the daemon needs: SAM
//! configuration and firmware probe at open, `InAutoPoll` for the polling
//! window, and `InDataExchange` for Mifare and NTAG memory access.
//!
//! All transactions are command → ACK → response over a blocking serial
//! port. Serial timeouts while waiting for a response map to
//! [`ReaderError::Timeout`]; any other serial failure means the bus is gone
//! and maps to [`ReaderError::Fatal`], which the poll loop answers with a
//! reconnect.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tracing::{debug, info, trace, warn};

use tapdeck_core::constants::{PERIOD_BETWEEN_POLLS, PN532_UART_PREFIX, TIMES_TO_POLL};
use tapdeck_core::TagUid;

use crate::error::{ReaderError, ReaderResult};
use crate::pn532::frame::{build_frame, FrameEvent, FrameParser, WAKEUP};
use crate::traits::{TagReader, TagTarget};

// Command codes
const CMD_GET_FIRMWARE_VERSION: u8 = 0x02;
const CMD_SAM_CONFIGURATION: u8 = 0x14;
const CMD_IN_DATA_EXCHANGE: u8 = 0x40;
const CMD_IN_RELEASE: u8 = 0x52;
const CMD_IN_AUTO_POLL: u8 = 0x60;

// Mifare / NTAG commands carried through InDataExchange
const MIFARE_CMD_AUTH_A: u8 = 0x60;
const MIFARE_CMD_READ: u8 = 0x30;
const MIFARE_CMD_WRITE: u8 = 0xA0;
const NTAG_CMD_READ: u8 = 0x30;
const NTAG_CMD_WRITE: u8 = 0xA2;

/// InAutoPoll target type: generic passive 106 kbps (ISO14443-A).
const POLL_TYPE_GENERIC_106A: u8 = 0x00;

/// PN532 status code for a failed Mifare authentication.
const STATUS_MIFARE_AUTH: u8 = 0x14;

const BAUD_RATE: u32 = 115_200;
const ACK_DEADLINE: Duration = Duration::from_secs(1);
const EXCHANGE_DEADLINE: Duration = Duration::from_secs(2);
const SERIAL_CHUNK_TIMEOUT: Duration = Duration::from_millis(100);

/// A PN532 reader attached to a serial port.
pub struct Pn532Uart {
    port: Box<dyn SerialPort>,
    parser: FrameParser,
    connection: String,
}

impl std::fmt::Debug for Pn532Uart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pn532Uart")
            .field("connection", &self.connection)
            .finish()
    }
}

impl Pn532Uart {
    /// Open a reader from a `pn532_uart:<path>` connection string.
    ///
    /// Performs the UART wakeup, configures the SAM and reads the firmware
    /// version so a dead or foreign device fails here rather than on the
    /// first poll.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Open`] when the connection string is not a
    /// `pn532_uart:` one, the port cannot be opened, or the device does not
    /// answer the initialization commands.
    pub fn open(connection: &str) -> ReaderResult<Self> {
        let path = connection
            .strip_prefix(PN532_UART_PREFIX)
            .ok_or_else(|| {
                ReaderError::open(format!("unsupported connection string: {connection}"))
            })?;

        let port = serialport::new(path, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .timeout(SERIAL_CHUNK_TIMEOUT)
            .open()
            .map_err(|e| ReaderError::open(format!("{path}: {e}")))?;

        let mut reader = Self {
            port,
            parser: FrameParser::new(),
            connection: connection.to_string(),
        };

        reader.wake()?;
        reader.sam_configure()?;
        let version = reader.firmware_version()?;
        info!(connection, version = %version, "opened PN532 reader");

        Ok(reader)
    }

    /// Send the UART wakeup preamble and drop whatever the device replies.
    fn wake(&mut self) -> ReaderResult<()> {
        self.port
            .write_all(&WAKEUP)
            .map_err(|e| ReaderError::open(format!("wakeup write: {e}")))?;
        std::thread::sleep(Duration::from_millis(50));

        // Purge stale bytes so the first real response parses cleanly
        let mut scratch = [0u8; 256];
        loop {
            match self.port.read(&mut scratch) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    break;
                }
                Err(e) => return Err(ReaderError::open(format!("wakeup purge: {e}"))),
            }
        }
        self.parser.clear();
        Ok(())
    }

    /// SAMConfiguration: normal mode, 1 s virtual-card timeout.
    fn sam_configure(&mut self) -> ReaderResult<()> {
        self.command(CMD_SAM_CONFIGURATION, &[0x01, 0x14, 0x01], ACK_DEADLINE)
            .map_err(|e| ReaderError::open(format!("SAM configuration: {e}")))?;
        Ok(())
    }

    /// GetFirmwareVersion, rendered as `ic:version.revision`.
    fn firmware_version(&mut self) -> ReaderResult<String> {
        let response = self
            .command(CMD_GET_FIRMWARE_VERSION, &[], ACK_DEADLINE)
            .map_err(|e| ReaderError::open(format!("firmware probe: {e}")))?;
        if response.len() < 3 {
            return Err(ReaderError::open("short firmware response"));
        }
        Ok(format!(
            "pn5{:02x}:{}.{}",
            response[0], response[1], response[2]
        ))
    }

    /// Run one command transaction: frame, ACK, response.
    ///
    /// `deadline` bounds the wait for the response; the ACK has its own
    /// fixed bound since the device ACKs immediately or not at all.
    fn command(&mut self, cmd: u8, params: &[u8], deadline: Duration) -> ReaderResult<Vec<u8>> {
        let mut data = Vec::with_capacity(params.len() + 1);
        data.push(cmd);
        data.extend_from_slice(params);

        let frame = build_frame(&data);
        trace!(cmd, frame = %hex::encode(&frame), "sending frame");
        self.port
            .write_all(&frame)
            .map_err(|e| map_serial_error("write", &e))?;
        self.port
            .flush()
            .map_err(|e| map_serial_error("flush", &e))?;

        self.wait_for_ack()?;
        let response = self.wait_for_response(deadline)?;

        if response.first() != Some(&(cmd + 1)) {
            return Err(ReaderError::protocol(format!(
                "response 0x{:02x} does not match command 0x{cmd:02x}",
                response.first().copied().unwrap_or(0)
            )));
        }
        Ok(response[1..].to_vec())
    }

    fn wait_for_ack(&mut self) -> ReaderResult<()> {
        loop {
            match self.next_event(ACK_DEADLINE)? {
                FrameEvent::Ack => return Ok(()),
                FrameEvent::Response(_) => {
                    // Late response from an earlier command; keep waiting
                    warn!("discarding stale response while waiting for ACK");
                }
            }
        }
    }

    fn wait_for_response(&mut self, timeout: Duration) -> ReaderResult<Vec<u8>> {
        loop {
            match self.next_event(timeout)? {
                FrameEvent::Ack => continue,
                FrameEvent::Response(data) => return Ok(data),
            }
        }
    }

    /// Pump serial bytes into the parser until an event or the deadline.
    fn next_event(&mut self, timeout: Duration) -> ReaderResult<FrameEvent> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 64];
        loop {
            if let Some(event) = self.parser.try_next()? {
                return Ok(event);
            }
            if Instant::now() >= deadline {
                return Err(ReaderError::timeout(timeout.as_millis() as u64));
            }
            match self.port.read(&mut chunk) {
                Ok(0) => return Err(ReaderError::fatal("serial port closed")),
                Ok(n) => self.parser.push(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(map_serial_error("read", &e)),
            }
        }
    }

    /// InDataExchange with the selected target; returns the payload after
    /// the status byte.
    fn data_exchange(&mut self, payload: &[u8], auth: bool) -> ReaderResult<Vec<u8>> {
        let mut params = Vec::with_capacity(payload.len() + 1);
        params.push(0x01); // target number
        params.extend_from_slice(payload);

        let response = self.command(CMD_IN_DATA_EXCHANGE, &params, EXCHANGE_DEADLINE)?;
        let status = *response
            .first()
            .ok_or_else(|| ReaderError::protocol("empty exchange response"))?;
        match status & 0x3F {
            0x00 => Ok(response[1..].to_vec()),
            STATUS_MIFARE_AUTH if auth => Err(ReaderError::AuthFailed {
                // Overwritten by the caller with the real block number
                block: 0,
            }),
            code => Err(ReaderError::Status { code }),
        }
    }
}

impl TagReader for Pn532Uart {
    fn poll_once(&mut self) -> ReaderResult<Option<TagTarget>> {
        // Period is in 150 ms units; the whole window is device-side
        let period = (PERIOD_BETWEEN_POLLS.as_millis() / 150) as u8;
        let window = PERIOD_BETWEEN_POLLS * u32::from(TIMES_TO_POLL) + EXCHANGE_DEADLINE;

        let response = match self.command(
            CMD_IN_AUTO_POLL,
            &[TIMES_TO_POLL, period, POLL_TYPE_GENERIC_106A],
            window,
        ) {
            Ok(response) => response,
            // An unanswered window is an empty one, not a failure
            Err(ReaderError::Timeout { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let count = response.first().copied().unwrap_or(0);
        if count == 0 {
            return Ok(None);
        }

        // [NbTg, Type, Len, Tg, SENS_RES(2), SEL_RES, NFCIDLen, NFCID1...]
        if response.len() < 9 {
            return Err(ReaderError::protocol("short auto-poll target"));
        }
        let atqa = (u16::from(response[4]) << 8) | u16::from(response[5]);
        let sak = response[6];
        let uid_len = usize::from(response[7]);
        if response.len() < 8 + uid_len {
            return Err(ReaderError::protocol("truncated target UID"));
        }
        let uid = TagUid::new(response[8..8 + uid_len].to_vec())
            .map_err(|e| ReaderError::protocol(e.to_string()))?;

        debug!(%uid, sak, atqa, "target found");
        Ok(Some(TagTarget { uid, sak, atqa }))
    }

    fn mifare_auth(&mut self, block: u8, key: &[u8; 6], uid_tail: &[u8; 4]) -> ReaderResult<()> {
        let mut payload = Vec::with_capacity(12);
        payload.push(MIFARE_CMD_AUTH_A);
        payload.push(block);
        payload.extend_from_slice(key);
        payload.extend_from_slice(uid_tail);

        match self.data_exchange(&payload, true) {
            Ok(_) => Ok(()),
            Err(ReaderError::AuthFailed { .. }) => Err(ReaderError::AuthFailed { block }),
            Err(e) => Err(e),
        }
    }

    fn mifare_read_block(&mut self, block: u8) -> ReaderResult<[u8; 16]> {
        let data = self.data_exchange(&[MIFARE_CMD_READ, block], false)?;
        data.try_into()
            .map_err(|_| ReaderError::protocol(format!("short read of block {block}")))
    }

    fn mifare_write_block(&mut self, block: u8, data: &[u8; 16]) -> ReaderResult<()> {
        let mut payload = Vec::with_capacity(18);
        payload.push(MIFARE_CMD_WRITE);
        payload.push(block);
        payload.extend_from_slice(data);
        self.data_exchange(&payload, false)?;
        Ok(())
    }

    fn ntag_read_pages(&mut self, page: u8) -> ReaderResult<[u8; 16]> {
        let data = self.data_exchange(&[NTAG_CMD_READ, page], false)?;
        data.try_into()
            .map_err(|_| ReaderError::protocol(format!("short read of page {page}")))
    }

    fn ntag_write_page(&mut self, page: u8, data: &[u8; 4]) -> ReaderResult<()> {
        let mut payload = Vec::with_capacity(6);
        payload.push(NTAG_CMD_WRITE);
        payload.push(page);
        payload.extend_from_slice(data);
        self.data_exchange(&payload, false)?;
        Ok(())
    }

    fn connection(&self) -> &str {
        &self.connection
    }

    fn close(&mut self) -> ReaderResult<()> {
        // Best effort: release any selected target; the port itself closes
        // on drop.
        if let Err(e) = self.command(CMD_IN_RELEASE, &[0x00], ACK_DEADLINE) {
            debug!(error = %e, "release on close failed");
        }
        Ok(())
    }
}

/// Classify a serial error: timeouts are transient, everything else means
/// the bus is gone.
fn map_serial_error(op: &str, e: &std::io::Error) -> ReaderError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            ReaderError::timeout(SERIAL_CHUNK_TIMEOUT.as_millis() as u64)
        }
        _ => ReaderError::fatal(format!("serial {op}: {e}")),
    }
}
