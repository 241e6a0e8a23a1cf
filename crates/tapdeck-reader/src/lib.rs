//! Reader hardware layer for the tapdeck daemon.
//!
//! This crate owns everything between "a serial device path" and "the raw
//! NDEF bytes of the tag in the field":
//!
//! - [`TagReader`]: the device abstraction the service polls. Implemented
//!   by the real [`Pn532Uart`] driver and by [`MockReader`] for tests and
//!   hardware-free development, dispatched through [`AnyTagReader`].
//! - [`pn532`]: the PN532 host-link frame codec and the UART command set
//!   (auto-poll, Mifare and NTAG data exchange).
//! - [`probe`]: `/dev/serial/by-id` enumeration and capped open retries.
//! - [`tags`]: high-level read/write that applies the memory plans from
//!   `tapdeck-ndef` over the reader primitives.
//!
//! The API is synchronous: the transport is a blocking serial port and the
//! poll loop owns the device exclusively from a blocking task. Empty poll
//! windows are `Ok(None)`; only [`ReaderError::is_fatal`] failures require
//! reopening the device.

pub mod devices;
pub mod error;
pub mod mock;
pub mod pn532;
pub mod probe;
pub mod tags;
pub mod traits;

pub use devices::AnyTagReader;
pub use error::{ReaderError, ReaderResult};
pub use mock::{MockHandle, MockReader, ScriptedPoll};
pub use pn532::Pn532Uart;
pub use probe::{detect_connection_string, open_with_retries};
pub use traits::{TagReader, TagTarget};
