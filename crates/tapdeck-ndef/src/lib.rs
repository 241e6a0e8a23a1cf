//! NDEF Text record codec and tag memory layouts.
//!
//! This crate is the pure half of tapdeck's card handling: it encodes and
//! decodes the one NDEF shape the daemon cares about (a single short UTF-8
//! Text record) and knows the memory geometry of the two supported tag
//! families. It never touches a device; `tapdeck-reader` combines these
//! plans with real transactions.
//!
//! # Examples
//!
//! ```
//! use tapdeck_ndef::{decode_text, encode_text, Alignment};
//!
//! let bytes = encode_text("system:snes", Alignment::Page)?;
//! assert_eq!(decode_text(&bytes), "system:snes");
//! # Ok::<(), tapdeck_core::Error>(())
//! ```

pub mod mifare;
pub mod ntag;
pub mod text;

pub use text::{decode_text, encode_text, Alignment, MAX_TEXT_LEN};
