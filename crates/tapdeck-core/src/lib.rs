//! Shared foundation for the tapdeck NFC daemon.
//!
//! This crate holds what every other tapdeck crate needs: the error enum,
//! the tag types ([`Card`], [`CardType`], [`TagUid`]), the timing and path
//! constants, and the TOML [`Config`] loaded at startup.
//!
//! Nothing here performs I/O except [`Config::load`]; device access lives in
//! `tapdeck-reader` and all service behavior in the `tapdeck` binary.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::{Config, LauncherConfig, PathsConfig, ReaderConfig, SoundConfig};
pub use error::{Error, Result};
pub use types::{Card, CardType, TagUid, MAX_UID_LENGTH, MIN_UID_LENGTH};
