//! Core tag types shared by the reader, codec and service crates.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Minimum UID length in bytes (per ISO 14443-A anticollision).
pub const MIN_UID_LENGTH: usize = 4;

/// Maximum UID length in bytes (per ISO 14443-A anticollision).
pub const MAX_UID_LENGTH: usize = 10;

/// Supported card families.
///
/// Detection uses the SAK/ATQA bytes from the ISO 14443-A selection
/// sequence. Anything that is neither an NTAG nor a Mifare Classic 1K is
/// reported as `Unknown` and still treated as an arrival with empty text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardType {
    /// Mifare Classic 1K (16 sectors of 4 blocks, key-authenticated).
    MifareClassic1k,

    /// NXP NTAG213/215/216 (page-oriented, 4 bytes per page).
    Ntag,

    /// Unrecognized SAK/ATQA combination.
    Unknown,
}

impl CardType {
    /// Detect the card family from the selection response.
    ///
    /// `SAK == 0x00` with `ATQA == 0x0044` identifies the NTAG family;
    /// `SAK == 0x08` identifies Mifare Classic 1K.
    ///
    /// # Examples
    ///
    /// ```
    /// use tapdeck_core::CardType;
    ///
    /// assert_eq!(CardType::from_sak_atqa(0x00, 0x0044), CardType::Ntag);
    /// assert_eq!(CardType::from_sak_atqa(0x08, 0x0004), CardType::MifareClassic1k);
    /// assert_eq!(CardType::from_sak_atqa(0x20, 0x0344), CardType::Unknown);
    /// ```
    pub fn from_sak_atqa(sak: u8, atqa: u16) -> Self {
        match (sak, atqa) {
            (0x00, 0x0044) => Self::Ntag,
            (0x08, _) => Self::MifareClassic1k,
            _ => Self::Unknown,
        }
    }

    /// Human-readable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MifareClassic1k => "Mifare Classic 1K",
            Self::Ntag => "NTAG",
            Self::Unknown => "Unknown",
        }
    }

    /// Check whether tag memory can be read and written for this family.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validated tag UID (4-10 bytes).
///
/// Rendered everywhere as lowercase hex without separators; that rendering
/// is the identity used for debouncing and for the mappings database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagUid(Vec<u8>);

impl TagUid {
    /// Create a UID from raw anticollision bytes with length validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUid`] if the byte count is outside 4-10.
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        let len = bytes.len();
        if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&len) {
            return Err(Error::invalid_uid(format!(
                "UID must be {MIN_UID_LENGTH}-{MAX_UID_LENGTH} bytes, got {len}"
            )));
        }
        Ok(Self(bytes))
    }

    /// Raw UID bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex rendering, no separators.
    ///
    /// # Examples
    ///
    /// ```
    /// use tapdeck_core::TagUid;
    ///
    /// let uid = TagUid::new(vec![0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0x80]).unwrap();
    /// assert_eq!(uid.as_hex(), "04a1b2c3d4e580");
    /// ```
    pub fn as_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// The last four UID bytes, as needed by Mifare authentication.
    ///
    /// Seven-byte UIDs authenticate with their tail on Classic cards.
    pub fn auth_tail(&self) -> [u8; 4] {
        let bytes = &self.0[self.0.len() - 4..];
        [bytes[0], bytes[1], bytes[2], bytes[3]]
    }
}

impl fmt::Display for TagUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_hex())
    }
}

impl FromStr for TagUid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| Error::invalid_uid(format!("not a hex string: {e}")))?;
        Self::new(bytes)
    }
}

/// A scanned tag as tracked by the service.
///
/// Two sightings are the same tag iff their UIDs match; text and timestamps
/// do not participate in debouncing. `scan_time` is monotonic and drives the
/// forget timeout, `scanned_at` is wall-clock and feeds the status protocol.
#[derive(Debug, Clone)]
pub struct Card {
    /// Detected card family.
    pub card_type: CardType,

    /// Tag UID.
    pub uid: TagUid,

    /// Decoded NDEF text, empty when the tag has no readable Text record.
    pub text: String,

    /// Monotonic sighting time, used for the forget timeout.
    pub scan_time: Instant,

    /// Wall-clock sighting time, reported over the control socket.
    pub scanned_at: DateTime<Utc>,
}

impl Card {
    /// Create a card stamped with the current time.
    pub fn new(card_type: CardType, uid: TagUid, text: String) -> Self {
        Self {
            card_type,
            uid,
            text,
            scan_time: Instant::now(),
            scanned_at: Utc::now(),
        }
    }
}
