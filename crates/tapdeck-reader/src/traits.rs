//! Reader device abstraction.
//!
//! [`TagReader`] is the seam between the service and the physical reader.
//! The trait is synchronous on purpose: the underlying transport is a
//! blocking serial port and the poll loop owns the device exclusively on a
//! blocking task. Dynamic dispatch goes through the
//! [`AnyTagReader`](crate::devices::AnyTagReader) enum rather than trait
//! objects.

use tapdeck_core::{CardType, TagUid};

use crate::error::ReaderResult;

/// A target reported by one polling window.
///
/// Carries the raw selection bytes so card-family detection stays a pure
/// function of what the RF layer actually said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTarget {
    /// Anticollision UID.
    pub uid: TagUid,

    /// SEL_RES byte from selection.
    pub sak: u8,

    /// SENS_RES bytes from selection, MSB first.
    pub atqa: u16,
}

impl TagTarget {
    /// Detect the card family for this target.
    pub fn card_type(&self) -> CardType {
        CardType::from_sak_atqa(self.sak, self.atqa)
    }
}

/// A PN532-class contactless reader.
///
/// One polling window (`poll_once`) covers `TIMES_TO_POLL` attempts spaced
/// `PERIOD_BETWEEN_POLLS` apart, matching the device-side auto-poll
/// command; an empty window is `Ok(None)`, never an error.
///
/// Mifare transactions require a sector authentication before the first
/// block access in that sector; NTAG pages need no authentication.
pub trait TagReader: Send {
    /// Poll for a target, blocking for up to the full polling window.
    fn poll_once(&mut self) -> ReaderResult<Option<TagTarget>>;

    /// Authenticate the sector containing `block` with key A.
    fn mifare_auth(&mut self, block: u8, key: &[u8; 6], uid_tail: &[u8; 4]) -> ReaderResult<()>;

    /// Read one 16-byte Mifare block.
    fn mifare_read_block(&mut self, block: u8) -> ReaderResult<[u8; 16]>;

    /// Write one 16-byte Mifare block.
    fn mifare_write_block(&mut self, block: u8, data: &[u8; 16]) -> ReaderResult<()>;

    /// Read four NTAG pages (16 bytes) starting at `page`.
    fn ntag_read_pages(&mut self, page: u8) -> ReaderResult<[u8; 16]>;

    /// Write one 4-byte NTAG page.
    fn ntag_write_page(&mut self, page: u8, data: &[u8; 4]) -> ReaderResult<()>;

    /// The connection string this reader was opened with.
    fn connection(&self) -> &str;

    /// Release the target and close the device.
    fn close(&mut self) -> ReaderResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_card_type() {
        let target = TagTarget {
            uid: TagUid::new(vec![0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0x80]).unwrap(),
            sak: 0x00,
            atqa: 0x0044,
        };
        assert_eq!(target.card_type(), CardType::Ntag);

        let target = TagTarget {
            uid: TagUid::new(vec![0xDE, 0xAD, 0xBE, 0xEF]).unwrap(),
            sak: 0x08,
            atqa: 0x0004,
        };
        assert_eq!(target.card_type(), CardType::MifareClassic1k);
    }
}
