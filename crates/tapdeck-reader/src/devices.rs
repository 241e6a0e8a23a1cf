//! Enum dispatch over reader implementations.
//!
//! [`TagReader`] is used through generics in the tag I/O helpers, but the
//! service needs to hold "whatever reader was opened" in one place. The
//! enum wrapper gives that without trait objects.

use crate::error::ReaderResult;
use crate::mock::MockReader;
use crate::pn532::Pn532Uart;
use crate::traits::{TagReader, TagTarget};

/// Any reader the daemon can drive.
#[derive(Debug)]
pub enum AnyTagReader {
    /// PN532 on a UART.
    Pn532(Pn532Uart),

    /// In-memory mock.
    Mock(MockReader),
}

impl TagReader for AnyTagReader {
    fn poll_once(&mut self) -> ReaderResult<Option<TagTarget>> {
        match self {
            Self::Pn532(r) => r.poll_once(),
            Self::Mock(r) => r.poll_once(),
        }
    }

    fn mifare_auth(&mut self, block: u8, key: &[u8; 6], uid_tail: &[u8; 4]) -> ReaderResult<()> {
        match self {
            Self::Pn532(r) => r.mifare_auth(block, key, uid_tail),
            Self::Mock(r) => r.mifare_auth(block, key, uid_tail),
        }
    }

    fn mifare_read_block(&mut self, block: u8) -> ReaderResult<[u8; 16]> {
        match self {
            Self::Pn532(r) => r.mifare_read_block(block),
            Self::Mock(r) => r.mifare_read_block(block),
        }
    }

    fn mifare_write_block(&mut self, block: u8, data: &[u8; 16]) -> ReaderResult<()> {
        match self {
            Self::Pn532(r) => r.mifare_write_block(block, data),
            Self::Mock(r) => r.mifare_write_block(block, data),
        }
    }

    fn ntag_read_pages(&mut self, page: u8) -> ReaderResult<[u8; 16]> {
        match self {
            Self::Pn532(r) => r.ntag_read_pages(page),
            Self::Mock(r) => r.ntag_read_pages(page),
        }
    }

    fn ntag_write_page(&mut self, page: u8, data: &[u8; 4]) -> ReaderResult<()> {
        match self {
            Self::Pn532(r) => r.ntag_write_page(page, data),
            Self::Mock(r) => r.ntag_write_page(page, data),
        }
    }

    fn connection(&self) -> &str {
        match self {
            Self::Pn532(r) => r.connection(),
            Self::Mock(r) => r.connection(),
        }
    }

    fn close(&mut self) -> ReaderResult<()> {
        match self {
            Self::Pn532(r) => r.close(),
            Self::Mock(r) => r.close(),
        }
    }
}
