//! Mifare Classic 1K memory layout.
//!
//! A Classic 1K card is 16 sectors of 4 blocks of 16 bytes. The last block
//! of every sector is the sector trailer (keys + access bits) and is never
//! read or written here. Sector 0 additionally holds the manufacturer block
//! and the MAD, so the NDEF message starts in sector 1 (block 4).
//!
//! This module is pure planning: it decides which blocks to visit and which
//! key to try; the actual transactions live in `tapdeck-reader`.

use tapdeck_core::{Error, Result};

/// Bytes per block.
pub const BLOCK_SIZE: usize = 16;

/// Total blocks on a Classic 1K card.
pub const TOTAL_BLOCKS: u8 = 64;

/// Blocks per sector.
pub const SECTOR_BLOCKS: u8 = 4;

/// First block of the NDEF data area (sector 1).
pub const NDEF_START_BLOCK: u8 = 4;

/// Usable NDEF bytes: sectors 1-15, three data blocks each.
pub const DATA_CAPACITY: usize = 15 * 3 * BLOCK_SIZE;

/// Key A candidates tried per sector, in order.
///
/// Factory cards ship with the all-FF transport key; NDEF-formatted cards
/// use the public NFC Forum key for the data sectors.
pub const DEFAULT_KEYS: [[u8; 6]; 2] = [
    [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
    [0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7],
];

/// Check whether a block is a sector trailer (blocks 3, 7, 11, ...).
pub fn is_sector_trailer(block: u8) -> bool {
    block % SECTOR_BLOCKS == SECTOR_BLOCKS - 1
}

/// Sector index of a block.
pub fn sector_of(block: u8) -> u8 {
    block / SECTOR_BLOCKS
}

/// Data blocks from `start` to the end of the card, skipping trailers.
pub fn data_blocks_from(start: u8) -> impl Iterator<Item = u8> {
    (start..TOTAL_BLOCKS).filter(|&b| !is_sector_trailer(b))
}

/// Blocks to write for a payload of `len` bytes, starting at the NDEF area.
///
/// The payload must already be padded to a multiple of [`BLOCK_SIZE`]
/// (see [`crate::encode_text`] with [`crate::Alignment::Block`]).
///
/// # Errors
///
/// Returns [`Error::CapacityExceeded`] if the payload does not fit in the
/// NDEF data area.
pub fn write_plan(len: usize) -> Result<Vec<u8>> {
    if len > DATA_CAPACITY {
        return Err(Error::CapacityExceeded {
            need: len,
            capacity: DATA_CAPACITY,
        });
    }
    let blocks = len.div_ceil(BLOCK_SIZE);
    Ok(data_blocks_from(NDEF_START_BLOCK).take(blocks).collect())
}
