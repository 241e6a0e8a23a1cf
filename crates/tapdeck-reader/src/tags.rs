//! High-level tag reading and writing.
//!
//! These routines combine the [`TagReader`] primitives with the memory
//! plans from `tapdeck-ndef`: sector-at-a-time authentication and trailer
//! skipping for Mifare, capability-container-driven page ranges for NTAG.
//! They are generic over the reader so the mock exercises the exact code
//! the PN532 runs.

use tracing::{debug, warn};

use tapdeck_core::CardType;
use tapdeck_ndef::{encode_text, mifare, ntag, Alignment};

use crate::error::{ReaderError, ReaderResult};
use crate::traits::{TagReader, TagTarget};

/// NDEF terminator, used as the early-stop marker while reading.
const TRAILER: u8 = 0xFE;

/// Read the raw NDEF area of a tag.
///
/// Returns the bytes read so far up to (and including) the chunk holding
/// the NDEF trailer. A tag without a valid capability container reads as
/// empty rather than failing: an unformatted tag is still an arrival.
///
/// # Errors
///
/// Propagates transport failures, and [`ReaderError::Unsupported`] for an
/// unknown card family.
pub fn read_tag<R: TagReader>(reader: &mut R, target: &TagTarget) -> ReaderResult<Vec<u8>> {
    match target.card_type() {
        CardType::Ntag => read_ntag(reader),
        CardType::MifareClassic1k => read_mifare(reader, target),
        CardType::Unknown => Err(ReaderError::unsupported(format!(
            "cannot read card with SAK 0x{:02x} ATQA 0x{:04x}",
            target.sak, target.atqa
        ))),
    }
}

/// Write `text` to the tag as an NDEF Text record.
///
/// Returns the bytes written, padding included.
///
/// # Errors
///
/// Returns [`ReaderError::AuthFailed`] (with the NDEF-format hint) when a
/// Mifare sector rejects every candidate key, [`ReaderError::Layout`] when
/// the message does not fit the card, and transport errors as they occur.
pub fn write_tag<R: TagReader>(
    reader: &mut R,
    target: &TagTarget,
    text: &str,
) -> ReaderResult<Vec<u8>> {
    match target.card_type() {
        CardType::Ntag => write_ntag(reader, text),
        CardType::MifareClassic1k => write_mifare(reader, target, text),
        CardType::Unknown => Err(ReaderError::unsupported(format!(
            "cannot write card with SAK 0x{:02x} ATQA 0x{:04x}",
            target.sak, target.atqa
        ))),
    }
}

/// Authenticate the sector containing `block`, trying each default key.
fn auth_sector<R: TagReader>(reader: &mut R, block: u8, uid_tail: &[u8; 4]) -> ReaderResult<()> {
    let mut last = ReaderError::AuthFailed { block };
    for key in &mifare::DEFAULT_KEYS {
        match reader.mifare_auth(block, key, uid_tail) {
            Ok(()) => return Ok(()),
            Err(e @ ReaderError::AuthFailed { .. }) => last = e,
            Err(e) => return Err(e),
        }
    }
    Err(last)
}

fn read_mifare<R: TagReader>(reader: &mut R, target: &TagTarget) -> ReaderResult<Vec<u8>> {
    let uid_tail = target.uid.auth_tail();
    let mut data = Vec::with_capacity(mifare::DATA_CAPACITY);
    let mut authed: Option<u8> = None;

    for block in mifare::data_blocks_from(0) {
        let sector = mifare::sector_of(block);
        if authed != Some(sector) {
            auth_sector(reader, block, &uid_tail)?;
            authed = Some(sector);
        }
        let chunk = reader.mifare_read_block(block)?;
        data.extend_from_slice(&chunk);
        if chunk.contains(&TRAILER) {
            break;
        }
    }

    debug!(bytes = data.len(), "mifare read complete");
    Ok(data)
}

fn write_mifare<R: TagReader>(
    reader: &mut R,
    target: &TagTarget,
    text: &str,
) -> ReaderResult<Vec<u8>> {
    let payload = encode_text(text, Alignment::Block)?;
    let blocks = mifare::write_plan(payload.len())?;
    let uid_tail = target.uid.auth_tail();
    let mut authed: Option<u8> = None;

    for (chunk, &block) in payload.chunks(mifare::BLOCK_SIZE).zip(blocks.iter()) {
        let sector = mifare::sector_of(block);
        if authed != Some(sector) {
            auth_sector(reader, block, &uid_tail)?;
            authed = Some(sector);
        }
        let mut buf = [0u8; mifare::BLOCK_SIZE];
        buf[..chunk.len()].copy_from_slice(chunk);
        reader.mifare_write_block(block, &buf)?;
    }

    debug!(bytes = payload.len(), blocks = blocks.len(), "mifare write complete");
    Ok(payload)
}

fn read_ntag<R: TagReader>(reader: &mut R) -> ReaderResult<Vec<u8>> {
    let header = reader.ntag_read_pages(0)?;
    let capability = match ntag::Capability::parse(&header[12..16]) {
        Ok(capability) => capability,
        Err(e) => {
            // Factory-blank tag: nothing to read, but still a tag
            warn!(error = %e, "unreadable capability container, treating tag as empty");
            return Ok(Vec::new());
        }
    };
    if let Some(model) = capability.model_name() {
        debug!(model, "capability container parsed");
    }

    let mut data = Vec::with_capacity(capability.user_bytes);
    let mut page = ntag::USER_START_PAGE;
    while page <= capability.last_user_page() {
        let chunk = reader.ntag_read_pages(page)?;
        data.extend_from_slice(&chunk);
        if chunk.contains(&TRAILER) {
            break;
        }
        page += ntag::READ_BATCH_PAGES;
    }
    data.truncate(capability.user_bytes);

    debug!(bytes = data.len(), "ntag read complete");
    Ok(data)
}

fn write_ntag<R: TagReader>(reader: &mut R, text: &str) -> ReaderResult<Vec<u8>> {
    let header = reader.ntag_read_pages(0)?;
    let capability = ntag::Capability::parse(&header[12..16])?;

    let payload = encode_text(text, Alignment::Page)?;
    let pages = ntag::write_plan(payload.len(), capability)?;

    for (chunk, page) in payload.chunks(ntag::PAGE_SIZE).zip(pages) {
        let mut buf = [0u8; ntag::PAGE_SIZE];
        buf[..chunk.len()].copy_from_slice(chunk);
        reader.ntag_write_page(page, &buf)?;
    }

    debug!(bytes = payload.len(), "ntag write complete");
    Ok(payload)
}
