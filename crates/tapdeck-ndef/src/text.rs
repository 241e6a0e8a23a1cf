//! NDEF short Text record encoding and decoding.
//!
//! Tapdeck reads and writes exactly one record shape: a single well-known
//! short Text record inside an NDEF TLV, terminated by `0xFE`:
//!
//! ```text
//! 0x03 <len>            TLV header (0x03 0xFF <hi> <lo> for len >= 255)
//! 0xD1                  record flags: MB | ME | SR | TNF=well-known
//! 0x01                  type length
//! <plen>                payload length
//! 'T'                   record type
//! <status> <lang...>    payload: status byte + language code
//! <utf-8 text>
//! 0xFE                  terminator TLV
//! ```
//!
//! Decoding is deliberately forgiving: a tag with no parseable Text record
//! decodes to the empty string rather than an error, because unwritten and
//! foreign-formatted tags are an everyday occurrence at the reader.

use tapdeck_core::{Error, Result};

/// TLV type for an NDEF message.
const TLV_NDEF: u8 = 0x03;

/// TLV terminator.
const TLV_TERMINATOR: u8 = 0xFE;

/// Record header: MB | ME | SR | TNF=well-known.
const FLAGS_SHORT_TEXT: u8 = 0xD1;

/// Well-known type 'T'.
const TYPE_TEXT: u8 = 0x54;

/// Status-byte flag marking UTF-16 payloads (unsupported).
const STATUS_UTF16: u8 = 0x80;

/// Status-byte mask for the language-code length.
const STATUS_LANG_MASK: u8 = 0x3F;

/// Maximum text bytes in a short record: payload length is one byte and
/// carries the status byte plus the two-byte "en" language code.
pub const MAX_TEXT_LEN: usize = 252;

/// Block alignment for an encoded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// NTAG pages are 4 bytes.
    Page,
    /// Mifare Classic blocks are 16 bytes.
    Block,
}

impl Alignment {
    fn unit(self) -> usize {
        match self {
            Alignment::Page => 4,
            Alignment::Block => 16,
        }
    }
}

/// Decode the text payload from raw tag memory.
///
/// Scans for an NDEF TLV containing a well-known short Text record and
/// returns its UTF-8 payload with the language code stripped. Returns the
/// empty string when no such record exists; a missing NDEF message is an
/// authoring outcome, not an error. UTF-16 records are treated as absent.
///
/// # Examples
///
/// ```
/// use tapdeck_ndef::decode_text;
///
/// let bytes = [
///     0x03, 0x10, 0xD1, 0x01, 0x0C, 0x54, 0x02, 0x65, 0x6E, 0x73, 0x79,
///     0x73, 0x74, 0x65, 0x6D, 0x3A, 0x73, 0x6E, 0x65, 0x73, 0xFE, 0x00,
/// ];
/// assert_eq!(decode_text(&bytes), "system:snes");
///
/// assert_eq!(decode_text(&[0x00; 16]), "");
/// ```
pub fn decode_text(bytes: &[u8]) -> String {
    // Tag memory may hold other data before the NDEF area (Mifare MAD,
    // leftovers from earlier writes), so every 0x03 is a candidate until one
    // parses cleanly.
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx..].iter().position(|&b| b == TLV_NDEF) {
            Some(offset) => {
                let start = idx + offset;
                if let Some(text) = decode_at(bytes, start) {
                    return text;
                }
                idx = start + 1;
            }
            None => break,
        }
    }
    String::new()
}

/// Attempt to parse a Text record at a candidate TLV position.
///
/// Returns `None` on any structural mismatch so the caller can keep
/// scanning.
fn decode_at(bytes: &[u8], tlv_start: usize) -> Option<String> {
    let after_type = &bytes[tlv_start + 1..];
    let (message_len, record) = match *after_type {
        [0xFF, hi, lo, ref rest @ ..] => ((usize::from(hi) << 8) | usize::from(lo), rest),
        [len, ref rest @ ..] if len != 0xFF => (usize::from(len), rest),
        _ => return None,
    };

    if message_len < 4 || record.len() < message_len {
        return None;
    }
    let record = &record[..message_len];

    if record[0] != FLAGS_SHORT_TEXT || record[1] != 0x01 || record[3] != TYPE_TEXT {
        return None;
    }
    let payload_len = usize::from(record[2]);
    if payload_len == 0 || 4 + payload_len > message_len {
        return None;
    }

    let payload = &record[4..4 + payload_len];
    let status = payload[0];
    if status & STATUS_UTF16 != 0 {
        return None;
    }
    let lang_len = usize::from(status & STATUS_LANG_MASK);
    if 1 + lang_len > payload.len() {
        return None;
    }

    String::from_utf8(payload[1 + lang_len..].to_vec()).ok()
}

/// Encode `text` as a complete NDEF message, padded to `alignment`.
///
/// The record always carries the "en" language code and is followed by the
/// `0xFE` terminator before padding.
///
/// # Errors
///
/// Returns [`Error::PayloadTooLarge`] when the text exceeds what a short
/// record can carry ([`MAX_TEXT_LEN`] bytes).
///
/// # Examples
///
/// ```
/// use tapdeck_ndef::{encode_text, Alignment};
///
/// let bytes = encode_text("hello", Alignment::Page).unwrap();
/// assert_eq!(bytes.len() % 4, 0);
/// assert_eq!(bytes[0], 0x03);
/// ```
pub fn encode_text(text: &str, alignment: Alignment) -> Result<Vec<u8>> {
    let text_bytes = text.as_bytes();
    if text_bytes.len() > MAX_TEXT_LEN {
        return Err(Error::PayloadTooLarge {
            len: text_bytes.len(),
            max: MAX_TEXT_LEN,
        });
    }

    // status byte + "en" + text
    let payload_len = 3 + text_bytes.len();
    // record header (flags, type len, payload len, type) + payload
    let message_len = 4 + payload_len;

    let mut out = Vec::with_capacity(message_len + 8);
    out.push(TLV_NDEF);
    if message_len < 0xFF {
        out.push(message_len as u8);
    } else {
        out.push(0xFF);
        out.push((message_len >> 8) as u8);
        out.push((message_len & 0xFF) as u8);
    }
    out.push(FLAGS_SHORT_TEXT);
    out.push(0x01);
    out.push(payload_len as u8);
    out.push(TYPE_TEXT);
    out.push(0x02); // status: UTF-8, 2-byte language code
    out.extend_from_slice(b"en");
    out.extend_from_slice(text_bytes);
    out.push(TLV_TERMINATOR);

    let unit = alignment.unit();
    while out.len() % unit != 0 {
        out.push(0x00);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reference_bytes() {
        // Scenario bytes from a real NTAG dump carrying "system:snes"
        let bytes = [
            0x03, 0x10, 0xD1, 0x01, 0x0C, 0x54, 0x02, 0x65, 0x6E, 0x73, 0x79, 0x73, 0x74, 0x65,
            0x6D, 0x3A, 0x73, 0x6E, 0x65, 0x73, 0xFE, 0x00, 0x00, 0x00,
        ];
        assert_eq!(decode_text(&bytes), "system:snes");
    }

    #[test]
    fn test_roundtrip() {
        for text in ["", "a", "hello", "system:snes", "random:nes", "ünïcodé"] {
            let encoded = encode_text(text, Alignment::Page).unwrap();
            assert_eq!(decode_text(&encoded), text, "roundtrip of {text:?}");
        }
    }

    #[test]
    fn test_alignment_padding() {
        let page = encode_text("hi", Alignment::Page).unwrap();
        assert_eq!(page.len() % 4, 0);

        let block = encode_text("hi", Alignment::Block).unwrap();
        assert_eq!(block.len() % 16, 0);
        assert!(block.len() >= page.len());
    }

    #[test]
    fn test_long_tlv_form() {
        let text = "x".repeat(252);
        let encoded = encode_text(&text, Alignment::Block).unwrap();
        // 4 + (3 + 252) = 259 >= 255 forces the three-byte length form
        assert_eq!(encoded[1], 0xFF);
        assert_eq!(encoded[2], 0x01);
        assert_eq!(encoded[3], 0x03);
        assert_eq!(decode_text(&encoded), text);
    }

    #[test]
    fn test_too_long_rejected() {
        let text = "x".repeat(253);
        assert!(encode_text(&text, Alignment::Page).is_err());
    }

    #[test]
    fn test_empty_memory_decodes_empty() {
        assert_eq!(decode_text(&[]), "");
        assert_eq!(decode_text(&[0x00; 64]), "");
        assert_eq!(decode_text(&[0xFF; 64]), "");
    }

    #[test]
    fn test_utf16_flag_rejected() {
        let mut bytes = encode_text("hello", Alignment::Page).unwrap();
        // Flip the status byte to UTF-16
        bytes[6] |= STATUS_UTF16;
        assert_eq!(decode_text(&bytes), "");
    }

    #[test]
    fn test_truncated_record_decodes_empty() {
        let encoded = encode_text("hello", Alignment::Page).unwrap();
        for cut in 1..8 {
            assert_eq!(decode_text(&encoded[..encoded.len() - cut - 4]), "");
        }
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        // A stray 0x03 ahead of the real message must not derail the scan
        let mut bytes = vec![0x03, 0x00, 0x44, 0x03];
        bytes.extend(encode_text("pico8/celeste.p8", Alignment::Page).unwrap());
        assert_eq!(decode_text(&bytes), "pico8/celeste.p8");
    }

    #[test]
    fn test_non_text_record_ignored() {
        // URI record (type 'U') with the same framing
        let bytes = [
            0x03, 0x08, 0xD1, 0x01, 0x04, 0x55, 0x01, 0x61, 0x2E, 0x62, 0xFE, 0x00,
        ];
        assert_eq!(decode_text(&bytes), "");
    }

    #[test]
    fn test_invalid_utf8_decodes_empty() {
        let mut bytes = encode_text("abcd", Alignment::Page).unwrap();
        // Corrupt a text byte into an invalid UTF-8 sequence
        bytes[10] = 0xC0;
        assert_eq!(decode_text(&bytes), "");
    }
}
