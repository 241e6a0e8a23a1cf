//! PN532 host-link frame codec.
//!
//! Frames on the UART link look like:
//!
//! ```text
//! 00 00 FF LEN LCS TFI PD0 .. PDn DCS 00
//! ```
//!
//! where `LEN` counts `TFI` plus the data bytes, `LEN + LCS == 0 (mod 256)`
//! and `TFI + PD0 + .. + PDn + DCS == 0 (mod 256)`. The ACK frame is the
//! degenerate `00 00 FF 00 FF 00`. Extended frames (`FF FF` length escape)
//! are accepted on receive.
//!
//! [`FrameParser`] accumulates serial bytes and extracts events; building
//! outgoing frames is a pure function. Checksums are verified on extract and
//! a mismatch is a protocol error, not a crash.

use bytes::{Buf, BytesMut};

use crate::error::{ReaderError, ReaderResult};

/// TFI for host-to-device frames.
pub const TFI_HOST: u8 = 0xD4;

/// TFI for device-to-host frames.
pub const TFI_DEVICE: u8 = 0xD5;

/// The fixed ACK frame.
pub const ACK_FRAME: [u8; 6] = [0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00];

/// Wakeup preamble for a PN532 on a UART (long high period then idle).
pub const WAKEUP: [u8; 16] = [
    0x55, 0x55, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// An event extracted from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// Command acknowledged; the response follows later.
    Ack,

    /// A response frame; payload excludes the TFI.
    Response(Vec<u8>),
}

/// Build a host-to-device frame around `data` (command byte plus params).
pub fn build_frame(data: &[u8]) -> Vec<u8> {
    debug_assert!(data.len() < 0xFF, "extended frames are never sent");

    let len = (data.len() + 1) as u8; // TFI + data
    let mut out = Vec::with_capacity(data.len() + 8);
    out.extend_from_slice(&[0x00, 0x00, 0xFF]);
    out.push(len);
    out.push(len.wrapping_neg());
    out.push(TFI_HOST);
    out.extend_from_slice(data);
    let sum = data
        .iter()
        .fold(TFI_HOST, |acc: u8, &b| acc.wrapping_add(b));
    out.push(sum.wrapping_neg());
    out.push(0x00);
    out
}

/// Incremental parser for device-to-host frames.
///
/// Bytes between frames (postamble, line noise after wakeup) are skipped
/// while hunting for the `00 FF` start code.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: BytesMut,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Feed received bytes into the parser.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Drop any buffered bytes (used after wakeup and between commands).
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Try to extract the next complete event.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Protocol`] on a length or data checksum
    /// mismatch; the offending frame is consumed so parsing can resume.
    pub fn try_next(&mut self) -> ReaderResult<Option<FrameEvent>> {
        loop {
            let Some(start) = find_start(&self.buf) else {
                // Keep at most one trailing byte: it may be the 0x00 of a
                // start code split across reads.
                if self.buf.len() > 1 {
                    let keep = self.buf.len() - 1;
                    self.buf.advance(keep);
                }
                return Ok(None);
            };

            // Drop everything before the start code
            self.buf.advance(start);

            // 00 FF LEN LCS is the minimum to classify
            if self.buf.len() < 4 {
                return Ok(None);
            }

            let len = self.buf[2];
            let lcs = self.buf[3];

            // ACK: zero-length frame
            if len == 0x00 && lcs == 0xFF {
                self.buf.advance(4);
                return Ok(Some(FrameEvent::Ack));
            }

            // Extended frame: 00 FF FF FF LENM LENL LCS TFI ...
            if len == 0xFF && lcs == 0xFF {
                if self.buf.len() < 7 {
                    return Ok(None);
                }
                let data_len = (usize::from(self.buf[4]) << 8) | usize::from(self.buf[5]);
                let lcs2 = self.buf[6];
                if self.buf[4]
                    .wrapping_add(self.buf[5])
                    .wrapping_add(lcs2)
                    != 0
                {
                    self.buf.advance(4);
                    return Err(ReaderError::protocol("extended length checksum mismatch"));
                }
                return self.extract_data(7, data_len);
            }

            // Normal frame
            if len.wrapping_add(lcs) != 0 {
                // Not a real frame start; skip the 0x00 and rescan
                self.buf.advance(1);
                continue;
            }
            return self.extract_data(4, usize::from(len));
        }
    }

    /// Extract `data_len` bytes of TFI+data plus DCS starting at `offset`.
    fn extract_data(&mut self, offset: usize, data_len: usize) -> ReaderResult<Option<FrameEvent>> {
        if data_len == 0 {
            self.buf.advance(offset);
            return Err(ReaderError::protocol("empty information frame"));
        }
        // data + DCS must be buffered
        if self.buf.len() < offset + data_len + 1 {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buf[offset..offset + data_len].to_vec();
        let dcs = self.buf[offset + data_len];
        self.buf.advance(offset + data_len + 1);

        let sum = frame.iter().fold(dcs, |acc: u8, &b| acc.wrapping_add(b));
        if sum != 0 {
            return Err(ReaderError::protocol("data checksum mismatch"));
        }
        if frame[0] != TFI_DEVICE {
            return Err(ReaderError::protocol(format!(
                "unexpected TFI 0x{:02x}",
                frame[0]
            )));
        }

        Ok(Some(FrameEvent::Response(frame[1..].to_vec())))
    }
}

/// Find the `00 FF` start code.
fn find_start(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == [0x00, 0xFF])
}
