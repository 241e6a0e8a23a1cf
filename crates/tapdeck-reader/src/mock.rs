//! Mock reader for testing and development without hardware.
//!
//! [`MockReader`] implements [`TagReader`] against in-memory tag
//! simulations controlled through a [`MockHandle`]. The handle can place
//! and remove tags, pre-script poll outcomes (empty windows, bus failures)
//! and inspect memory after writes. Reader and handle share state, so a
//! "reopened" clone of the reader still sees the same tag, which is
//! exactly what a reconnect against a physical reader would.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tapdeck_core::TagUid;
use tapdeck_ndef::{mifare, ntag};

use crate::error::{ReaderError, ReaderResult};
use crate::traits::{TagReader, TagTarget};

/// A scripted outcome for one `poll_once` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedPoll {
    /// Report the currently placed tag (or an empty window if none).
    Seen,
    /// Report an empty window even if a tag is placed.
    Empty,
    /// Fail with a fatal bus error.
    Fatal,
}

/// Simulated NTAG memory: pages 0-3 (UID area + CC) plus user pages.
#[derive(Debug, Clone)]
struct NtagSim {
    memory: Vec<u8>,
}

impl NtagSim {
    fn new(uid: &TagUid, user: &[u8]) -> Self {
        // NTAG215-sized by default: 4 header pages + 126 user-area pages
        let mut memory = vec![0u8; 4 * ntag::PAGE_SIZE + 504];
        let uid_bytes = uid.as_bytes();
        let n = uid_bytes.len().min(8);
        memory[..n].copy_from_slice(&uid_bytes[..n]);
        // Capability container for a 496-byte user area
        memory[12..16].copy_from_slice(&[0xE1, 0x10, 0x3E, 0x00]);
        let start = 4 * ntag::PAGE_SIZE;
        memory[start..start + user.len()].copy_from_slice(user);
        Self { memory }
    }
}

/// Simulated Mifare Classic 1K memory with sector authentication.
#[derive(Debug, Clone)]
struct MifareSim {
    blocks: Vec<[u8; 16]>,
    keys: Vec<[u8; 6]>,
    authed_sector: Option<u8>,
}

impl MifareSim {
    fn new(data: &[u8], keys: Vec<[u8; 6]>) -> Self {
        let mut blocks = vec![[0u8; 16]; usize::from(mifare::TOTAL_BLOCKS)];
        for (chunk, block) in data
            .chunks(mifare::BLOCK_SIZE)
            .zip(mifare::data_blocks_from(mifare::NDEF_START_BLOCK))
        {
            blocks[usize::from(block)][..chunk.len()].copy_from_slice(chunk);
        }
        Self {
            blocks,
            keys,
            authed_sector: None,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<ScriptedPoll>,
    present: Option<TagTarget>,
    ntag: Option<NtagSim>,
    mifare: Option<MifareSim>,
}

/// Handle for controlling a [`MockReader`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Place an NTAG with the given user-memory bytes on the reader.
    pub fn place_ntag(&self, uid_bytes: Vec<u8>, user: &[u8]) {
        let uid = TagUid::new(uid_bytes).expect("valid test UID");
        let mut state = self.state.lock().unwrap();
        state.ntag = Some(NtagSim::new(&uid, user));
        state.mifare = None;
        state.present = Some(TagTarget {
            uid,
            sak: 0x00,
            atqa: 0x0044,
        });
    }

    /// Place a factory-blank NTAG (no capability container).
    pub fn place_blank_ntag(&self, uid_bytes: Vec<u8>) {
        self.place_ntag(uid_bytes, &[]);
        let mut state = self.state.lock().unwrap();
        if let Some(sim) = state.ntag.as_mut() {
            sim.memory[12..16].copy_from_slice(&[0x00; 4]);
        }
    }

    /// Place a Mifare Classic 1K with the given NDEF-area bytes, readable
    /// with the default keys.
    pub fn place_mifare(&self, uid_bytes: Vec<u8>, data: &[u8]) {
        self.place_mifare_with_keys(uid_bytes, data, mifare::DEFAULT_KEYS.to_vec());
    }

    /// Place a Mifare card that only answers to the given keys.
    pub fn place_mifare_with_keys(&self, uid_bytes: Vec<u8>, data: &[u8], keys: Vec<[u8; 6]>) {
        let uid = TagUid::new(uid_bytes).expect("valid test UID");
        let mut state = self.state.lock().unwrap();
        state.mifare = Some(MifareSim::new(data, keys));
        state.ntag = None;
        state.present = Some(TagTarget {
            uid,
            sak: 0x08,
            atqa: 0x0004,
        });
    }

    /// Place a tag with an unrecognized SAK/ATQA combination.
    pub fn place_unknown(&self, uid_bytes: Vec<u8>) {
        let uid = TagUid::new(uid_bytes).expect("valid test UID");
        let mut state = self.state.lock().unwrap();
        state.ntag = None;
        state.mifare = None;
        state.present = Some(TagTarget {
            uid,
            sak: 0x20,
            atqa: 0x0344,
        });
    }

    /// Remove the current tag from the field.
    pub fn remove(&self) {
        self.state.lock().unwrap().present = None;
    }

    /// Queue poll outcomes consumed before steady-state behavior resumes.
    pub fn script(&self, polls: impl IntoIterator<Item = ScriptedPoll>) {
        self.state.lock().unwrap().script.extend(polls);
    }

    /// Snapshot of the simulated NTAG user memory.
    pub fn ntag_user_memory(&self) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        state
            .ntag
            .as_ref()
            .map(|sim| sim.memory[4 * ntag::PAGE_SIZE..].to_vec())
            .unwrap_or_default()
    }
}

/// In-memory [`TagReader`] implementation.
#[derive(Debug, Clone)]
pub struct MockReader {
    state: Arc<Mutex<MockState>>,
}

impl MockReader {
    /// Create a reader/handle pair.
    pub fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockHandle { state },
        )
    }
}

impl TagReader for MockReader {
    fn poll_once(&mut self) -> ReaderResult<Option<TagTarget>> {
        let mut state = self.state.lock().unwrap();
        match state.script.pop_front() {
            Some(ScriptedPoll::Empty) => Ok(None),
            Some(ScriptedPoll::Fatal) => Err(ReaderError::fatal("simulated bus loss")),
            Some(ScriptedPoll::Seen) | None => Ok(state.present.clone()),
        }
    }

    fn mifare_auth(&mut self, block: u8, key: &[u8; 6], _uid_tail: &[u8; 4]) -> ReaderResult<()> {
        let mut state = self.state.lock().unwrap();
        let sim = state
            .mifare
            .as_mut()
            .ok_or_else(|| ReaderError::unsupported("no mifare tag in field"))?;
        if sim.keys.contains(key) {
            sim.authed_sector = Some(mifare::sector_of(block));
            Ok(())
        } else {
            sim.authed_sector = None;
            Err(ReaderError::AuthFailed { block })
        }
    }

    fn mifare_read_block(&mut self, block: u8) -> ReaderResult<[u8; 16]> {
        let state = self.state.lock().unwrap();
        let sim = state
            .mifare
            .as_ref()
            .ok_or_else(|| ReaderError::unsupported("no mifare tag in field"))?;
        if sim.authed_sector != Some(mifare::sector_of(block)) {
            return Err(ReaderError::Status { code: 0x14 });
        }
        Ok(sim.blocks[usize::from(block)])
    }

    fn mifare_write_block(&mut self, block: u8, data: &[u8; 16]) -> ReaderResult<()> {
        let mut state = self.state.lock().unwrap();
        let sim = state
            .mifare
            .as_mut()
            .ok_or_else(|| ReaderError::unsupported("no mifare tag in field"))?;
        if sim.authed_sector != Some(mifare::sector_of(block)) {
            return Err(ReaderError::Status { code: 0x14 });
        }
        sim.blocks[usize::from(block)] = *data;
        Ok(())
    }

    fn ntag_read_pages(&mut self, page: u8) -> ReaderResult<[u8; 16]> {
        let state = self.state.lock().unwrap();
        let sim = state
            .ntag
            .as_ref()
            .ok_or_else(|| ReaderError::unsupported("no ntag in field"))?;
        let start = usize::from(page) * ntag::PAGE_SIZE;
        let mut out = [0u8; 16];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = sim.memory.get(start + i).copied().unwrap_or(0);
        }
        Ok(out)
    }

    fn ntag_write_page(&mut self, page: u8, data: &[u8; 4]) -> ReaderResult<()> {
        let mut state = self.state.lock().unwrap();
        let sim = state
            .ntag
            .as_mut()
            .ok_or_else(|| ReaderError::unsupported("no ntag in field"))?;
        let start = usize::from(page) * ntag::PAGE_SIZE;
        if start + ntag::PAGE_SIZE > sim.memory.len() {
            return Err(ReaderError::Status { code: 0x01 });
        }
        sim.memory[start..start + ntag::PAGE_SIZE].copy_from_slice(data);
        Ok(())
    }

    fn connection(&self) -> &str {
        "mock:"
    }

    fn close(&mut self) -> ReaderResult<()> {
        Ok(())
    }
}
