//! Shared service state.
//!
//! One coarse lock guards everything the threads share: the active and
//! last-scanned cards, the launcher kill-switch and the current mappings
//! snapshot. Accessors hand out owned copies (cards) or `Arc` clones
//! (snapshots); no reference to the guarded data escapes the lock, and no
//! I/O happens while it is held; the sentinel file is touched only after
//! the guard drops.
//!
//! The stop flag is a [`CancellationToken`] so the async tasks can `await`
//! it while the blocking poll loop just checks it per tick.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use tapdeck_core::Card;
use tapdeck_db::MappingsSnapshot;

struct StateInner {
    active_card: Option<Card>,
    last_scanned: Option<Card>,
    launcher_disabled: bool,
    db: Arc<MappingsSnapshot>,
    db_load_time: Instant,
}

/// Thread-shared service state.
pub struct ServiceState {
    inner: Mutex<StateInner>,
    stop: CancellationToken,
    sentinel_path: PathBuf,
}

impl ServiceState {
    /// Create the state, seeding the launcher flag from the sentinel file.
    ///
    /// On startup the on-disk sentinel is the source of truth; from then on
    /// memory leads and the file mirrors it.
    pub fn new(sentinel_path: PathBuf) -> Arc<Self> {
        let launcher_disabled = sentinel_path.exists();
        if launcher_disabled {
            info!("sentinel present, launcher starts disabled");
        }
        Arc::new(Self {
            inner: Mutex::new(StateInner {
                active_card: None,
                last_scanned: None,
                launcher_disabled,
                db: Arc::new(MappingsSnapshot::empty()),
                db_load_time: Instant::now(),
            }),
            stop: CancellationToken::new(),
            sentinel_path,
        })
    }

    /// Set (or clear) the active card. A set also records it as the last
    /// scanned card.
    pub fn set_active_card(&self, card: Option<Card>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(card) = &card {
            inner.last_scanned = Some(card.clone());
        }
        inner.active_card = card;
    }

    pub fn active_card(&self) -> Option<Card> {
        self.inner.lock().unwrap().active_card.clone()
    }

    pub fn last_scanned(&self) -> Option<Card> {
        self.inner.lock().unwrap().last_scanned.clone()
    }

    /// Request shutdown of every service thread.
    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    pub fn should_stop(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Token the async tasks select on.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Disable launching and mirror the decision to disk.
    ///
    /// A failure to create the sentinel is logged; the in-memory flag has
    /// already changed and stays changed.
    pub fn disable_launcher(&self) {
        self.inner.lock().unwrap().launcher_disabled = true;
        if let Err(e) = std::fs::File::create(&self.sentinel_path) {
            error!(error = %e, path = %self.sentinel_path.display(), "creating sentinel failed");
        }
    }

    /// Re-enable launching and remove the on-disk sentinel.
    pub fn enable_launcher(&self) {
        self.inner.lock().unwrap().launcher_disabled = false;
        if let Err(e) = std::fs::remove_file(&self.sentinel_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!(error = %e, path = %self.sentinel_path.display(), "removing sentinel failed");
            }
        }
    }

    pub fn launcher_disabled(&self) -> bool {
        self.inner.lock().unwrap().launcher_disabled
    }

    /// Publish a new mappings snapshot.
    ///
    /// Readers holding the previous `Arc` keep a complete old snapshot;
    /// nobody ever observes a half-loaded database.
    pub fn set_db(&self, snapshot: MappingsSnapshot) {
        let mut inner = self.inner.lock().unwrap();
        inner.db = Arc::new(snapshot);
        inner.db_load_time = Instant::now();
    }

    pub fn db(&self) -> Arc<MappingsSnapshot> {
        Arc::clone(&self.inner.lock().unwrap().db)
    }

    pub fn db_load_time(&self) -> Instant {
        self.inner.lock().unwrap().db_load_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tapdeck_core::{CardType, TagUid};

    fn test_state() -> (tempfile::TempDir, Arc<ServiceState>) {
        let dir = tempfile::tempdir().unwrap();
        let state = ServiceState::new(dir.path().join("launcher.disabled"));
        (dir, state)
    }

    fn card(uid: &[u8], text: &str) -> Card {
        Card::new(
            CardType::Ntag,
            TagUid::new(uid.to_vec()).unwrap(),
            text.to_string(),
        )
    }

    #[test]
    fn test_active_card_updates_last_scanned() {
        let (_dir, state) = test_state();
        assert!(state.active_card().is_none());
        assert!(state.last_scanned().is_none());

        state.set_active_card(Some(card(&[0xDE, 0xAD, 0xBE, 0xEF], "system:snes")));
        assert_eq!(state.active_card().unwrap().uid.as_hex(), "deadbeef");
        assert_eq!(state.last_scanned().unwrap().uid.as_hex(), "deadbeef");

        // Clearing the active card keeps the last scan
        state.set_active_card(None);
        assert!(state.active_card().is_none());
        assert_eq!(state.last_scanned().unwrap().uid.as_hex(), "deadbeef");
    }

    #[test]
    fn test_sentinel_file_mirrors_flag() {
        let (dir, state) = test_state();
        let sentinel = dir.path().join("launcher.disabled");

        assert!(!state.launcher_disabled());
        state.disable_launcher();
        assert!(state.launcher_disabled());
        assert!(sentinel.exists());

        state.enable_launcher();
        assert!(!state.launcher_disabled());
        assert!(!sentinel.exists());
    }

    #[test]
    fn test_sentinel_seeds_startup_flag() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = dir.path().join("launcher.disabled");
        std::fs::File::create(&sentinel).unwrap();

        let state = ServiceState::new(sentinel);
        assert!(state.launcher_disabled());
    }

    #[test]
    fn test_stop_flag() {
        let (_dir, state) = test_state();
        assert!(!state.should_stop());
        state.request_stop();
        assert!(state.should_stop());
        assert!(state.stop_token().is_cancelled());
    }

    /// A published snapshot is always observed whole: concurrent readers
    /// see either the previous snapshot or the new one, never a mix.
    #[test]
    fn test_snapshot_swap_is_atomic() {
        let (_dir, state) = test_state();

        let mut small = tempfile::NamedTempFile::new().unwrap();
        write!(small, "deadbeef,a\n").unwrap();
        let small = tapdeck_db::load_mappings(small.path()).unwrap();

        let mut large = tempfile::NamedTempFile::new().unwrap();
        for i in 0..64 {
            writeln!(large, "key {i},command {i}").unwrap();
        }
        let large = tapdeck_db::load_mappings(large.path()).unwrap();

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let state = Arc::clone(&state);
                let stop = Arc::clone(&stop);
                std::thread::spawn(move || {
                    while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                        let db = state.db();
                        assert!(db.len() == 0 || db.len() == 1 || db.len() == 64);
                    }
                })
            })
            .collect();

        for _ in 0..500 {
            state.set_db(small.clone());
            state.set_db(large.clone());
        }

        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_db_load_time_advances() {
        let (_dir, state) = test_state();
        let before = state.db_load_time();
        std::thread::sleep(std::time::Duration::from_millis(5));
        state.set_db(MappingsSnapshot::empty());
        assert!(state.db_load_time() > before);
    }
}
