//! The poll loop: tapdeck's central state machine.
//!
//! One tick every 300 ms, three states:
//!
//! - `Idle`: nothing in the field. A target starts the arrival pipeline.
//! - `Present`: a tag is (or was moments ago) in the field. The same UID
//!   re-seen is a no-op; empty windows are tolerated until the tag has not
//!   been seen for the forget timeout, then the card is cleared with no
//!   launch effect.
//! - `Reconnecting`: the bus died. Reopen with a capped backoff ladder and
//!   carry on; the loop never exits over a lost reader.
//!
//! On a new arrival, state is updated *before* any external effect, then:
//! success sound, last-scan file, command resolution (UID mapping, text
//! mapping, finally the raw tag text) and dispatch. Dispatch failures play
//! the rate-limited fail sound and leave the state machine where it was.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use tapdeck_core::constants::{
    FAIL_SOUND_COOLDOWN, PERIOD_BETWEEN_LOOPS, PERIOD_BETWEEN_POLLS, RECONNECT_BACKOFF,
    TIMES_TO_POLL, TIME_TO_FORGET_CARD,
};
use tapdeck_core::Card;
use tapdeck_launcher::{dispatch, GameHost, GameLibrary};
use tapdeck_ndef::decode_text;
use tapdeck_reader::{tags, AnyTagReader, ReaderResult, TagReader, TagTarget};

use crate::sound::Sound;
use crate::state::ServiceState;

/// Factory the loop uses to (re)open the reader.
pub type ReaderFactory = Box<dyn FnMut() -> ReaderResult<AnyTagReader> + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopState {
    Idle,
    Present { uid: String },
    Reconnecting { attempt: u32 },
}

/// Owns the reader and runs the tick loop on a blocking thread.
pub struct PollRunner {
    state: Arc<ServiceState>,
    reader: Option<AnyTagReader>,
    open_reader: ReaderFactory,
    host: Box<dyn GameHost>,
    library: GameLibrary,
    sound: Arc<dyn Sound>,
    last_scan_path: PathBuf,
    loop_state: LoopState,
    last_fail_sound: Option<Instant>,
    forget_after: Duration,
    loop_delay: Duration,
}

impl PollRunner {
    pub fn new(
        state: Arc<ServiceState>,
        open_reader: ReaderFactory,
        host: Box<dyn GameHost>,
        library: GameLibrary,
        sound: Arc<dyn Sound>,
        last_scan_path: PathBuf,
    ) -> Self {
        Self {
            state,
            reader: None,
            open_reader,
            host,
            library,
            sound,
            last_scan_path,
            loop_state: LoopState::Reconnecting { attempt: 0 },
            last_fail_sound: None,
            forget_after: TIME_TO_FORGET_CARD,
            loop_delay: PERIOD_BETWEEN_LOOPS,
        }
    }

    /// Override the forget timeout (tests compress the 5 s default).
    pub fn with_forget_timeout(mut self, forget_after: Duration) -> Self {
        self.forget_after = forget_after;
        self
    }

    /// Override the delay between ticks.
    pub fn with_loop_delay(mut self, loop_delay: Duration) -> Self {
        self.loop_delay = loop_delay;
        self
    }

    /// Run until the stop flag is raised. Consumes the runner; the reader
    /// is closed on the way out.
    pub fn run(mut self) {
        info!(
            times = TIMES_TO_POLL,
            period_ms = PERIOD_BETWEEN_POLLS.as_millis() as u64,
            "poll loop started"
        );

        while !self.state.should_stop() {
            self.tick();
            if !matches!(self.loop_state, LoopState::Reconnecting { .. }) {
                self.sleep_observing_stop(self.loop_delay);
            }
        }

        if let Some(mut reader) = self.reader.take() {
            if let Err(e) = reader.close() {
                warn!(error = %e, "error closing reader");
            }
        }
        info!("poll loop stopped");
    }

    /// One state-machine transition.
    fn tick(&mut self) {
        match self.loop_state {
            LoopState::Reconnecting { attempt } => self.tick_reconnect(attempt),
            _ => self.tick_poll(),
        }
    }

    fn tick_poll(&mut self) {
        let Some(reader) = self.reader.as_mut() else {
            self.loop_state = LoopState::Reconnecting { attempt: 0 };
            return;
        };

        match reader.poll_once() {
            Ok(Some(target)) => self.on_target(target),
            Ok(None) => self.on_empty_window(),
            Err(e) if e.is_fatal() => self.on_fatal(&e),
            Err(e) => {
                warn!(error = %e, "error during poll");
                self.play_fail();
            }
        }
    }

    /// The bus is gone: drop the reader and start the backoff ladder.
    fn on_fatal(&mut self, error: &tapdeck_reader::ReaderError) {
        error!(error = %error, "fatal IO error, reader lost");
        self.play_fail();
        if let Some(mut reader) = self.reader.take() {
            let _ = reader.close();
        }
        self.loop_state = LoopState::Reconnecting { attempt: 0 };
    }

    /// Nothing in the field this window.
    fn on_empty_window(&mut self) {
        if !matches!(self.loop_state, LoopState::Present { .. }) {
            return;
        }
        let expired = self
            .state
            .active_card()
            .map(|card| card.scan_time.elapsed() > self.forget_after)
            .unwrap_or(true);
        if expired {
            info!("card removed");
            self.state.set_active_card(None);
            self.loop_state = LoopState::Idle;
        }
    }

    /// A target was seen; decide whether it is a new arrival.
    fn on_target(&mut self, target: TagTarget) {
        let uid = target.uid.as_hex();
        if let LoopState::Present { uid: active } = &self.loop_state {
            if *active == uid {
                return;
            }
        }

        info!(%uid, "card UID");
        let card_type = target.card_type();
        let record = self.read_record(&target);
        let Some(record) = record else {
            // Fatal mid-read; reconnect path already entered
            return;
        };

        let text = decode_text(&record);
        if text.is_empty() {
            warn!("no text NDEF found");
        } else {
            info!(%text, "decoded text NDEF");
        }

        let card = Card::new(card_type, target.uid.clone(), text);

        // State first, effects after
        self.state.set_active_card(Some(card.clone()));
        self.loop_state = LoopState::Present { uid: uid.clone() };

        if self.state.launcher_disabled() {
            info!("launcher disabled, skipping");
            return;
        }

        self.sound.success();

        if let Err(e) = self.write_scan_result(&card) {
            warn!(error = %e, "error writing last-scan file");
        }

        let db = self.state.db();
        let command = db
            .resolve(&uid, &card.text)
            .map(str::to_string)
            .unwrap_or_else(|| card.text.clone());

        match dispatch(&command, self.host.as_ref(), &self.library) {
            Ok(()) => debug!(%command, "dispatched"),
            Err(e) => {
                error!(error = %e, %command, "error launching card");
                self.play_fail();
            }
        }
    }

    /// Read the tag's NDEF area; `None` means a fatal error was handled.
    fn read_record(&mut self, target: &TagTarget) -> Option<Vec<u8>> {
        if !target.card_type().is_supported() {
            warn!(
                sak = target.sak,
                atqa = target.atqa,
                "unsupported card type, treating as empty"
            );
            return Some(Vec::new());
        }

        info!(card_type = %target.card_type(), "card detected");
        let Some(reader) = self.reader.as_mut() else {
            return Some(Vec::new());
        };
        match tags::read_tag(reader, target) {
            Ok(record) => {
                debug!(record = %hex_preview(&record), "record bytes");
                Some(record)
            }
            Err(e) if e.is_fatal() => {
                self.on_fatal(&e);
                None
            }
            Err(e) => {
                // Unreadable memory is still an arrival, just an empty one
                error!(error = %e, "error reading tag");
                Some(Vec::new())
            }
        }
    }

    fn tick_reconnect(&mut self, attempt: u32) {
        if attempt > 0 {
            let step = usize::min(attempt as usize - 1, RECONNECT_BACKOFF.len() - 1);
            self.sleep_observing_stop(RECONNECT_BACKOFF[step]);
            if self.state.should_stop() {
                return;
            }
        }

        match (self.open_reader)() {
            Ok(reader) => {
                info!(connection = reader.connection(), "reader connected");
                self.reader = Some(reader);
                self.loop_state = match self.state.active_card() {
                    Some(card) => LoopState::Present {
                        uid: card.uid.as_hex(),
                    },
                    None => LoopState::Idle,
                };
            }
            Err(e) => {
                warn!(attempt, error = %e, "reconnect failed");
                self.loop_state = LoopState::Reconnecting {
                    attempt: attempt.saturating_add(1),
                };
            }
        }
    }

    /// Persist `<uid>,<text>` for external status consumers.
    fn write_scan_result(&self, card: &Card) -> std::io::Result<()> {
        std::fs::write(
            &self.last_scan_path,
            format!("{},{}", card.uid.as_hex(), card.text),
        )
    }

    /// Fail sound, suppressed within the cooldown. The timestamp is loop
    /// local; no lock involved.
    fn play_fail(&mut self) {
        let now = Instant::now();
        let suppressed = self
            .last_fail_sound
            .is_some_and(|last| now.duration_since(last) < FAIL_SOUND_COOLDOWN);
        if !suppressed {
            self.sound.fail();
            self.last_fail_sound = Some(now);
        }
    }

    fn sleep_observing_stop(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while !self.state.should_stop() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(Duration::from_millis(50)));
        }
    }
}

fn hex_preview(bytes: &[u8]) -> String {
    const LIMIT: usize = 64;
    if bytes.len() <= LIMIT {
        hex::encode(bytes)
    } else {
        format!("{}… ({} bytes)", hex::encode(&bytes[..LIMIT]), bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tapdeck_launcher::{HostEvent, RecordingHost};
    use tapdeck_ndef::{encode_text, Alignment};
    use tapdeck_reader::{MockHandle, MockReader, ScriptedPoll};

    struct CountingSound {
        success: AtomicUsize,
        fail: AtomicUsize,
    }

    impl CountingSound {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                success: AtomicUsize::new(0),
                fail: AtomicUsize::new(0),
            })
        }
    }

    impl Sound for CountingSound {
        fn success(&self) {
            self.success.fetch_add(1, Ordering::SeqCst);
        }
        fn fail(&self) {
            self.fail.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        state: Arc<ServiceState>,
        handle: MockHandle,
        host: RecordingHost,
        sound: Arc<CountingSound>,
        runner: PollRunner,
        last_scan: PathBuf,
        opens: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let state = ServiceState::new(dir.path().join("launcher.disabled"));
        let (reader, handle) = MockReader::new();
        let host = RecordingHost::new();
        let sound = CountingSound::new();
        let last_scan = dir.path().join("last_scan");

        std::fs::create_dir(dir.path().join("nes")).unwrap();
        std::fs::write(dir.path().join("nes/Only Game.nes"), b"").unwrap();
        let library = GameLibrary::new(vec![dir.path().to_path_buf()]);

        let opens = Arc::new(AtomicUsize::new(0));
        let opens_in_factory = Arc::clone(&opens);
        let factory: ReaderFactory = Box::new(move || {
            opens_in_factory.fetch_add(1, Ordering::SeqCst);
            Ok(AnyTagReader::Mock(reader.clone()))
        });

        let runner = PollRunner::new(
            Arc::clone(&state),
            factory,
            Box::new(host.clone()),
            library,
            sound.clone(),
            last_scan.clone(),
        )
        .with_forget_timeout(Duration::from_millis(150))
        .with_loop_delay(Duration::from_millis(1));

        Fixture {
            _dir: dir,
            state,
            handle,
            host,
            sound,
            runner,
            last_scan,
            opens,
        }
    }

    fn ntag_with_text(handle: &MockHandle, uid: Vec<u8>, text: &str) {
        let user = encode_text(text, Alignment::Page).unwrap();
        handle.place_ntag(uid, &user);
    }

    /// First tick opens the reader (the runner starts in Reconnecting).
    fn connect(fx: &mut Fixture) {
        fx.runner.tick();
        assert_eq!(fx.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ntag_arrival_dispatches_system_menu() {
        let mut fx = fixture();
        connect(&mut fx);
        ntag_with_text(
            &fx.handle,
            vec![0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0x80],
            "system:snes",
        );

        fx.runner.tick();

        assert_eq!(
            fx.host.take_events(),
            vec![HostEvent::SystemMenu("snes".to_string())]
        );
        assert_eq!(fx.sound.success.load(Ordering::SeqCst), 1);

        let active = fx.state.active_card().unwrap();
        assert_eq!(active.uid.as_hex(), "04a1b2c3d4e580");
        assert_eq!(active.text, "system:snes");
        assert_eq!(
            std::fs::read_to_string(&fx.last_scan).unwrap(),
            "04a1b2c3d4e580,system:snes"
        );
    }

    #[test]
    fn test_same_tag_reseen_is_one_launch() {
        let mut fx = fixture();
        connect(&mut fx);
        ntag_with_text(&fx.handle, vec![0x01, 0x02, 0x03, 0x04], "system:snes");

        for _ in 0..5 {
            fx.runner.tick();
        }

        assert_eq!(fx.host.event_count(), 1);
        assert_eq!(fx.sound.success.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_uid_mapping_wins_over_tag_text() {
        let mut fx = fixture();
        connect(&mut fx);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "deadbeef,random:nes").unwrap();
        fx.state
            .set_db(tapdeck_db::load_mappings(file.path()).unwrap());

        let user = encode_text("some text", Alignment::Block).unwrap();
        fx.handle.place_mifare(vec![0xDE, 0xAD, 0xBE, 0xEF], &user);

        fx.runner.tick();

        match fx.host.take_events().as_slice() {
            [HostEvent::Game(system, path)] => {
                assert_eq!(system, "nes");
                assert!(path.ends_with("nes/Only Game.nes"));
            }
            other => panic!("expected one game launch, got {other:?}"),
        }
    }

    #[test]
    fn test_unmapped_text_is_dispatched_raw() {
        let mut fx = fixture();
        connect(&mut fx);
        ntag_with_text(&fx.handle, vec![0x01, 0x02, 0x03, 0x04], "ini:2");

        fx.runner.tick();
        assert_eq!(fx.host.take_events(), vec![HostEvent::Ini(2)]);
    }

    #[test]
    fn test_debounce_and_forget() {
        let mut fx = fixture();
        connect(&mut fx);
        ntag_with_text(&fx.handle, vec![0x01, 0x02, 0x03, 0x04], "system:snes");

        fx.runner.tick();
        assert_eq!(fx.host.event_count(), 1);

        // Momentary dropouts inside the forget window keep the card active
        fx.handle
            .script([ScriptedPoll::Empty, ScriptedPoll::Empty]);
        fx.runner.tick();
        fx.runner.tick();
        assert!(fx.state.active_card().is_some());

        // Past the forget timeout an empty window clears the card, with no
        // launch side effect
        std::thread::sleep(Duration::from_millis(200));
        fx.handle.script([ScriptedPoll::Empty]);
        fx.runner.tick();
        assert!(fx.state.active_card().is_none());
        assert_eq!(fx.host.event_count(), 1);

        // The same tag coming back is a fresh arrival
        fx.runner.tick();
        assert_eq!(fx.host.event_count(), 2);
    }

    #[test]
    fn test_disabled_launcher_updates_state_only() {
        let mut fx = fixture();
        connect(&mut fx);
        fx.state.disable_launcher();
        ntag_with_text(&fx.handle, vec![0x01, 0x02, 0x03, 0x04], "system:snes");

        fx.runner.tick();

        assert_eq!(fx.host.event_count(), 0);
        assert_eq!(fx.sound.success.load(Ordering::SeqCst), 0);
        assert!(!fx.last_scan.exists());
        // State still tracks the arrival
        assert_eq!(
            fx.state.last_scanned().unwrap().uid.as_hex(),
            "01020304"
        );

        // Re-enabled: a different tag launches normally
        fx.state.enable_launcher();
        ntag_with_text(&fx.handle, vec![0x05, 0x06, 0x07, 0x08], "system:gba");
        fx.runner.tick();
        assert_eq!(
            fx.host.take_events(),
            vec![HostEvent::SystemMenu("gba".to_string())]
        );
    }

    #[test]
    fn test_fatal_poll_error_reconnects() {
        let mut fx = fixture();
        connect(&mut fx);

        fx.handle.script([ScriptedPoll::Fatal]);
        fx.runner.tick();
        assert_eq!(fx.sound.fail.load(Ordering::SeqCst), 1);

        // Next tick reopens immediately (attempt 0 sleeps nothing)
        fx.runner.tick();
        assert_eq!(fx.opens.load(Ordering::SeqCst), 2);

        // And polling works again
        ntag_with_text(&fx.handle, vec![0x01, 0x02, 0x03, 0x04], "system:snes");
        fx.runner.tick();
        assert_eq!(fx.host.event_count(), 1);
    }

    #[test]
    fn test_fail_sound_rate_limited() {
        let mut fx = fixture();
        connect(&mut fx);

        // Two empty-text arrivals in quick succession both fail to
        // dispatch; only the first fail sound plays
        fx.handle.place_ntag(vec![0x01, 0x02, 0x03, 0x04], &[]);
        fx.runner.tick();
        fx.handle.place_ntag(vec![0x05, 0x06, 0x07, 0x08], &[]);
        fx.runner.tick();

        assert_eq!(fx.host.event_count(), 0);
        assert_eq!(fx.sound.fail.load(Ordering::SeqCst), 1);
        // Both arrivals still registered
        assert_eq!(
            fx.state.last_scanned().unwrap().uid.as_hex(),
            "05060708"
        );
    }

    #[test]
    fn test_dispatch_failure_keeps_present_state() {
        let mut fx = fixture();
        connect(&mut fx);
        ntag_with_text(&fx.handle, vec![0x01, 0x02, 0x03, 0x04], "random:unknown");

        fx.runner.tick();

        assert_eq!(fx.host.event_count(), 0);
        assert_eq!(fx.sound.fail.load(Ordering::SeqCst), 1);
        assert!(fx.state.active_card().is_some());

        // Still present, no relaunch attempt on the next sighting
        fx.runner.tick();
        assert_eq!(fx.sound.fail.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_honors_stop_flag() {
        let fx = fixture();
        let state = Arc::clone(&fx.state);
        let runner = fx.runner;

        let thread = std::thread::spawn(move || runner.run());
        std::thread::sleep(Duration::from_millis(50));
        state.request_stop();
        thread.join().unwrap();
    }
}
