//! Service-level scenarios: poll loop, state and control socket wired
//! together over the mock reader, the way `service::run` assembles them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use tapdeck::poll::{PollRunner, ReaderFactory};
use tapdeck::socket;
use tapdeck::sound::NullSound;
use tapdeck::state::ServiceState;
use tapdeck_launcher::{GameLibrary, HostEvent, RecordingHost};
use tapdeck_ndef::{encode_text, Alignment};
use tapdeck_reader::{AnyTagReader, MockHandle, MockReader};

struct TestService {
    dir: tempfile::TempDir,
    state: Arc<ServiceState>,
    handle: MockHandle,
    host: RecordingHost,
    socket_path: PathBuf,
    poll_thread: Option<std::thread::JoinHandle<()>>,
    socket_task: tokio::task::JoinHandle<()>,
}

impl TestService {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = ServiceState::new(dir.path().join("launcher.disabled"));
        let (reader, handle) = MockReader::new();
        let host = RecordingHost::new();
        let library = GameLibrary::new(vec![dir.path().to_path_buf()]);

        let factory: ReaderFactory = Box::new(move || Ok(AnyTagReader::Mock(reader.clone())));
        let runner = PollRunner::new(
            Arc::clone(&state),
            factory,
            Box::new(host.clone()),
            library,
            Arc::new(NullSound),
            dir.path().join("last_scan"),
        )
        .with_forget_timeout(Duration::from_millis(150))
        .with_loop_delay(Duration::from_millis(5));
        let poll_thread = std::thread::spawn(move || runner.run());

        let socket_path = dir.path().join("tapdeck.sock");
        let listener = socket::bind(&socket_path).unwrap();
        let socket_task = tokio::spawn(socket::serve(
            listener,
            socket_path.clone(),
            Arc::clone(&state),
        ));

        Self {
            dir,
            state,
            handle,
            host,
            socket_path,
            poll_thread: Some(poll_thread),
            socket_task,
        }
    }

    /// One request over the control socket, returning the full reply.
    async fn request(&self, line: &str) -> String {
        let mut stream = UnixStream::connect(&self.socket_path).await.unwrap();
        stream.write_all(line.as_bytes()).await.unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).await.unwrap();
        reply
    }

    /// Wait until the host has recorded `count` events.
    async fn wait_for_events(&self, count: usize) {
        for _ in 0..400 {
            if self.host.event_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "expected {count} host events, saw {}",
            self.host.event_count()
        );
    }

    async fn stop(mut self) {
        self.state.request_stop();
        self.poll_thread.take().unwrap().join().unwrap();
        self.socket_task.await.unwrap();
    }
}

fn ntag_user_bytes(text: &str) -> Vec<u8> {
    encode_text(text, Alignment::Page).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn cold_start_reports_empty_status() {
    let service = TestService::start().await;

    // No reader activity yet; the daemon is idle but answering
    assert_eq!(service.request("status").await, "0,,true,");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(service.state.active_card().is_none());
    assert_eq!(service.host.event_count(), 0);

    service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn arrival_is_dispatched_and_visible_in_status() {
    let service = TestService::start().await;

    service.handle.place_ntag(
        vec![0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0x80],
        &ntag_user_bytes("system:snes"),
    );
    service.wait_for_events(1).await;

    assert_eq!(
        service.host.take_events(),
        vec![HostEvent::SystemMenu("snes".to_string())]
    );

    let reply = service.request("status").await;
    let fields: Vec<&str> = reply.splitn(4, ',').collect();
    assert!(fields[0].parse::<i64>().unwrap() > 0);
    assert_eq!(fields[1], "04a1b2c3d4e580");
    assert_eq!(fields[2], "true");
    assert_eq!(fields[3], "system:snes");

    service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn disable_via_socket_suppresses_launches() {
    let service = TestService::start().await;
    let sentinel = service.dir.path().join("launcher.disabled");

    service
        .handle
        .place_ntag(vec![0x01, 0x02, 0x03, 0x04], &ntag_user_bytes("ini:1"));
    service.wait_for_events(1).await;

    assert_eq!(service.request("disable").await, "");
    assert!(sentinel.exists());

    // A different tag arrives while disabled: tracked but not launched
    service
        .handle
        .place_ntag(vec![0x05, 0x06, 0x07, 0x08], &ntag_user_bytes("ini:2"));
    for _ in 0..40 {
        if service
            .state
            .last_scanned()
            .is_some_and(|card| card.uid.as_hex() == "05060708")
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        service.state.last_scanned().unwrap().uid.as_hex(),
        "05060708"
    );
    assert_eq!(service.host.event_count(), 1);
    // Status reflects the disabled launcher
    assert!(service.request("status").await.contains(",false,"));

    assert_eq!(service.request("enable").await, "");
    assert!(!sentinel.exists());

    service
        .handle
        .place_ntag(vec![0x09, 0x0A, 0x0B, 0x0C], &ntag_user_bytes("ini:3"));
    service.wait_for_events(2).await;
    assert_eq!(
        service.host.take_events(),
        vec![HostEvent::Ini(1), HostEvent::Ini(3)]
    );

    service.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn reloaded_mappings_apply_to_the_next_arrival() {
    let service = TestService::start().await;
    let mappings = service.dir.path().join("mappings.csv");

    std::fs::write(&mappings, "cafebabe,ini:1\n").unwrap();
    service
        .state
        .set_db(tapdeck_db::load_mappings(&mappings).unwrap());

    service
        .handle
        .place_mifare(vec![0xCA, 0xFE, 0xBA, 0xBE], &[]);
    service.wait_for_events(1).await;
    assert_eq!(service.host.take_events(), vec![HostEvent::Ini(1)]);

    // A new line lands in the database (as the watcher would publish it)
    std::fs::write(&mappings, "cafebabe,ini:1\ndeadbeef,ini:2\n").unwrap();
    service
        .state
        .set_db(tapdeck_db::load_mappings(&mappings).unwrap());

    service
        .handle
        .place_mifare(vec![0xDE, 0xAD, 0xBE, 0xEF], &[]);
    service.wait_for_events(1).await;

    // Only the new arrival used the new mapping; nothing re-fired for the
    // earlier card
    assert_eq!(service.host.take_events(), vec![HostEvent::Ini(2)]);

    service.stop().await;
}
