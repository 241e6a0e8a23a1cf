use std::time::Duration;

/// Maximum attempts to open the reader before giving up.
pub const CONNECT_MAX_TRIES: u32 = 10;

/// Number of polling periods per `poll_once` call.
pub const TIMES_TO_POLL: u8 = 20;

/// Delay between individual polling periods.
pub const PERIOD_BETWEEN_POLLS: Duration = Duration::from_millis(300);

/// Delay between poll loop ticks.
pub const PERIOD_BETWEEN_LOOPS: Duration = Duration::from_millis(300);

/// How long a card stays "present" after its last sighting.
pub const TIME_TO_FORGET_CARD: Duration = Duration::from_secs(5);

/// Minimum interval between fail sounds.
pub const FAIL_SOUND_COOLDOWN: Duration = Duration::from_secs(1);

/// Quiet period before a changed mappings file is reloaded.
pub const DB_RELOAD_QUIET_PERIOD: Duration = Duration::from_secs(1);

/// Backoff ladder for reconnecting to a lost reader, capped at the last step.
pub const RECONNECT_BACKOFF: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

/// Maximum request size accepted on the control socket.
pub const SOCKET_READ_LIMIT: usize = 4096;

/// Interval between service-stopped checks in write mode.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Number of service-stopped checks before write mode gives up.
pub const STOP_POLL_TRIES: u32 = 15;

/// Well-known file names under the runtime directory.
pub const SOCKET_FILE: &str = "tapdeck.sock";
pub const PID_FILE: &str = "tapdeck.pid";
pub const LAUNCHER_DISABLED_FILE: &str = "launcher.disabled";
pub const LAST_SCAN_FILE: &str = "last_scan";
pub const SUCCESS_SOUND_FILE: &str = "success.wav";
pub const FAIL_SOUND_FILE: &str = "fail.wav";

/// Default locations.
pub const DEFAULT_RUNTIME_DIR: &str = "/tmp/tapdeck";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/tapdeck/tapdeck.toml";
pub const DEFAULT_MAPPINGS_PATH: &str = "/etc/tapdeck/mappings.csv";
pub const DEFAULT_COMMAND_PIPE: &str = "/dev/host_cmd";

/// Directory enumerated when probing for a serial reader.
pub const SERIAL_BY_ID_DIR: &str = "/dev/serial/by-id";

/// Connection string prefix for PN532 readers on a UART.
pub const PN532_UART_PREFIX: &str = "pn532_uart:";
