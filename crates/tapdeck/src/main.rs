use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use tracing::error;
use tracing_subscriber::EnvFilter;

use tapdeck::supervisor::{PidfileSupervisor, Supervisor};
use tapdeck::writer::WriteOutcome;
use tapdeck_core::constants::DEFAULT_CONFIG_PATH;
use tapdeck_core::Config;

fn build_cli() -> Command {
    Command::new("tapdeck")
        .version(env!("CARGO_PKG_VERSION"))
        .about("NFC tag reader daemon: scan a tag, launch a game")
        .arg(
            Arg::new("service")
                .long("service")
                .value_name("ACTION")
                .value_parser(["start", "stop", "restart", "status"])
                .help("Manage the tapdeck service")
                .conflicts_with("write"),
        )
        .arg(
            Arg::new("write")
                .long("write")
                .value_name("TEXT")
                .help("Write text to the tag on the reader"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("daemon")
                .long("daemon")
                .action(ArgAction::SetTrue)
                .hide(true),
        )
}

fn init_tracing(daemon: bool, runtime_dir: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if daemon {
        // Detached daemons have no stderr worth writing to
        let _ = std::fs::create_dir_all(runtime_dir);
        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(runtime_dir.join("tapdeck.log"))
        {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
            return;
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = Config::load(&config_path).context("loading configuration")?;

    let daemon = matches.get_flag("daemon");
    init_tracing(daemon, &config.paths.runtime_dir);

    if daemon {
        if let Err(e) = tapdeck::service::run(config).await {
            error!(error = %e, "service failed");
            eprintln!("Service failed: {e}");
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut supervisor = PidfileSupervisor::new(config.pid_path());
    if let Some(path) = matches.get_one::<String>("config") {
        supervisor =
            supervisor.with_daemon_args(vec!["--config".to_string(), path.clone()]);
    }

    if let Some(text) = matches.get_one::<String>("write") {
        match tapdeck::writer::run(&config, text.clone(), &supervisor).await {
            Ok(WriteOutcome::Done) => {
                eprintln!("Successfully wrote to card");
                std::process::exit(0);
            }
            Ok(WriteOutcome::DoneThenTerminate) => std::process::exit(143),
            Err(e) => {
                error!(error = %e, "write mode failed");
                eprintln!("Error writing to card: {e}");
                std::process::exit(1);
            }
        }
    }

    if let Some(action) = matches.get_one::<String>("service") {
        let code = run_service_action(&supervisor, action);
        std::process::exit(code);
    }

    // No arguments: interactive setup is an external concern, so a terminal
    // gets guidance and anything else (boot scripts) just ensures the
    // service is up.
    if std::io::stdout().is_terminal() {
        if supervisor.running() {
            println!("Service is running.");
        } else {
            println!("Service is not running. Start it with: tapdeck --service start");
        }
        return Ok(());
    }

    if supervisor.running() {
        println!("Service is running.");
    } else {
        supervisor.start().context("starting service")?;
        println!("Service started successfully.");
    }
    Ok(())
}

fn run_service_action(supervisor: &PidfileSupervisor, action: &str) -> i32 {
    let result = match action {
        "start" => supervisor.start(),
        "stop" => supervisor.stop(),
        "restart" => supervisor.restart(),
        "status" => {
            if supervisor.running() {
                println!("Service is running.");
                return 0;
            }
            println!("Service is stopped.");
            return 1;
        }
        _ => unreachable!("clap validates the action"),
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}
