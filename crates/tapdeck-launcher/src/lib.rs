//! Launch dispatch for the tapdeck daemon.
//!
//! Resolved command strings (from the mappings database or straight off a
//! tag) are parsed by [`LaunchCommand`] and executed by [`dispatch`]
//! against a [`GameHost`], the boundary to the actual launching machinery.
//! [`GameLibrary`] backs the `random:` commands with an on-demand
//! filesystem index and infers the owning system for bare-path launches.
//!
//! Launching is best-effort throughout: errors flow back to the poll loop,
//! which logs them and keeps polling.

pub mod command;
pub mod dispatch;
pub mod host;
pub mod library;

pub use command::LaunchCommand;
pub use dispatch::dispatch;
pub use host::{GameHost, HostEvent, PipeHost, RecordingHost};
pub use library::GameLibrary;
