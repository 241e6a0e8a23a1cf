//! User mappings database for the tapdeck daemon.
//!
//! Two pieces: [`store`] parses the `<key>,<command>` mappings file into an
//! immutable [`MappingsSnapshot`], and [`watcher`] turns noisy filesystem
//! events on that file into debounced reload notifications. Publication of
//! snapshots (the atomic swap the poll loop reads) lives with the service
//! state in the daemon.

pub mod store;
pub mod watcher;

pub use store::{load_mappings, MappingsSnapshot};
pub use watcher::{watch_mappings, MappingsEvent};
