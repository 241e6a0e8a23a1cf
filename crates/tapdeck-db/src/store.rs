//! The user mappings database.
//!
//! A plain text file, one mapping per line:
//!
//! ```text
//! # tag UID -> command
//! deadbeef,random:nes
//! 04a1b2c3d4e580,system:snes
//! # tag text -> command
//! kiosk,ini:2
//! ```
//!
//! Keys that parse as a tag UID land in the UID map, everything else in the
//! text map; resolution checks UID first. Loading always produces a fresh
//! immutable [`MappingsSnapshot`]: reloads swap the whole snapshot, they
//! never mutate a published one.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use tapdeck_core::{Error, Result, TagUid};

/// Immutable lookup tables from one load of the mappings file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MappingsSnapshot {
    by_uid: HashMap<String, String>,
    by_text: HashMap<String, String>,
}

impl MappingsSnapshot {
    /// An empty snapshot, used before the first load and when the file is
    /// missing or unreadable.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolve a scanned tag to a mapped command.
    ///
    /// UID mappings win over text mappings; a tag matching neither returns
    /// `None` (the caller falls back to the tag text itself).
    pub fn resolve(&self, uid: &str, text: &str) -> Option<&str> {
        self.by_uid
            .get(uid)
            .or_else(|| {
                if text.is_empty() {
                    None
                } else {
                    self.by_text.get(text)
                }
            })
            .map(String::as_str)
    }

    /// Total number of mappings.
    pub fn len(&self) -> usize {
        self.by_uid.len() + self.by_text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty() && self.by_text.is_empty()
    }
}

/// Load the mappings file into a fresh snapshot.
///
/// A missing file is an empty database, not an error. Blank lines and `#`
/// comments are ignored. Duplicate keys keep the last occurrence so users
/// can override earlier lines by appending.
///
/// # Errors
///
/// Returns [`Error::MappingsParse`] for a line with no `,` separator, and
/// [`Error::Io`] when an existing file cannot be read. The caller publishes
/// an empty snapshot in both cases.
pub fn load_mappings(path: &Path) -> Result<MappingsSnapshot> {
    if !path.exists() {
        debug!(path = %path.display(), "no mappings file, starting empty");
        return Ok(MappingsSnapshot::empty());
    }

    let raw = std::fs::read_to_string(path)?;
    let mut snapshot = MappingsSnapshot::empty();

    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, command) = line.split_once(',').ok_or_else(|| Error::MappingsParse {
            line: idx + 1,
            message: "expected <key>,<command>".to_string(),
        })?;

        let key = key.trim();
        let command = command.trim().to_string();
        match key.parse::<TagUid>() {
            Ok(uid) => {
                snapshot.by_uid.insert(uid.as_hex(), command);
            }
            Err(_) => {
                snapshot.by_text.insert(key.to_string(), command);
            }
        }
    }

    debug!(
        path = %path.display(),
        uids = snapshot.by_uid.len(),
        texts = snapshot.by_text.len(),
        "mappings loaded"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_mappings(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn test_missing_file_is_empty() {
        let snapshot = load_mappings(Path::new("/nonexistent/mappings.csv")).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_uid_and_text_keys_are_split() {
        let file = write_mappings(
            "# comment\n\
             deadbeef,random:nes\n\
             \n\
             kiosk,ini:2\n\
             04a1b2c3d4e580,system:snes\n",
        );
        let snapshot = load_mappings(file.path()).unwrap();

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.resolve("deadbeef", ""), Some("random:nes"));
        assert_eq!(snapshot.resolve("04a1b2c3d4e580", ""), Some("system:snes"));
        assert_eq!(snapshot.resolve("cafebabe", "kiosk"), Some("ini:2"));
        // UID keys never land in the text map
        assert_eq!(snapshot.resolve("cafebabe", "deadbeef"), None);
    }

    #[test]
    fn test_uid_keys_normalize_to_lowercase() {
        let file = write_mappings("DEADBEEF,system:gba\n");
        let snapshot = load_mappings(file.path()).unwrap();
        assert_eq!(snapshot.resolve("deadbeef", ""), Some("system:gba"));
    }

    #[test]
    fn test_short_hex_token_is_a_text_key() {
        // "ab" is valid hex but too short for a UID, so it maps by text
        let file = write_mappings("ab,command:reboot\n");
        let snapshot = load_mappings(file.path()).unwrap();
        assert_eq!(snapshot.resolve("cafebabe", "ab"), Some("command:reboot"));
        assert_eq!(snapshot.resolve("ab", ""), None);
    }

    #[test]
    fn test_resolution_prefers_uid() {
        let file = write_mappings(
            "deadbeef,random:nes\n\
             some text,system:psx\n",
        );
        let snapshot = load_mappings(file.path()).unwrap();

        // UID match wins regardless of tag text
        assert_eq!(
            snapshot.resolve("deadbeef", "some text"),
            Some("random:nes")
        );
        // No UID match: falls through to text
        assert_eq!(snapshot.resolve("cafebabe", "some text"), Some("system:psx"));
        // Neither: caller falls back to the raw text
        assert_eq!(snapshot.resolve("cafebabe", "unmapped"), None);
        // Empty text never matches a text mapping
        assert_eq!(snapshot.resolve("cafebabe", ""), None);
    }

    #[test]
    fn test_last_duplicate_wins() {
        let file = write_mappings(
            "deadbeef,system:nes\n\
             deadbeef,system:snes\n",
        );
        let snapshot = load_mappings(file.path()).unwrap();
        assert_eq!(snapshot.resolve("deadbeef", ""), Some("system:snes"));
    }

    #[test]
    fn test_commands_may_contain_commas() {
        let file = write_mappings("deadbeef,command:echo a,b,c\n");
        let snapshot = load_mappings(file.path()).unwrap();
        assert_eq!(
            snapshot.resolve("deadbeef", ""),
            Some("command:echo a,b,c")
        );
    }

    #[test]
    fn test_malformed_line_is_parse_error() {
        let file = write_mappings("deadbeef,ok\nnocomma\n");
        let result = load_mappings(file.path());
        assert!(matches!(
            result,
            Err(Error::MappingsParse { line: 2, .. })
        ));
    }
}
