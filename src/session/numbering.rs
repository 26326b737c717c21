//! Session directory numbering.
//!
//! Numbers come from the larger of two sources: the highest
//! `ingest_session_NNNNN` directory under the root, and the counter file that
//! remembers the last number ever issued. Deleting session directories can
//! therefore never cause a number to be handed out twice.

// Standard library imports
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

// External crate imports
use tracing::{debug, info};

// Internal module imports
use crate::error::{IngestError, IngestResult};

pub const SESSION_DIR_PREFIX: &str = "ingest_session_";
pub const COUNTER_FILE: &str = ".ingest_session_counter";

pub fn session_dir_name(number: u32) -> String {
    format!("{SESSION_DIR_PREFIX}{number:05}")
}

/// Parse `ingest_session_NNNNN`, returning the number.
pub fn parse_session_dir_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(SESSION_DIR_PREFIX)?;
    if digits.len() < 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Highest session number present as a directory under `root`.
pub fn highest_existing(root: &Path) -> IngestResult<Option<u32>> {
    let entries = fs::read_dir(root).map_err(|e| IngestError::io("list session root", root, e))?;
    let mut highest = None;
    for entry in entries {
        let entry = entry.map_err(|e| IngestError::io("list session root", root, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(number) = entry.file_name().to_str().and_then(parse_session_dir_name) {
            highest = highest.max(Some(number));
        }
    }
    Ok(highest)
}

/// Last number recorded in the counter file, if any.
pub fn read_counter(root: &Path) -> IngestResult<Option<u32>> {
    let path = root.join(COUNTER_FILE);
    match fs::read_to_string(&path) {
        Ok(text) => text.trim().parse().map(Some).map_err(|_| {
            IngestError::config(COUNTER_FILE, format!("'{}' is not a session number", text.trim()))
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(IngestError::io("read session counter", path, e)),
    }
}

/// The number the next session will get. The first session is 0.
pub fn next_number(root: &Path) -> IngestResult<u32> {
    let last = highest_existing(root)?.max(read_counter(root)?);
    match last {
        None => Ok(0),
        Some(n) => n.checked_add(1).ok_or_else(|| {
            IngestError::config(COUNTER_FILE, "session numbers exhausted")
        }),
    }
}

/// Issue the next number and create its directory.
///
/// The counter is written before the directory so that a failed creation
/// still burns the number.
pub fn allocate(root: &Path) -> IngestResult<(u32, PathBuf)> {
    fs::create_dir_all(root).map_err(|e| IngestError::io("create session root", root, e))?;
    let number = next_number(root)?;

    let counter = root.join(COUNTER_FILE);
    fs::write(&counter, format!("{number}\n"))
        .map_err(|e| IngestError::io("write session counter", &counter, e))?;
    debug!(number, "session number issued");

    let dir = root.join(session_dir_name(number));
    match fs::create_dir(&dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(IngestError::SessionConflict { path: dir });
        }
        Err(e) => return Err(IngestError::io("create session directory", &dir, e)),
    }
    info!(number, dir = %dir.display(), "session directory created");
    Ok((number, dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_name_round_trip() {
        assert_eq!(session_dir_name(7), "ingest_session_00007");
        assert_eq!(parse_session_dir_name("ingest_session_00007"), Some(7));
        assert_eq!(parse_session_dir_name("ingest_session_123456"), Some(123456));
        assert_eq!(parse_session_dir_name("ingest_session_7"), None);
        assert_eq!(parse_session_dir_name("ingest_session_0000x"), None);
        assert_eq!(parse_session_dir_name("other_00001"), None);
    }

    #[test]
    fn test_first_session_is_zero() {
        let root = tempfile::tempdir().unwrap();
        let (number, dir) = allocate(root.path()).unwrap();
        assert_eq!(number, 0);
        assert!(dir.ends_with("ingest_session_00000"));
        assert_eq!(read_counter(root.path()).unwrap(), Some(0));
    }

    #[test]
    fn test_numbers_never_repeat_after_deletion() {
        let root = tempfile::tempdir().unwrap();
        let issued: Vec<u32> = (0..3).map(|_| allocate(root.path()).unwrap().0).collect();
        assert_eq!(issued, vec![0, 1, 2]);

        fs::remove_dir(root.path().join(session_dir_name(2))).unwrap();
        fs::remove_dir(root.path().join(session_dir_name(0))).unwrap();
        assert_eq!(allocate(root.path()).unwrap().0, 3);
    }

    #[test]
    fn test_existing_directories_beat_stale_counter() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join(session_dir_name(41))).unwrap();
        fs::write(root.path().join(COUNTER_FILE), "3\n").unwrap();
        assert_eq!(next_number(root.path()).unwrap(), 42);
    }

    #[test]
    fn test_corrupt_counter_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join(COUNTER_FILE), "banana").unwrap();
        assert!(allocate(root.path()).is_err());
    }
}
