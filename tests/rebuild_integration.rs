// Integration tests driving `LogFile::rebuild_index` against real files on
// disk: append, truncate/rotate, and partial-line boundary scenarios, with
// an in-memory observer recording the exact callback sequence.

use logdex::core::format::FormatRegistry;
use logdex::core::logfile::{LogFile, OpenOptions, RebuildOutcome};
use logdex::core::observer::IndexObserver;
use logdex::core::profile::{parse_profile_toml, validate_and_compile};
use logdex::core::profile_format::ProfileFormat;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;

#[derive(Debug, Default)]
struct RecordingObserver {
    events: Vec<String>,
}

impl IndexObserver for RecordingObserver {
    fn restart(&mut self, _logfile: &LogFile, removed: usize) {
        self.events.push(format!("restart({removed})"));
    }

    fn new_line(&mut self, _logfile: &LogFile, pos: usize, _bytes: &[u8]) {
        self.events.push(format!("new_line({pos})"));
    }

    fn eof(&mut self, _logfile: &LogFile) {
        self.events.push("eof".to_string());
    }
}

fn generic_registry() -> FormatRegistry {
    let content = include_str!("../profiles/generic_timestamp.toml");
    let path = PathBuf::from("generic_timestamp.toml");
    let def = parse_profile_toml(content, &path).unwrap();
    let profile = Arc::new(validate_and_compile(def, &path).unwrap());
    let mut registry = FormatRegistry::new();
    registry.register(Box::new(ProfileFormat::new(profile)));
    registry
}

#[test]
fn new_line_then_eof_ordering_for_one_matched_line() {
    let mut tmp = NamedTempFile::new().unwrap();
    writeln!(tmp, "2024-01-01 00:00:00 INFO hello").unwrap();
    tmp.flush().unwrap();

    let mut logfile = LogFile::open(tmp.path(), generic_registry(), OpenOptions::default()).unwrap();
    let mut observer = RecordingObserver::default();
    let outcome = logfile.rebuild_index(&mut observer).unwrap();

    assert_eq!(outcome, RebuildOutcome::NewLines);
    assert_eq!(observer.events, vec!["new_line(0)", "eof"]);
}

#[test]
fn out_of_order_timestamps_are_clamped_with_time_skew() {
    let mut tmp = NamedTempFile::new().unwrap();
    writeln!(tmp, "2024-01-01 00:00:10 INFO first").unwrap();
    writeln!(tmp, "2024-01-01 00:00:05 INFO second, earlier than first").unwrap();
    tmp.flush().unwrap();

    let mut logfile = LogFile::open(tmp.path(), generic_registry(), OpenOptions::default()).unwrap();
    let mut observer = RecordingObserver::default();
    logfile.rebuild_index(&mut observer).unwrap();

    assert_eq!(logfile.index().len(), 2);
    let first = logfile.index().get(0).unwrap();
    let second = logfile.index().get(1).unwrap();
    assert!(second.time_key() >= first.time_key());
    assert!(second.is_time_skew());
}

#[test]
fn continuation_line_inherits_predecessor_time_and_module() {
    let mut tmp = NamedTempFile::new().unwrap();
    writeln!(tmp, "2024-01-01 00:00:00 ERROR boom").unwrap();
    writeln!(tmp, "    at frame 1").unwrap();
    tmp.flush().unwrap();

    let mut logfile = LogFile::open(tmp.path(), generic_registry(), OpenOptions::default()).unwrap();
    let mut observer = RecordingObserver::default();
    logfile.rebuild_index(&mut observer).unwrap();

    assert_eq!(logfile.index().len(), 2);
    let anchor = *logfile.index().get(0).unwrap();
    let continuation = *logfile.index().get(1).unwrap();
    assert!(continuation.is_continued());
    assert_eq!(continuation.time_key(), anchor.time_key());
    assert_eq!(continuation.module_id(), anchor.module_id());
}

#[test]
fn partial_final_line_is_reindexed_without_duplication_once_complete() {
    let mut tmp = NamedTempFile::new().unwrap();
    write!(tmp, "2024-01-01 00:00:00 INFO still writ").unwrap();
    tmp.flush().unwrap();

    let mut logfile = LogFile::open(tmp.path(), generic_registry(), OpenOptions::default()).unwrap();
    let mut observer = RecordingObserver::default();
    logfile.rebuild_index(&mut observer).unwrap();
    assert_eq!(logfile.index().len(), 1);

    writeln!(tmp, "ing").unwrap();
    tmp.flush().unwrap();

    observer.events.clear();
    let outcome = logfile.rebuild_index(&mut observer).unwrap();
    assert_eq!(outcome, RebuildOutcome::NewLines);
    assert_eq!(logfile.index().len(), 1);
    // The partial anchor was rolled back and rescanned, not duplicated.
    assert!(observer.events.iter().any(|e| e.starts_with("restart")));
}

#[test]
fn truncate_and_rewrite_is_reported_as_rotation() {
    let mut tmp = NamedTempFile::new().unwrap();
    writeln!(tmp, "2024-01-01 00:00:00 INFO one").unwrap();
    writeln!(tmp, "2024-01-01 00:00:01 INFO two").unwrap();
    tmp.flush().unwrap();

    let mut logfile = LogFile::open(tmp.path(), generic_registry(), OpenOptions::default()).unwrap();
    let mut observer = RecordingObserver::default();
    logfile.rebuild_index(&mut observer).unwrap();
    assert_eq!(logfile.index().len(), 2);
    assert!(logfile.exists());

    tmp.as_file().set_len(0).unwrap();
    tmp.as_file().sync_all().unwrap();

    let outcome = logfile.rebuild_index(&mut observer).unwrap();
    assert_eq!(outcome, RebuildOutcome::NoNewLines);
    assert!(!logfile.exists());
}

#[test]
fn late_format_lock_in_rewrites_prior_placeholder_timestamps() {
    let mut tmp = NamedTempFile::new().unwrap();
    writeln!(tmp, "=== header line one ===").unwrap();
    writeln!(tmp, "=== header line two ===").unwrap();
    writeln!(tmp, "=== header line three ===").unwrap();
    writeln!(tmp, "2024-01-01 12:00:00 INFO finally a matching line").unwrap();
    tmp.flush().unwrap();

    let mut logfile = LogFile::open(tmp.path(), generic_registry(), OpenOptions::default()).unwrap();
    let mut observer = RecordingObserver::default();
    logfile.rebuild_index(&mut observer).unwrap();

    assert_eq!(logfile.index().len(), 4);
    let anchor_time = logfile.index().get(3).unwrap().time_key();
    for pos in 0..3 {
        assert_eq!(logfile.index().get(pos).unwrap().time_key(), anchor_time);
    }
    assert!(logfile.is_locked());

    // content_id is fixed to the hash of the line that triggered lock-in,
    // not the file's first line - the open question documented in DESIGN.md.
    assert_eq!(
        logfile.content_id(),
        hash_bytes(b"2024-01-01 12:00:00 INFO finally a matching line")
    );
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn repeated_rebuild_with_no_byte_changes_is_idempotent() {
    let mut tmp = NamedTempFile::new().unwrap();
    writeln!(tmp, "2024-01-01 00:00:00 INFO hello").unwrap();
    tmp.flush().unwrap();

    let mut logfile = LogFile::open(tmp.path(), generic_registry(), OpenOptions::default()).unwrap();
    let mut observer = RecordingObserver::default();
    logfile.rebuild_index(&mut observer).unwrap();
    let before: Vec<_> = logfile.index().iter().copied().collect();

    let outcome = logfile.rebuild_index(&mut observer).unwrap();
    let after: Vec<_> = logfile.index().iter().copied().collect();

    assert_eq!(outcome, RebuildOutcome::NoNewLines);
    assert_eq!(before, after);
}
