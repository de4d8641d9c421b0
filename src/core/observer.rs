// logdex - core/observer.rs
//
// Notification sink for a `LogFile`'s rebuild pass. Passed by reference
// into `rebuild_index` rather than stored on the `LogFile` itself, so
// callers aren't forced into a lifetime-parameterised `LogFile<'obs>` just
// to receive callbacks - message-passing sinks (mpsc, UI channels) and
// in-memory recorders alike implement the same trait.
//
// All methods have no-op defaults; implementors override only what they
// need.

use crate::core::logfile::LogFile;

/// Receives notifications as a `LogFile` rebuilds its index.
///
/// Calls happen synchronously, in this order, during a single
/// `rebuild_index` invocation: at most one `restart`, then zero or more
/// `new_line` calls (one per newly appended index entry, in index order),
/// then one `eof`.
pub trait IndexObserver {
    /// The index rolled back its last record before rescanning; `removed`
    /// is how many entries were dropped.
    fn restart(&mut self, _logfile: &LogFile, _removed: usize) {}

    /// One new entry was appended at index position `pos`. `bytes` is the
    /// entry's raw source bytes.
    fn new_line(&mut self, _logfile: &LogFile, _pos: usize, _bytes: &[u8]) {}

    /// The rebuild pass reached the end of currently available data.
    fn eof(&mut self, _logfile: &LogFile) {}

    /// Progress through the current rebuild pass: `bytes_done` out of
    /// `bytes_total` have been scanned so far. Called periodically during
    /// a long initial index pass; callers driving a progress bar should
    /// expect this rather than `new_line` counts, since format-lock-in can
    /// yield long before all bytes are consumed.
    fn progress(&mut self, _logfile: &LogFile, _bytes_done: u64, _bytes_total: u64) {}
}

/// An `IndexObserver` that does nothing, for callers that only care about
/// the `RebuildOutcome` returned by `rebuild_index`.
#[derive(Debug, Default)]
pub struct NullObserver;

impl IndexObserver for NullObserver {}
