// logdex - core/logfile.rs
//
// The centerpiece: owns one line buffer, the active format, and the index
// it incrementally builds. `rebuild_index` is the only operation that
// performs I/O or mutates the index.

use crate::core::format::{FormatDriver, FormatRegistry, ScanContext};
use crate::core::index::LineIndex;
use crate::core::linebuffer::{self, FileRange, LineBuffer};
use crate::core::logline::LogLine;
use crate::core::observer::IndexObserver;
use crate::core::textformat::{self, TextFormat};
use crate::platform::fs::{self, StatSnapshot};
use crate::util::constants;
use crate::util::error::{IndexError, LogdexError, OpenError, Result};
use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Outcome of one `rebuild_index` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// Nothing new; the file hasn't grown (or was found rotated/overwritten
    /// and is now closed).
    NoNewLines,
    /// One or more lines were appended in place, order preserved.
    NewLines,
    /// Lines were appended but the index is no longer guaranteed sorted by
    /// time; the caller should re-sort before relying on ordering.
    NewOrder,
    /// A rollback-verification read failed; the file has been closed and
    /// must be reconstructed to be used again.
    Invalid,
}

/// Construction options for `LogFile::open`.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub detect_format: bool,
    pub unmatched_cap: usize,
    pub index_capacity: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            detect_format: true,
            unmatched_cap: constants::DEFAULT_AUTO_DETECT_UNMATCHED_CAP,
            index_capacity: constants::DEFAULT_INDEX_INITIAL_CAPACITY,
        }
    }
}

/// One incrementally-indexed log file.
pub struct LogFile {
    path: PathBuf,
    file: Option<File>,
    line_buffer: Box<dyn LineBuffer>,
    driver: FormatDriver,
    index: LineIndex,

    /// Byte offset one past the last fully-indexed byte.
    index_size: u64,
    stat_snapshot: StatSnapshot,
    content_id: u64,
    longest_line: u64,
    partial_line: bool,
    out_of_time_order_count: u32,
    sort_needed: bool,
    index_time: i64,
    text_format: Option<TextFormat>,

    /// Single-slot cache: `(anchor_offset, length)` for the last
    /// `line_length(.., include_continues=false)` computation.
    next_line_cache: Option<(u64, u64)>,
}

impl std::fmt::Debug for LogFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFile")
            .field("path", &self.path)
            .field("index_size", &self.index_size)
            .field("lines", &self.index.len())
            .field("locked_format", &self.driver.active_name())
            .finish()
    }
}

impl LogFile {
    /// Open `path`, stat it, require a regular file, and prepare an empty
    /// index ready for `rebuild_index`.
    pub fn open(path: impl AsRef<Path>, registry: FormatRegistry, options: OpenOptions) -> Result<Self> {
        let raw_path = path.as_ref().to_path_buf();
        let path = std::fs::canonicalize(&raw_path).map_err(|e| {
            LogdexError::Open(OpenError::PathResolution {
                path: raw_path.clone(),
                source: e,
            })
        })?;

        let snapshot = fs::stat(&path).map_err(|e| {
            LogdexError::Open(OpenError::Stat {
                path: path.clone(),
                source: e,
            })
        })?;
        if !path.is_file() {
            return Err(LogdexError::Open(OpenError::NotRegularFile { path: path.clone() }));
        }

        let file = fs::open_read(&path).map_err(|e| {
            LogdexError::Open(OpenError::Open {
                path: path.clone(),
                source: e,
            })
        })?;
        let cloned = file.try_clone().map_err(|e| LogdexError::Io {
            path: path.clone(),
            operation: "clone file handle",
            source: e,
        })?;
        let line_buffer = linebuffer::open_line_buffer(cloned).map_err(|e| LogdexError::Io {
            path: path.clone(),
            operation: "open line buffer transport",
            source: e,
        })?;

        let driver = FormatDriver::new(registry, options.detect_format, options.unmatched_cap);
        let mut index = LineIndex::new();
        index.reserve_hint(options.index_capacity);

        let content_id = hash_str(&path.to_string_lossy());

        tracing::debug!(path = %path.display(), size = snapshot.size, "opened log file");

        Ok(LogFile {
            path,
            file: Some(file),
            line_buffer,
            driver,
            index,
            index_size: 0,
            stat_snapshot: snapshot,
            content_id,
            longest_line: 0,
            partial_line: false,
            out_of_time_order_count: 0,
            sort_needed: false,
            index_time: snapshot.mtime,
            text_format: None,
            next_line_cache: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &LineIndex {
        &self.index
    }

    pub fn index_size(&self) -> u64 {
        self.index_size
    }

    pub fn content_id(&self) -> u64 {
        self.content_id
    }

    pub fn text_format(&self) -> Option<TextFormat> {
        self.text_format
    }

    pub fn is_locked(&self) -> bool {
        self.driver.is_locked()
    }

    pub fn active_format_name(&self) -> Option<&str> {
        self.driver.active_name()
    }

    pub fn out_of_time_order_count(&self) -> u32 {
        self.out_of_time_order_count
    }

    pub fn longest_line(&self) -> u64 {
        self.longest_line
    }

    pub fn partial_line(&self) -> bool {
        self.partial_line
    }

    /// Whether the file this object was opened from still exists as the
    /// same file. A changed device/inode or a shrunken size both report
    /// false, since the original content is gone either way.
    pub fn exists(&self) -> bool {
        match fs::stat(&self.path) {
            Ok(current) => {
                current.same_file(&self.stat_snapshot) && current.size >= self.stat_snapshot.size
            }
            Err(_) => false,
        }
    }

    /// Run one incremental indexing pass. Performs I/O; mutates the index;
    /// notifies `observer` synchronously in index order.
    pub fn rebuild_index(&mut self, observer: &mut dyn IndexObserver) -> Result<RebuildOutcome> {
        let Some(file) = self.file.as_ref() else {
            return Ok(RebuildOutcome::NoNewLines);
        };

        let fresh_stat = fs::fstat(file).map_err(|e| {
            LogdexError::Index(IndexError::Stat {
                path: self.path.clone(),
                source: e,
            })
        })?;

        // Rotation / overwrite check.
        if fresh_stat.size < self.stat_snapshot.size
            || (fresh_stat.size == self.stat_snapshot.size && fresh_stat.mtime != self.stat_snapshot.mtime)
        {
            tracing::warn!(path = %self.path.display(), "file overwritten or rotated; closing");
            self.close();
            return Ok(RebuildOutcome::NoNewLines);
        }

        if !self
            .line_buffer
            .is_data_available(self.index_size)
            .map_err(|e| self.line_buffer_failed(e))?
        {
            self.index_time = resolve_index_time(self.line_buffer.as_ref(), &fresh_stat);
            return Ok(RebuildOutcome::NoNewLines);
        }

        if let Err(e) = self.rollback_tail(observer) {
            tracing::warn!(path = %self.path.display(), error = %e, "rollback verification failed; closing");
            self.close();
            return Ok(RebuildOutcome::Invalid);
        }

        if self.index.is_empty() && self.text_format.is_none() {
            if let Ok(sample) = self.line_buffer.read_range(FileRange {
                offset: 0,
                length: self.index_size.max(constants::IO_BUFFER_SIZE as u64).min(fresh_stat.size),
            }) {
                self.text_format = Some(textformat::detect_text_format(&sample));
            }
        }

        let filename = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let initial_entry_count = self.index.len();
        let mut lines_appended = 0u64;
        let was_locked_at_start = self.driver.is_locked();

        loop {
            let Some(line_info) = self
                .line_buffer
                .load_next_line(self.index_size)
                .map_err(|e| self.line_buffer_failed(e))?
            else {
                break;
            };

            if line_info.range.length == 0 {
                break;
            }

            self.index_size = line_info.range.next_offset();
            self.partial_line = line_info.partial;
            self.longest_line = self.longest_line.max(line_info.range.length);

            let raw = self
                .line_buffer
                .read_range(line_info.range)
                .map_err(|e| self.classify_range_error(line_info.range.offset, line_info.range.length, e))?;
            let trimmed = rtrim_line_ending(&raw);

            let ctx = ScanContext {
                filename: &filename,
                index_time: self.index_time,
            };
            let prev_len = self.index.len();
            let outcome = self.driver.feed(&ctx, &mut self.index, &line_info, trimmed);

            self.sort_needed |= outcome.sort_needed;
            self.out_of_time_order_count += outcome.clamped;

            if outcome.lock_just_happened {
                self.content_id = hash_bytes(trimmed);
                tracing::info!(
                    path = %self.path.display(),
                    format = self.driver.active_name().unwrap_or("?"),
                    "format locked in"
                );
            }

            for pos in prev_len..self.index.len() {
                lines_appended += 1;
                observer.new_line(self, pos, trimmed);
            }

            tracing::trace!(
                path = %self.path.display(),
                offset = self.index_size,
                size = fresh_stat.size,
                "indexing progress"
            );
            observer.progress(self, self.index_size, fresh_stat.size);

            // Yield the moment a format locks in so the caller can observe
            // the schema transition before more bytes are consumed.
            if !was_locked_at_start && self.driver.is_locked() {
                break;
            }
        }

        observer.eof(self);

        if initial_entry_count == 0 && self.index_size > 512 * 1024 {
            tracing::debug!(
                path = %self.path.display(),
                bytes = self.index_size,
                "initial bulk index pass completed"
            );
        }

        self.index_time = resolve_index_time(self.line_buffer.as_ref(), &fresh_stat);
        self.stat_snapshot = fresh_stat;

        if self.out_of_time_order_count > 0 {
            tracing::warn!(
                path = %self.path.display(),
                count = self.out_of_time_order_count,
                "out-of-order timestamps clamped this pass"
            );
        }
        let sort_needed = self.sort_needed;
        self.sort_needed = false;
        self.out_of_time_order_count = 0;

        if lines_appended == 0 {
            return Ok(RebuildOutcome::NoNewLines);
        }
        Ok(if sort_needed {
            RebuildOutcome::NewOrder
        } else {
            RebuildOutcome::NewLines
        })
    }

    /// Pop the last anchor (and its continuations) and re-verify the bytes
    /// backing it are still intact before re-scanning from there.
    fn rollback_tail(&mut self, observer: &mut dyn IndexObserver) -> Result<()> {
        if self.index.is_empty() {
            return Ok(());
        }

        let Some(last) = self.index.last().copied() else {
            return Ok(());
        };
        // Find the anchor offset: walk back to the start of the final record.
        let mut anchor_offset = last.offset();
        for line in self.index.iter().rev() {
            if line.sub_offset() == 0 {
                anchor_offset = line.offset();
                break;
            }
        }

        let removed = self.index.truncate_last_record();
        self.next_line_cache = None;
        self.line_buffer.clear();

        let verify_len = self.index_size.saturating_sub(anchor_offset);
        if verify_len > 0 {
            self.line_buffer
                .read_range(FileRange {
                    offset: anchor_offset,
                    length: verify_len,
                })
                .map_err(|e| self.classify_range_error(anchor_offset, verify_len, e))?;
        }

        self.index_size = anchor_offset;
        if removed > 0 {
            observer.restart(self, removed);
        }
        Ok(())
    }

    /// Compute the byte range for `read_line`/`read_full_message`.
    fn get_file_range(&mut self, pos: usize, include_continues: bool) -> Option<FileRange> {
        let line = *self.index.get(pos)?;
        let length = self.line_length(pos, include_continues)?;
        Some(FileRange {
            offset: line.offset(),
            length,
        })
    }

    /// Length in bytes of the record starting at index position `pos`,
    /// walking forward until the next distinct anchor (or, when
    /// `include_continues` is true, the next non-continuation line).
    fn line_length(&mut self, pos: usize, include_continues: bool) -> Option<u64> {
        let line = *self.index.get(pos)?;

        if !include_continues {
            if let Some((cached_offset, cached_len)) = self.next_line_cache {
                if cached_offset == line.offset() {
                    return Some(cached_len);
                }
            }
        }

        let mut next_pos = pos + 1;
        let len = loop {
            match self.index.get(next_pos) {
                Some(next) if next.offset() == line.offset() => {
                    next_pos += 1;
                }
                Some(next) if include_continues && next.is_continued() => {
                    next_pos += 1;
                }
                Some(next) => {
                    break next.offset() - line.offset() - 1;
                }
                None => {
                    break if self.partial_line {
                        self.index_size - line.offset()
                    } else {
                        self.index_size.saturating_sub(line.offset()).saturating_sub(1)
                    };
                }
            }
        };

        if !include_continues {
            self.next_line_cache = Some((line.offset(), len));
        }
        Some(len)
    }

    /// Read one line's displayable bytes: the raw range, right-trimmed,
    /// UTF-8-scrubbed if invalid, and delegated to the active format's
    /// subline extractor if one is locked.
    pub fn read_line(&mut self, pos: usize) -> std::result::Result<Vec<u8>, String> {
        let range = self
            .get_file_range(pos, false)
            .ok_or_else(|| format!("no such line at position {pos}"))?;
        let line = *self.index.get(pos).ok_or("line vanished")?;

        let raw = self
            .line_buffer
            .read_range(range)
            .map_err(|e| format!("read failed: {e}"))?;
        let trimmed = rtrim_line_ending(&raw).to_vec();

        let scrubbed = if line.is_valid_utf() {
            trimmed
        } else {
            String::from_utf8_lossy(&trimmed).into_owned().into_bytes()
        };

        Ok(self.driver.get_subline(&line, &scrubbed, false))
    }

    /// Read a full multi-line record (anchor plus its continuations).
    /// `sub_offset` of the line at `pos` must be 0.
    pub fn read_full_message(&mut self, pos: usize) -> Option<Vec<u8>> {
        let line = *self.index.get(pos)?;
        if line.sub_offset() != 0 {
            return None;
        }
        let range = self.get_file_range(pos, true)?;
        let raw = self.line_buffer.read_range(range).ok()?;
        let trimmed = rtrim_line_ending(&raw).to_vec();
        Some(self.driver.get_subline(&line, &trimmed, true))
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn line_buffer_failed(&self, e: std::io::Error) -> LogdexError {
        LogdexError::Index(IndexError::LineBufferError {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Classify a `read_range` failure: an `UnexpectedEof` means the
    /// transport couldn't satisfy the specific range asked for (e.g. a
    /// forward-only gzip stream whose cursor is already past it), which
    /// gets its own variant so callers can tell it apart from a generic
    /// I/O failure.
    fn classify_range_error(&self, offset: u64, length: u64, e: std::io::Error) -> LogdexError {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            LogdexError::Index(IndexError::RangeUnavailable {
                path: self.path.clone(),
                offset,
                length,
            })
        } else {
            self.line_buffer_failed(e)
        }
    }
}

/// Trim a single trailing `\n` or `\r\n` from `bytes`, in place semantics via
/// a returned subslice.
fn rtrim_line_ending(bytes: &[u8]) -> &[u8] {
    let mut end = bytes.len();
    if end > 0 && bytes[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && bytes[end - 1] == b'\r' {
            end -= 1;
        }
    }
    &bytes[..end]
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

fn hash_str(s: &str) -> u64 {
    hash_bytes(s.as_bytes())
}

/// Prefer the line buffer's own file-time hint (e.g. a timestamp encoded in
/// a compressed archive header) over the plain stat mtime; fall back to the
/// stat mtime when the buffer has none to offer.
fn resolve_index_time(line_buffer: &dyn LineBuffer, stat: &fs::StatSnapshot) -> i64 {
    let hint = line_buffer.file_time();
    if hint != 0 { hint } else { stat.mtime }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::observer::NullObserver;
    use crate::core::profile::{parse_profile_toml, validate_and_compile};
    use crate::core::profile_format::ProfileFormat;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn registry_with_generic() -> FormatRegistry {
        let content = include_str!("../../profiles/generic_timestamp.toml");
        let path = PathBuf::from("generic_timestamp.toml");
        let def = parse_profile_toml(content, &path).unwrap();
        let profile = Arc::new(validate_and_compile(def, &path).unwrap());
        let mut registry = FormatRegistry::new();
        registry.register(Box::new(ProfileFormat::new(profile)));
        registry
    }

    #[test]
    fn empty_file_rebuilds_to_no_new_lines() {
        let tmp = NamedTempFile::new().unwrap();
        let mut logfile = LogFile::open(tmp.path(), registry_with_generic(), OpenOptions::default()).unwrap();
        let mut observer = NullObserver;
        let outcome = logfile.rebuild_index(&mut observer).unwrap();
        assert_eq!(outcome, RebuildOutcome::NoNewLines);
        assert_eq!(logfile.index_size(), 0);
        assert!(logfile.index().is_empty());
    }

    #[test]
    fn single_complete_line_indexes_and_locks_format() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "2024-01-01 00:00:00 INFO hello").unwrap();
        tmp.flush().unwrap();

        let mut logfile = LogFile::open(tmp.path(), registry_with_generic(), OpenOptions::default()).unwrap();
        let mut observer = NullObserver;
        let outcome = logfile.rebuild_index(&mut observer).unwrap();
        assert_eq!(outcome, RebuildOutcome::NewLines);
        assert_eq!(logfile.index().len(), 1);
        assert!(logfile.is_locked());
    }

    #[test]
    fn rerunning_rebuild_with_no_changes_yields_no_new_lines() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "2024-01-01 00:00:00 INFO hello").unwrap();
        tmp.flush().unwrap();

        let mut logfile = LogFile::open(tmp.path(), registry_with_generic(), OpenOptions::default()).unwrap();
        let mut observer = NullObserver;
        logfile.rebuild_index(&mut observer).unwrap();
        let second = logfile.rebuild_index(&mut observer).unwrap();
        assert_eq!(second, RebuildOutcome::NoNewLines);
        assert_eq!(logfile.index().len(), 1);
    }

    #[test]
    fn append_after_initial_index_yields_new_lines() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "2024-01-01 00:00:00 INFO hello").unwrap();
        tmp.flush().unwrap();

        let mut logfile = LogFile::open(tmp.path(), registry_with_generic(), OpenOptions::default()).unwrap();
        let mut observer = NullObserver;
        logfile.rebuild_index(&mut observer).unwrap();

        writeln!(tmp, "2024-01-01 00:00:01 INFO world").unwrap();
        tmp.flush().unwrap();

        let outcome = logfile.rebuild_index(&mut observer).unwrap();
        assert_eq!(outcome, RebuildOutcome::NewLines);
        assert_eq!(logfile.index().len(), 2);
    }

    #[test]
    fn truncation_is_detected_as_rotation() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "2024-01-01 00:00:00 INFO hello").unwrap();
        tmp.flush().unwrap();

        let mut logfile = LogFile::open(tmp.path(), registry_with_generic(), OpenOptions::default()).unwrap();
        let mut observer = NullObserver;
        logfile.rebuild_index(&mut observer).unwrap();

        tmp.as_file().set_len(0).unwrap();
        tmp.as_file().sync_all().unwrap();

        let outcome = logfile.rebuild_index(&mut observer).unwrap();
        assert_eq!(outcome, RebuildOutcome::NoNewLines);
        assert!(!logfile.exists());
    }

    #[test]
    fn partial_last_line_is_reindexed_once_completed() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "2024-01-01 00:00:00 INFO partial").unwrap();
        tmp.flush().unwrap();

        let mut logfile = LogFile::open(tmp.path(), registry_with_generic(), OpenOptions::default()).unwrap();
        let mut observer = NullObserver;
        logfile.rebuild_index(&mut observer).unwrap();
        assert_eq!(logfile.index().len(), 1);

        writeln!(tmp, " line").unwrap();
        tmp.flush().unwrap();

        logfile.rebuild_index(&mut observer).unwrap();
        assert_eq!(logfile.index().len(), 1);
    }
}
