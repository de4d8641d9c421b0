// logdex - core/format.rs
//
// The pluggable recognizer interface, and the detect-then-lock driver that
// sits between a `LogFile` and whichever concrete `LogFormat` ends up
// claiming the file.

use crate::core::index::LineIndex;
use crate::core::linebuffer::LineInfo;
use crate::core::logline::{LogLine, Severity};
use crate::util::constants;

/// Outcome of offering one line's bytes to a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanResult {
    /// The line was recognised and (at least) one entry was appended to
    /// the index.
    Match,
    /// The line does not belong to this format.
    NoMatch,
    /// Not enough bytes are available yet to decide (e.g. a multi-line
    /// record whose terminator hasn't arrived). No entry was appended.
    Incomplete,
}

/// A pluggable log format recognizer.
///
/// An instance may be used two ways: as a *candidate*, probed against the
/// first few lines of an unclassified file, or as the *locked* format once
/// one candidate has matched, via `specialized()`.
pub trait LogFormat: std::fmt::Debug {
    /// Cheap pre-filter: does this format's naming convention plausibly
    /// apply to a file with this name? Returning `true` unconditionally is
    /// valid for a name-agnostic format.
    fn match_name(&self, filename: &str) -> bool;

    /// Reset any scanning state so this instance can be tried again from a
    /// clean slate (used when probing multiple candidates against the same
    /// line).
    fn reset(&mut self);

    /// Produce the instance that continues scanning after this candidate
    /// has won detection. Most formats just clone themselves.
    fn specialized(&self) -> Box<dyn LogFormat>;

    /// Offer one line's raw bytes to the format. On `Match`, the format
    /// must append at least one `LogLine` to `index`.
    fn scan(
        &mut self,
        ctx: &ScanContext,
        index: &mut LineIndex,
        line_info: &LineInfo,
        bytes: &[u8],
    ) -> ScanResult;

    /// Reconstruct the displayable text for `line`, given its raw bytes.
    /// `expand_continues` controls whether folded continuation lines are
    /// included.
    fn get_subline(&self, line: &LogLine, bytes: &[u8], expand_continues: bool) -> Vec<u8>;

    /// Human-readable format name, for diagnostics.
    fn name(&self) -> &str;

    /// Whether this format's own line ordering should be trusted as-is
    /// (true), or whether the driver must actively enforce ascending time
    /// order by clamping regressions (false triggers a full-index sort
    /// instead, since per-line clamping cannot fix an unordered source).
    fn is_time_ordered(&self) -> bool;

    /// Seed the format's notion of "now" for formats whose timestamps omit
    /// a year or otherwise need an anchor (the file's own mtime, normally).
    fn set_base_time(&mut self, seconds: i64);
}

/// Read-only context passed into every `scan` call.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'a> {
    pub filename: &'a str,
    /// Timestamp assigned to the file's very first line if nothing better
    /// is known (typically the file's mtime at open time).
    pub index_time: i64,
}

/// A set of candidate formats to probe against an unclassified file.
#[derive(Debug, Default)]
pub struct FormatRegistry {
    formats: Vec<Box<dyn LogFormat>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        FormatRegistry { formats: Vec::new() }
    }

    pub fn register(&mut self, format: Box<dyn LogFormat>) {
        self.formats.push(format);
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Box<dyn LogFormat>> {
        self.formats.iter_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

/// What happened as a result of feeding one line through the driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedOutcome {
    /// The index's earliest timestamp changed as a side effect of this
    /// scan (lock-in rewrite, or a non-time-ordered format reshuffling
    /// entries); the index must be re-sorted before further comparisons
    /// rely on ascending order.
    pub sort_needed: bool,
    /// A candidate format locked in on this call.
    pub lock_just_happened: bool,
    /// How many entries newly appended by this call had their timestamp
    /// clamped forward to repair a regression.
    pub clamped: u32,
    /// No format consumed the line (detection hasn't locked, and no
    /// candidate matched, or the locked format returned `NoMatch`); a
    /// continuation/placeholder entry was appended instead.
    pub unmatched: bool,
}

/// Drives format detection: probes candidates while unlocked, delegates to
/// the locked format afterward, and enforces the auto-detect unmatched-line
/// cap.
#[derive(Debug)]
pub struct FormatDriver {
    registry: FormatRegistry,
    active: Option<Box<dyn LogFormat>>,
    unmatched_lines: usize,
    auto_detect: bool,
    unmatched_cap: usize,
}

impl FormatDriver {
    pub fn new(registry: FormatRegistry, auto_detect: bool, unmatched_cap: usize) -> Self {
        FormatDriver {
            registry,
            active: None,
            unmatched_lines: 0,
            auto_detect,
            unmatched_cap,
        }
    }

    pub fn with_defaults(registry: FormatRegistry, auto_detect: bool) -> Self {
        Self::new(registry, auto_detect, constants::DEFAULT_AUTO_DETECT_UNMATCHED_CAP)
    }

    pub fn is_locked(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_ref().map(|f| f.name())
    }

    /// Force-lock a format without going through detection (used when a
    /// caller already knows the format, e.g. from a prior session).
    pub fn lock(&mut self, format: Box<dyn LogFormat>) {
        self.active = Some(format);
    }

    /// Reconstruct `line`'s displayable text, delegating to the locked
    /// format if one has claimed the file, or returning `bytes` unchanged
    /// otherwise.
    pub fn get_subline(&self, line: &LogLine, bytes: &[u8], expand_continues: bool) -> Vec<u8> {
        match self.active.as_ref() {
            Some(fmt) => fmt.get_subline(line, bytes, expand_continues),
            None => bytes.to_vec(),
        }
    }

    pub fn feed(
        &mut self,
        ctx: &ScanContext,
        index: &mut LineIndex,
        line_info: &LineInfo,
        bytes: &[u8],
    ) -> FeedOutcome {
        let prev_len = index.len();
        let prev_last = index.last().copied();
        let head_before = index.first_time_key();

        if let Some(fmt) = self.active.as_mut() {
            let result = fmt.scan(ctx, index, line_info, bytes);
            return match result {
                ScanResult::Match => finish_match(
                    fmt.is_time_ordered(),
                    index,
                    prev_len,
                    prev_last,
                    head_before,
                    line_info,
                ),
                ScanResult::Incomplete => FeedOutcome::default(),
                ScanResult::NoMatch => {
                    self.append_unmatched(index, ctx, line_info, true);
                    FeedOutcome {
                        unmatched: true,
                        ..Default::default()
                    }
                }
            };
        }

        if self.auto_detect && self.unmatched_lines < self.unmatched_cap {
            for candidate in self.registry.formats.iter_mut() {
                if !candidate.match_name(ctx.filename) {
                    continue;
                }
                candidate.reset();
                candidate.set_base_time(ctx.index_time);
                match candidate.scan(ctx, index, line_info, bytes) {
                    ScanResult::Match => {
                        let specialized = candidate.specialized();
                        let time_ordered = specialized.is_time_ordered();
                        let anchor = *index.last().expect("Match must append an entry");
                        rewrite_prefix_timestamps(index, anchor.time(), anchor.millis());
                        self.active = Some(specialized);

                        let mut outcome = finish_match(
                            time_ordered,
                            index,
                            prev_len,
                            prev_last,
                            head_before,
                            line_info,
                        );
                        outcome.lock_just_happened = true;
                        outcome.sort_needed = true;
                        return outcome;
                    }
                    ScanResult::Incomplete => return FeedOutcome::default(),
                    ScanResult::NoMatch => continue,
                }
            }
        }

        self.append_unmatched(index, ctx, line_info, false);
        FeedOutcome {
            unmatched: true,
            ..Default::default()
        }
    }

    fn append_unmatched(
        &mut self,
        index: &mut LineIndex,
        ctx: &ScanContext,
        line_info: &LineInfo,
        locked: bool,
    ) {
        let (time, millis, module_id, opid, severity) = match index.last() {
            Some(prev) => (
                prev.time(),
                prev.millis(),
                prev.module_id(),
                prev.opid(),
                if locked { prev.severity() } else { Severity::Unknown },
            ),
            None => (ctx.index_time, 0, 0, 0, Severity::Unknown),
        };

        let mut line = LogLine::new(line_info.range.offset, time, millis, severity);
        line.set_valid_utf(line_info.valid_utf);
        line.set_module_id(module_id);
        line.set_opid(opid);
        if locked {
            line.set_continued(true);
        }
        index.push(line);
        self.unmatched_lines += 1;
    }
}

fn finish_match(
    time_ordered: bool,
    index: &mut LineIndex,
    prev_len: usize,
    prev_last: Option<LogLine>,
    head_before: Option<(i64, u16)>,
    line_info: &LineInfo,
) -> FeedOutcome {
    let mut outcome = FeedOutcome::default();

    if let Some(last) = index.last_mut() {
        last.set_valid_utf(line_info.valid_utf);
    }

    if let Some(prev) = prev_last {
        if let Some(new_last) = index.last().copied() {
            if new_last.time_key() < prev.time_key() {
                if time_ordered {
                    let clamp_key = prev.time_key();
                    for line in index.as_mut_slice()[prev_len..].iter_mut() {
                        line.set_time(clamp_key.0);
                        line.set_millis(clamp_key.1);
                        line.set_time_skew(true);
                    }
                    outcome.clamped += (index.len() - prev_len) as u32;
                } else {
                    outcome.sort_needed = true;
                }
            }
        }
    }

    if index.first_time_key() != head_before {
        outcome.sort_needed = true;
    }

    outcome
}

fn rewrite_prefix_timestamps(index: &mut LineIndex, time: i64, millis: u16) {
    let len = index.len();
    if len == 0 {
        return;
    }
    for line in index.as_mut_slice()[..len - 1].iter_mut() {
        line.set_time(time);
        line.set_millis(millis);
    }
}
