// logdex - core/index.rs
//
// The flat, append-only line store a `LogFile` builds incrementally.
// Truncation only ever removes a contiguous run from the tail, mirroring
// the rebuild engine's rollback-to-last-anchor step.

use crate::core::logline::LogLine;
use crate::util::constants;

/// An appendable, truncatable store of `LogLine` records in file order.
#[derive(Debug, Default)]
pub struct LineIndex {
    lines: Vec<LogLine>,
}

impl LineIndex {
    pub fn new() -> Self {
        LineIndex {
            lines: Vec::with_capacity(constants::DEFAULT_INDEX_INITIAL_CAPACITY),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn push(&mut self, line: LogLine) {
        self.lines.push(line);
    }

    /// Reserve additional capacity so the first `additional` pushes don't
    /// reallocate. Used when a caller knows a larger initial size up front
    /// than the default reservation.
    pub fn reserve_hint(&mut self, additional: usize) {
        if additional > self.lines.capacity() {
            self.lines.reserve(additional - self.lines.capacity());
        }
    }

    pub fn get(&self, pos: usize) -> Option<&LogLine> {
        self.lines.get(pos)
    }

    pub fn get_mut(&mut self, pos: usize) -> Option<&mut LogLine> {
        self.lines.get_mut(pos)
    }

    pub fn last(&self) -> Option<&LogLine> {
        self.lines.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut LogLine> {
        self.lines.last_mut()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogLine> {
        self.lines.iter()
    }

    pub fn as_slice(&self) -> &[LogLine] {
        &self.lines
    }

    pub fn as_mut_slice(&mut self) -> &mut [LogLine] {
        &mut self.lines
    }

    /// `(time, millis)` of the first entry, if any - used to detect whether
    /// a scan call changed the index's earliest timestamp.
    pub fn first_time_key(&self) -> Option<(i64, u16)> {
        self.lines.first().map(|l| l.time_key())
    }

    /// Remove and return the last entry, if any.
    pub fn pop(&mut self) -> Option<LogLine> {
        self.lines.pop()
    }

    /// Truncate the index by removing the last anchor and every continuation
    /// line folded into it. Returns the number of entries removed.
    ///
    /// An "anchor" is any entry with `sub_offset() == 0`; continuations that
    /// follow it share its conceptual record. Walking backward from the end,
    /// this pops continuations first, then the anchor itself.
    pub fn truncate_last_record(&mut self) -> usize {
        let mut removed = 0;
        while let Some(last) = self.lines.last() {
            let was_anchor = last.sub_offset() == 0;
            self.lines.pop();
            removed += 1;
            if was_anchor {
                break;
            }
        }
        removed
    }

    /// Drop every entry at or after `pos`. Used when a rollback-verification
    /// read shows the on-disk bytes backing an already-indexed anchor have
    /// changed (the file was overwritten in place rather than rotated).
    pub fn truncate_from(&mut self, pos: usize) {
        self.lines.truncate(pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::logline::Severity;

    fn anchor(offset: u64, time: i64) -> LogLine {
        LogLine::new(offset, time, 0, Severity::Info)
    }

    fn continuation(offset: u64, time: i64, sub: u32) -> LogLine {
        let mut line = LogLine::new(offset, time, 0, Severity::Info);
        line.set_sub_offset(sub);
        line.set_continued(true);
        line
    }

    #[test]
    fn truncate_last_record_removes_anchor_and_its_continuations() {
        let mut index = LineIndex::new();
        index.push(anchor(0, 1));
        index.push(anchor(10, 2));
        index.push(continuation(20, 2, 1));
        index.push(continuation(30, 2, 2));

        let removed = index.truncate_last_record();
        assert_eq!(removed, 3);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(0).unwrap().offset(), 0);
    }

    #[test]
    fn truncate_last_record_on_single_anchor_empties_index() {
        let mut index = LineIndex::new();
        index.push(anchor(0, 1));
        assert_eq!(index.truncate_last_record(), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn truncate_from_drops_suffix() {
        let mut index = LineIndex::new();
        index.push(anchor(0, 1));
        index.push(anchor(10, 2));
        index.push(anchor(20, 3));
        index.truncate_from(1);
        assert_eq!(index.len(), 1);
    }
}
