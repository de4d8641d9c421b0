// logdex - core/logline.rs
//
// The indexed unit: one entry per anchor line and one per continuation
// line swallowed into the preceding anchor. Fixed-size and `Copy` so a
// `LineIndex` is a flat, cache-friendly `Vec`.

use bitflags::bitflags;

bitflags! {
    /// Packed per-line flag bits, stored alongside `Severity` in
    /// `get_level_and_flags()`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LineFlags: u8 {
        /// This line was appended because it did not match the active
        /// format (or none had locked in yet); it continues its
        /// predecessor rather than starting a new record.
        const CONTINUED = 0b0000_0001;
        /// This line's parsed timestamp was clamped forward to preserve
        /// the time-ordered invariant; its observed time was earlier than
        /// the previous entry.
        const TIME_SKEW = 0b0000_0010;
        /// The raw bytes backing this line were valid UTF-8.
        const VALID_UTF = 0b0000_0100;
    }
}

/// Normalised severity, ordered from most to least severe.
///
/// Format recognizers map their own level vocabulary onto this fixed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
    #[default]
    Unknown,
}

impl Severity {
    /// All variants, most severe first.
    pub fn all() -> &'static [Severity] {
        &[
            Severity::Critical,
            Severity::Error,
            Severity::Warning,
            Severity::Info,
            Severity::Debug,
            Severity::Unknown,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Info => "Info",
            Severity::Debug => "Debug",
            Severity::Unknown => "Unknown",
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Error => 1,
            Severity::Warning => 2,
            Severity::Info => 3,
            Severity::Debug => 4,
            Severity::Unknown => 5,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Severity::Critical,
            1 => Severity::Error,
            2 => Severity::Warning,
            3 => Severity::Info,
            4 => Severity::Debug,
            _ => Severity::Unknown,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One indexed line: either the anchor of a record recognised by the active
/// format, or a continuation/unmatched line folded into its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLine {
    offset: u64,
    sub_offset: u32,
    time: i64,
    millis: u16,
    flags: LineFlags,
    severity: Severity,
    module_id: u16,
    opid: u16,
}

impl LogLine {
    pub fn new(offset: u64, time: i64, millis: u16, severity: Severity) -> Self {
        LogLine {
            offset,
            sub_offset: 0,
            time,
            millis,
            flags: LineFlags::empty(),
            severity,
            module_id: 0,
            opid: 0,
        }
    }

    /// Byte offset in the file where this line's raw bytes begin.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn sub_offset(&self) -> u32 {
        self.sub_offset
    }

    pub fn set_sub_offset(&mut self, sub_offset: u32) {
        self.sub_offset = sub_offset;
    }

    /// Whole seconds since the Unix epoch.
    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn set_time(&mut self, time: i64) {
        self.time = time;
    }

    pub fn millis(&self) -> u16 {
        self.millis
    }

    pub fn set_millis(&mut self, millis: u16) {
        self.millis = millis;
    }

    /// Sort key: `(time, millis)` ascending, as required by the time-ordered
    /// invariant.
    pub fn time_key(&self) -> (i64, u16) {
        (self.time, self.millis)
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn set_severity(&mut self, severity: Severity) {
        self.severity = severity;
    }

    pub fn module_id(&self) -> u16 {
        self.module_id
    }

    pub fn set_module_id(&mut self, module_id: u16) {
        self.module_id = module_id;
    }

    pub fn opid(&self) -> u16 {
        self.opid
    }

    pub fn set_opid(&mut self, opid: u16) {
        self.opid = opid;
    }

    pub fn is_continued(&self) -> bool {
        self.flags.contains(LineFlags::CONTINUED)
    }

    pub fn set_continued(&mut self, value: bool) {
        self.flags.set(LineFlags::CONTINUED, value);
    }

    pub fn is_time_skew(&self) -> bool {
        self.flags.contains(LineFlags::TIME_SKEW)
    }

    pub fn set_time_skew(&mut self, value: bool) {
        self.flags.set(LineFlags::TIME_SKEW, value);
    }

    pub fn is_valid_utf(&self) -> bool {
        self.flags.contains(LineFlags::VALID_UTF)
    }

    pub fn set_valid_utf(&mut self, value: bool) {
        self.flags.set(LineFlags::VALID_UTF, value);
    }

    /// Severity packed into the high bits, flag bits in the low bits -
    /// the wire-sized representation named `level_and_flags`.
    pub fn get_level_and_flags(&self) -> u16 {
        ((self.severity.as_u8() as u16) << 8) | self.flags.bits() as u16
    }

    pub fn set_level_and_flags(&mut self, packed: u16) {
        self.severity = Severity::from_u8((packed >> 8) as u8);
        self.flags = LineFlags::from_bits_truncate((packed & 0xff) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_key_orders_by_time_then_millis() {
        let a = LogLine::new(0, 100, 500, Severity::Info);
        let b = LogLine::new(10, 100, 900, Severity::Info);
        let c = LogLine::new(20, 101, 0, Severity::Info);
        assert!(a.time_key() < b.time_key());
        assert!(b.time_key() < c.time_key());
    }

    #[test]
    fn level_and_flags_round_trip() {
        let mut line = LogLine::new(0, 0, 0, Severity::Error);
        line.set_continued(true);
        line.set_valid_utf(true);
        let packed = line.get_level_and_flags();

        let mut other = LogLine::new(0, 0, 0, Severity::Unknown);
        other.set_level_and_flags(packed);
        assert_eq!(other.severity(), Severity::Error);
        assert!(other.is_continued());
        assert!(other.is_valid_utf());
        assert!(!other.is_time_skew());
    }
}
