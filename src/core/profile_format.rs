// logdex - core/profile_format.rs
//
// The general-purpose, data-driven `LogFormat`: a compiled TOML profile
// (regex-anchored single-line records with named capture groups) plus a
// tiered timestamp sniffer used when the structured `timestamp` capture is
// absent or fails to parse.

use crate::core::format::{LogFormat, ScanContext, ScanResult};
use crate::core::index::LineIndex;
use crate::core::linebuffer::LineInfo;
use crate::core::logline::{LogLine, Severity};
use crate::core::profile::CompiledProfile;
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// A `LogFormat` driven entirely by a `CompiledProfile`. Stateless beyond the
/// base-time anchor and the module/opid string interning tables, so cloning
/// for `specialized()` is cheap.
#[derive(Debug, Clone)]
pub struct ProfileFormat {
    profile: Arc<CompiledProfile>,
    base_time: i64,
    module_ids: HashMap<String, u16>,
    opid_ids: HashMap<String, u16>,
}

impl ProfileFormat {
    pub fn new(profile: Arc<CompiledProfile>) -> Self {
        ProfileFormat {
            profile,
            base_time: 0,
            module_ids: HashMap::new(),
            opid_ids: HashMap::new(),
        }
    }

    /// Intern `value` into `table`, assigning the next free id (saturating at
    /// `u16::MAX`, after which every further distinct value collapses onto
    /// the last slot - acceptable for a diagnostic grouping tag).
    fn intern(table: &mut HashMap<String, u16>, value: &str) -> u16 {
        if let Some(id) = table.get(value) {
            return *id;
        }
        let id = table.len().min(u16::MAX as usize) as u16;
        table.insert(value.to_string(), id);
        id
    }

    fn parse_line(&mut self, text: &str) -> Option<(i64, u16, Severity, u16, u16)> {
        let caps = self.profile.line_pattern.captures(text)?;

        let message = caps.name("message").map(|m| m.as_str()).unwrap_or(text);

        let severity = if let Some(level) = caps.name("level") {
            let mapped = self.profile.map_severity(level.as_str());
            if mapped == Severity::Unknown {
                self.profile.infer_severity_from_message(message)
            } else {
                mapped
            }
        } else {
            self.profile.infer_severity_from_message(message)
        };

        let (time, millis) = match caps.name("timestamp") {
            Some(ts) => match parse_timestamp(ts.as_str(), &self.profile.timestamp_format, self.base_time) {
                Ok(dt) => (dt.timestamp(), (dt.timestamp_subsec_millis()) as u16),
                Err(_) => match sniff_timestamp(text, self.base_time) {
                    Some(dt) => (dt.timestamp(), dt.timestamp_subsec_millis() as u16),
                    None => (self.base_time, 0),
                },
            },
            None => match sniff_timestamp(text, self.base_time) {
                Some(dt) => (dt.timestamp(), dt.timestamp_subsec_millis() as u16),
                None => (self.base_time, 0),
            },
        };

        let module_id = match caps.name("module") {
            Some(m) => Self::intern(&mut self.module_ids, m.as_str()),
            None => 0,
        };
        let opid = match caps.name("opid") {
            Some(o) => Self::intern(&mut self.opid_ids, o.as_str()),
            None => 0,
        };

        Some((time, millis, severity, module_id, opid))
    }
}

impl LogFormat for ProfileFormat {
    fn match_name(&self, filename: &str) -> bool {
        self.profile.match_name(filename)
    }

    fn reset(&mut self) {
        // Stateless beyond base_time/interning tables, neither of which
        // needs clearing between probe attempts on different lines.
    }

    fn specialized(&self) -> Box<dyn LogFormat> {
        Box::new(self.clone())
    }

    fn scan(
        &mut self,
        ctx: &ScanContext,
        index: &mut LineIndex,
        line_info: &LineInfo,
        bytes: &[u8],
    ) -> ScanResult {
        let owned;
        let text: &str = match std::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(_) => {
                owned = String::from_utf8_lossy(bytes).into_owned();
                &owned
            }
        };

        if index.is_empty() && !self.profile.content_match.is_match(text) {
            // Cheap early reject when probing an unclassified file's first
            // line: if even the loose content-detection regex doesn't fire,
            // don't bother running the (more expensive) line pattern.
            return ScanResult::NoMatch;
        }

        match self.parse_line(text) {
            Some((time, millis, severity, module_id, opid)) => {
                let mut line = LogLine::new(line_info.range.offset, time, millis, severity);
                line.set_valid_utf(line_info.valid_utf);
                line.set_module_id(module_id);
                line.set_opid(opid);
                index.push(line);
                ScanResult::Match
            }
            None => {
                let _ = ctx;
                ScanResult::NoMatch
            }
        }
    }

    fn get_subline(&self, line: &LogLine, bytes: &[u8], expand_continues: bool) -> Vec<u8> {
        let _ = (line, expand_continues);
        bytes.to_vec()
    }

    fn name(&self) -> &str {
        &self.profile.name
    }

    fn is_time_ordered(&self) -> bool {
        self.profile.time_ordered
    }

    fn set_base_time(&mut self, seconds: i64) {
        self.base_time = seconds;
    }
}

// =============================================================================
// Timestamp parsing - the profile's own format string, with fallbacks
// =============================================================================

/// Parse `raw` using `format`, trying several real-world variants before
/// giving up. `base_time` seeds the year for year-less formats (BSD syslog).
fn parse_timestamp(raw: &str, format: &str, base_time: i64) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();

    if let Ok(ndt) = NaiveDateTime::parse_from_str(trimmed, format) {
        return Ok(ndt.and_utc());
    }

    if let Ok(nd) = chrono::NaiveDate::parse_from_str(trimmed, format) {
        if let Some(ndt) = nd.and_hms_opt(0, 0, 0) {
            return Ok(ndt.and_utc());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.into());
    }

    let normalised = trimmed.replace('/', "-").replace('T', " ");
    if normalised != trimmed {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&normalised, format) {
            return Ok(ndt.and_utc());
        }
        if let Ok(nd) = chrono::NaiveDate::parse_from_str(&normalised, format) {
            if let Some(ndt) = nd.and_hms_opt(0, 0, 0) {
                return Ok(ndt.and_utc());
            }
        }
    }

    if !format.contains("%Y") && !format.contains("%y") && !format.contains("%C") {
        let year = base_time_year(base_time);
        let with_year = format!("{year} {trimmed}");
        let year_format = format!("%Y {format}");
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&with_year, &year_format) {
            return Ok(ndt.and_utc());
        }
    }

    Err(format!("cannot parse '{trimmed}' with format '{format}'"))
}

fn base_time_year(base_time: i64) -> i32 {
    DateTime::from_timestamp(base_time, 0)
        .map(|dt| dt.year())
        .unwrap_or_else(|| Utc::now().year())
}

/// Best-effort fallback: find and parse any recognisable timestamp embedded
/// anywhere in `raw_line`, trying patterns from most- to least-precise.
fn sniff_timestamp(raw_line: &str, base_time: i64) -> Option<DateTime<Utc>> {
    struct Sniffer {
        re: Regex,
        parse: fn(&str, i64) -> Option<DateTime<Utc>>,
    }

    static SNIFFERS: OnceLock<Vec<Sniffer>> = OnceLock::new();

    let sniffers = SNIFFERS.get_or_init(|| {
        fn re(pat: &str) -> Regex {
            Regex::new(pat).expect("sniff_timestamp: invalid regex")
        }

        vec![
            // Tier 1: RFC 3339 / ISO 8601 with explicit timezone.
            Sniffer {
                re: re(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})"),
                parse: |s, _base| {
                    let fixed = if s.len() > 20 {
                        let tail = &s[s.len().saturating_sub(5)..];
                        if !tail.contains(':') && (tail.starts_with('+') || tail.starts_with('-')) {
                            format!("{}{}", &s[..s.len() - 4], &format!("{}:{}", &tail[..3], &tail[3..]))
                        } else {
                            s.to_owned()
                        }
                    } else {
                        s.to_owned()
                    };
                    DateTime::parse_from_rfc3339(&fixed).ok().map(|dt| dt.into())
                },
            },
            // Tier 2: ISO 8601 with comma milliseconds (log4j style).
            Sniffer {
                re: re(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2},\d+"),
                parse: |s, _base| {
                    let s = s.replace(',', ".").replace('T', " ");
                    NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                        .ok()
                        .map(|ndt| ndt.and_utc())
                },
            },
            // Tier 3: ISO 8601 without timezone, optional dot-millis.
            Sniffer {
                re: re(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?"),
                parse: |s, _base| {
                    let s = s.replace('T', " ");
                    NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                        .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S"))
                        .ok()
                        .map(|ndt| ndt.and_utc())
                },
            },
            // Tier 4: slash year-first.
            Sniffer {
                re: re(r"\d{4}/\d{2}/\d{2}[ T]\d{2}:\d{2}:\d{2}(?:\.\d+)?"),
                parse: |s, _base| {
                    let s = s.replace('/', "-").replace('T', " ");
                    NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                        .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S"))
                        .ok()
                        .map(|ndt| ndt.and_utc())
                },
            },
            // Tier 5: dot day-first (Veeam style).
            Sniffer {
                re: re(r"\d{2}\.\d{2}\.\d{4} \d{2}:\d{2}:\d{2}(?:\.\d+)?"),
                parse: |s, _base| {
                    NaiveDateTime::parse_from_str(s, "%d.%m.%Y %H:%M:%S%.f")
                        .or_else(|_| NaiveDateTime::parse_from_str(s, "%d.%m.%Y %H:%M:%S"))
                        .ok()
                        .map(|ndt| ndt.and_utc())
                },
            },
            // Tier 6: Apache combined log.
            Sniffer {
                re: re(r"\d{2}/[A-Za-z]{3}/\d{4}:\d{2}:\d{2}:\d{2} [+-]\d{4}"),
                parse: |s, _base| {
                    DateTime::parse_from_str(s, "%d/%b/%Y:%H:%M:%S %z").ok().map(|dt| dt.into())
                },
            },
            // Tier 7: slash-delimited, 4-digit year (US/GB disambiguation).
            Sniffer {
                re: re(r"\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}"),
                parse: |s, _base| {
                    let mut parts = s.splitn(3, '/');
                    let (first, second) = match (
                        parts.next().and_then(|p| p.parse::<u32>().ok()),
                        parts.next().and_then(|p| p.parse::<u32>().ok()),
                    ) {
                        (Some(a), Some(b)) => (a, b),
                        _ => return None,
                    };
                    if first > 12 {
                        NaiveDateTime::parse_from_str(s, "%d/%m/%Y %H:%M:%S").ok().map(|ndt| ndt.and_utc())
                    } else if second > 12 {
                        NaiveDateTime::parse_from_str(s, "%m/%d/%Y %H:%M:%S").ok().map(|ndt| ndt.and_utc())
                    } else {
                        NaiveDateTime::parse_from_str(s, "%m/%d/%Y %H:%M:%S")
                            .or_else(|_| NaiveDateTime::parse_from_str(s, "%d/%m/%Y %H:%M:%S"))
                            .ok()
                            .map(|ndt| ndt.and_utc())
                    }
                },
            },
            // Tier 8: slash-delimited, 2-digit year (Windows DHCP style).
            Sniffer {
                re: re(r"\d{2}/\d{2}/\d{2},\d{2}:\d{2}:\d{2}"),
                parse: |s, _base| {
                    let mut parts = s.splitn(3, '/');
                    let (first, second) = match (
                        parts.next().and_then(|p| p.parse::<u32>().ok()),
                        parts.next().and_then(|p| p.parse::<u32>().ok()),
                    ) {
                        (Some(a), Some(b)) => (a, b),
                        _ => return None,
                    };
                    if first > 12 {
                        NaiveDateTime::parse_from_str(s, "%d/%m/%y,%H:%M:%S").ok().map(|ndt| ndt.and_utc())
                    } else if second > 12 {
                        NaiveDateTime::parse_from_str(s, "%m/%d/%y,%H:%M:%S").ok().map(|ndt| ndt.and_utc())
                    } else {
                        NaiveDateTime::parse_from_str(s, "%m/%d/%y,%H:%M:%S")
                            .or_else(|_| NaiveDateTime::parse_from_str(s, "%d/%m/%y,%H:%M:%S"))
                            .ok()
                            .map(|ndt| ndt.and_utc())
                    }
                },
            },
            // Tier 9: month-name with 4-digit year.
            Sniffer {
                re: re(r"[A-Z][a-z]{2,8} \d{1,2},? \d{4} \d{2}:\d{2}:\d{2}"),
                parse: |s, _base| {
                    let s = s.replace(',', " ");
                    let s: String = s.split_whitespace().collect::<Vec<_>>().join(" ");
                    NaiveDateTime::parse_from_str(&s, "%b %d %Y %H:%M:%S").ok().map(|ndt| ndt.and_utc())
                },
            },
            // Tier 10: BSD syslog year-less. Year injected from base_time.
            Sniffer {
                re: re(r"[A-Z][a-z]{2} [ \d]\d \d{2}:\d{2}:\d{2}"),
                parse: |s, base| {
                    let year = base_time_year(base);
                    let with_year = format!("{year} {s}");
                    NaiveDateTime::parse_from_str(&with_year, "%Y %b %e %H:%M:%S")
                        .ok()
                        .map(|ndt| ndt.and_utc())
                },
            },
            // Tier 11: compact ISO.
            Sniffer {
                re: re(r"\d{8}[T ]\d{6}"),
                parse: |s, _base| {
                    let s = s.replace(' ', "T");
                    NaiveDateTime::parse_from_str(&s, "%Y%m%dT%H%M%S").ok().map(|ndt| ndt.and_utc())
                },
            },
            // Tier 12: Unix epoch seconds (line-start anchor only).
            Sniffer {
                re: re(r"^\d{10}(?:\.\d+)?"),
                parse: |s, _base| {
                    let (secs_str, _) = s.split_once('.').unwrap_or((s, ""));
                    secs_str.parse::<i64>().ok().and_then(|secs| DateTime::from_timestamp(secs, 0))
                },
            },
        ]
    });

    for sniffer in sniffers {
        if let Some(m) = sniffer.re.find(raw_line) {
            if let Some(dt) = (sniffer.parse)(m.as_str(), base_time) {
                return Some(dt);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::{parse_profile_toml, validate_and_compile};
    use std::path::PathBuf;

    fn generic_profile() -> Arc<CompiledProfile> {
        let content = include_str!("../../profiles/generic_timestamp.toml");
        let path = PathBuf::from("generic_timestamp.toml");
        let def = parse_profile_toml(content, &path).unwrap();
        Arc::new(validate_and_compile(def, &path).unwrap())
    }

    fn line_info(offset: u64) -> LineInfo {
        use crate::core::linebuffer::FileRange;
        LineInfo {
            range: FileRange { offset, length: 1 },
            partial: false,
            valid_utf: true,
        }
    }

    #[test]
    fn matches_iso_timestamped_line() {
        let mut fmt = ProfileFormat::new(generic_profile());
        let mut index = LineIndex::new();
        let ctx = ScanContext { filename: "app.log", index_time: 0 };
        let bytes = b"2024-01-15 14:30:22 ERROR something broke";
        let result = fmt.scan(&ctx, &mut index, &line_info(0), bytes);
        assert_eq!(result, ScanResult::Match);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(0).unwrap().severity(), Severity::Error);
    }

    #[test]
    fn non_matching_line_returns_no_match() {
        let mut fmt = ProfileFormat::new(generic_profile());
        let mut index = LineIndex::new();
        let ctx = ScanContext { filename: "app.log", index_time: 0 };
        let bytes = b"this is not a timestamped line at all";
        let result = fmt.scan(&ctx, &mut index, &line_info(0), bytes);
        assert_eq!(result, ScanResult::NoMatch);
        assert!(index.is_empty());
    }

    #[test]
    fn sniff_timestamp_parses_rfc3339() {
        let dt = sniff_timestamp("level=info ts=2024-01-15T14:30:22Z msg=hi", 0);
        assert!(dt.is_some());
        assert_eq!(dt.unwrap().timestamp(), 1705329022);
    }

    #[test]
    fn sniff_timestamp_parses_year_less_syslog_with_base_year() {
        let base = DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z").unwrap().timestamp();
        let dt = sniff_timestamp("Jan 15 14:30:22 host proc[1]: message", base);
        assert!(dt.is_some());
        assert_eq!(dt.unwrap().year(), 2024);
    }

    #[test]
    fn module_and_opid_interning_is_stable_per_value() {
        let mut fmt = ProfileFormat::new(generic_profile());
        let mut table = HashMap::new();
        let a = ProfileFormat::intern(&mut table, "auth");
        let b = ProfileFormat::intern(&mut table, "net");
        let a2 = ProfileFormat::intern(&mut table, "auth");
        assert_eq!(a, a2);
        assert_ne!(a, b);
        let _ = &mut fmt;
    }
}
