// logdex - core/profile.rs
//
// TOML format profile loading, validation, and compilation into the
// runtime representation `CompiledProfile` consumed by `ProfileFormat`.

use crate::core::logline::Severity;
use crate::util::constants;
use crate::util::error::ProfileError;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

// =============================================================================
// TOML deserialization structures (raw input)
// =============================================================================

/// Raw TOML profile definition as deserialized from a `.toml` document.
/// Validated and compiled into a `CompiledProfile` for runtime use.
#[derive(Debug, Deserialize)]
pub struct ProfileDefinition {
    pub profile: ProfileMeta,
    pub detection: DetectionDef,
    pub parsing: ParsingDef,
    #[serde(default)]
    pub severity_mapping: SeverityMappingDef,
}

#[derive(Debug, Deserialize)]
pub struct ProfileMeta {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DetectionDef {
    #[serde(default)]
    pub file_patterns: Vec<String>,
    pub content_match: String,
}

#[derive(Debug, Deserialize)]
pub struct ParsingDef {
    pub line_pattern: String,
    pub timestamp_format: String,
    /// Whether lines of this format already arrive in non-decreasing time
    /// order (true for almost every real log format). When false, the
    /// driver falls back to a full re-sort instead of clamping regressions.
    #[serde(default = "default_time_ordered")]
    pub time_ordered: bool,
}

fn default_time_ordered() -> bool {
    true
}

#[derive(Debug, Deserialize, Default)]
pub struct SeverityMappingDef {
    #[serde(default)]
    pub critical: Vec<String>,
    #[serde(default)]
    pub error: Vec<String>,
    #[serde(default)]
    pub warning: Vec<String>,
    #[serde(default)]
    pub info: Vec<String>,
    #[serde(default)]
    pub debug: Vec<String>,
}

// =============================================================================
// Compiled runtime representation
// =============================================================================

/// A format profile after TOML parsing and regex compilation - what
/// `ProfileFormat` actually scans with.
#[derive(Debug, Clone)]
pub struct CompiledProfile {
    pub id: String,
    pub name: String,
    pub version: String,

    /// Glob-like filename hints (`*` wildcard only), used by `match_name`.
    pub file_patterns: Vec<String>,

    /// Applied to the first few lines of an unclassified file to decide
    /// whether this profile should be tried.
    pub content_match: Regex,

    /// Applied to every line; named capture groups `timestamp` (required),
    /// `level`, `module`, `opid`, and `message` are read if present.
    pub line_pattern: Regex,

    pub timestamp_format: String,
    pub time_ordered: bool,

    /// Maps normalised `Severity` variants to format-specific level
    /// strings, matched case-insensitively.
    pub severity_mapping: HashMap<Severity, Vec<String>>,
}

impl CompiledProfile {
    /// Determine the normalised severity for a raw level string.
    pub fn map_severity(&self, raw_level: &str) -> Severity {
        let raw_lower = raw_level.to_lowercase();
        for (severity, patterns) in &self.severity_mapping {
            if patterns.iter().any(|p| p.to_lowercase() == raw_lower) {
                return *severity;
            }
        }
        Severity::Unknown
    }

    /// Determine severity by scanning message text for keywords, most
    /// severe match wins. Used for formats with no explicit level field.
    pub fn infer_severity_from_message(&self, message: &str) -> Severity {
        let msg_lower = message.to_lowercase();
        for severity in Severity::all() {
            if let Some(patterns) = self.severity_mapping.get(severity) {
                if patterns.iter().any(|p| msg_lower.contains(&p.to_lowercase())) {
                    return *severity;
                }
            }
        }
        Severity::Info
    }

    /// Whether `filename` plausibly belongs to this profile, per its
    /// `file_patterns` (`*`-wildcard glob subset). An empty pattern list
    /// matches every filename.
    pub fn match_name(&self, filename: &str) -> bool {
        self.file_patterns.is_empty()
            || self
                .file_patterns
                .iter()
                .any(|pattern| glob_like_match(pattern, filename))
    }
}

/// Minimal `*`-wildcard matcher (no `?`, no character classes) - enough for
/// the filename hints format profiles actually use (`Svc.Veeam*.log`).
fn glob_like_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let mut rest = name;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !rest.starts_with(part) {
                return false;
            }
            rest = &rest[part.len()..];
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else if let Some(pos) = rest.find(part) {
            rest = &rest[pos + part.len()..];
        } else {
            return false;
        }
    }
    true
}

// =============================================================================
// Validation and compilation
// =============================================================================

/// Load, validate, and compile a user-supplied profile document from disk.
/// Rejects documents over `MAX_PROFILE_FILE_SIZE` before reading them, so a
/// malformed or hostile path can't be used to exhaust memory.
pub fn load_profile_from_file(path: &std::path::Path) -> Result<CompiledProfile, ProfileError> {
    let metadata = std::fs::metadata(path).map_err(|e| ProfileError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    if metadata.len() > constants::MAX_PROFILE_FILE_SIZE {
        return Err(ProfileError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max_size: constants::MAX_PROFILE_FILE_SIZE,
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ProfileError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let path_buf = path.to_path_buf();
    let def = parse_profile_toml(&content, &path_buf)?;
    validate_and_compile(def, &path_buf)
}

/// Parse a TOML string into a `ProfileDefinition`. `source_path` is used for
/// error messages only.
pub fn parse_profile_toml(
    toml_content: &str,
    source_path: &PathBuf,
) -> Result<ProfileDefinition, ProfileError> {
    toml::from_str(toml_content).map_err(|e| ProfileError::TomlParse {
        path: source_path.clone(),
        source: e,
    })
}

/// Validate a `ProfileDefinition` and compile it into a `CompiledProfile`.
pub fn validate_and_compile(
    def: ProfileDefinition,
    source_path: &PathBuf,
) -> Result<CompiledProfile, ProfileError> {
    let id = &def.profile.id;

    if id.is_empty() {
        return Err(ProfileError::MissingField {
            profile_id: "(empty)".to_string(),
            field: "profile.id",
        });
    }
    if def.profile.name.is_empty() {
        return Err(ProfileError::MissingField {
            profile_id: id.clone(),
            field: "profile.name",
        });
    }
    if def.detection.content_match.is_empty() {
        return Err(ProfileError::MissingField {
            profile_id: id.clone(),
            field: "detection.content_match",
        });
    }
    if def.parsing.line_pattern.is_empty() {
        return Err(ProfileError::MissingField {
            profile_id: id.clone(),
            field: "parsing.line_pattern",
        });
    }
    if def.parsing.timestamp_format.is_empty() {
        return Err(ProfileError::MissingField {
            profile_id: id.clone(),
            field: "parsing.timestamp_format",
        });
    }

    let content_match = compile_regex(id, "detection.content_match", &def.detection.content_match)?;
    let line_pattern = compile_regex(id, "parsing.line_pattern", &def.parsing.line_pattern)?;

    let capture_names: Vec<&str> = line_pattern.capture_names().flatten().collect();
    if !capture_names.contains(&"timestamp") {
        tracing::warn!(
            profile_id = id,
            source = %source_path.display(),
            "profile line_pattern has no 'timestamp' capture group; lines will fall back \
             to the timestamp sniffer"
        );
    }

    let mut severity_mapping = HashMap::new();
    if !def.severity_mapping.critical.is_empty() {
        severity_mapping.insert(Severity::Critical, def.severity_mapping.critical);
    }
    if !def.severity_mapping.error.is_empty() {
        severity_mapping.insert(Severity::Error, def.severity_mapping.error);
    }
    if !def.severity_mapping.warning.is_empty() {
        severity_mapping.insert(Severity::Warning, def.severity_mapping.warning);
    }
    if !def.severity_mapping.info.is_empty() {
        severity_mapping.insert(Severity::Info, def.severity_mapping.info);
    }
    if !def.severity_mapping.debug.is_empty() {
        severity_mapping.insert(Severity::Debug, def.severity_mapping.debug);
    }

    Ok(CompiledProfile {
        id: id.clone(),
        name: def.profile.name,
        version: def.profile.version,
        file_patterns: def.detection.file_patterns,
        content_match,
        line_pattern,
        timestamp_format: def.parsing.timestamp_format,
        time_ordered: def.parsing.time_ordered,
        severity_mapping,
    })
}

fn compile_regex(profile_id: &str, field: &'static str, pattern: &str) -> Result<Regex, ProfileError> {
    if pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
        return Err(ProfileError::RegexTooLong {
            profile_id: profile_id.to_string(),
            field,
            length: pattern.len(),
            max_length: constants::MAX_REGEX_PATTERN_LENGTH,
        });
    }

    Regex::new(pattern).map_err(|e| ProfileError::InvalidRegex {
        profile_id: profile_id.to_string(),
        field,
        pattern: pattern.to_string(),
        source: e,
    })
}

// =============================================================================
// Built-in profiles (embedded at compile time)
// =============================================================================

fn builtin_profile_sources() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "syslog_rfc3164.toml",
            include_str!("../../profiles/syslog_rfc3164.toml"),
        ),
        (
            "generic_timestamp.toml",
            include_str!("../../profiles/generic_timestamp.toml"),
        ),
    ]
}

/// Load and validate the built-in profiles bundled with this crate.
/// Invalid profiles are logged and skipped (non-fatal; this is a bug in the
/// crate, not in the caller's input).
pub fn load_builtin_profiles() -> Vec<CompiledProfile> {
    let mut profiles = Vec::new();

    for (filename, content) in builtin_profile_sources() {
        let path = PathBuf::from(format!("<builtin>/{filename}"));
        match parse_profile_toml(content, &path).and_then(|def| validate_and_compile(def, &path)) {
            Ok(profile) => {
                tracing::debug!(profile_id = %profile.id, "loaded built-in profile");
                profiles.push(profile);
            }
            Err(e) => {
                tracing::error!(file = filename, error = %e, "failed to load built-in profile");
            }
        }
    }

    profiles
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_PROFILE_TOML: &str = r#"
[profile]
id = "test-profile"
name = "Test Profile"
version = "1.0"

[detection]
file_patterns = ["test*.log"]
content_match = '^\[\d{4}-\d{2}-\d{2}'

[parsing]
line_pattern = '^(?P<timestamp>\d{4}-\d{2}-\d{2}\s\d{2}:\d{2}:\d{2})\s(?P<level>\w+)\s+(?P<message>.+)$'
timestamp_format = "%Y-%m-%d %H:%M:%S"

[severity_mapping]
error = ["Error", "ERR"]
warning = ["Warning", "WARN"]
info = ["Info", "INFO"]
"#;

    #[test]
    fn parse_valid_profile() {
        let path = PathBuf::from("test.toml");
        let def = parse_profile_toml(VALID_PROFILE_TOML, &path).unwrap();
        assert_eq!(def.profile.id, "test-profile");
        assert_eq!(def.detection.file_patterns, vec!["test*.log"]);
    }

    #[test]
    fn compile_valid_profile() {
        let path = PathBuf::from("test.toml");
        let def = parse_profile_toml(VALID_PROFILE_TOML, &path).unwrap();
        let profile = validate_and_compile(def, &path).unwrap();
        assert_eq!(profile.id, "test-profile");
        assert!(profile.time_ordered);
    }

    #[test]
    fn severity_mapping_case_insensitive() {
        let path = PathBuf::from("test.toml");
        let def = parse_profile_toml(VALID_PROFILE_TOML, &path).unwrap();
        let profile = validate_and_compile(def, &path).unwrap();
        assert_eq!(profile.map_severity("error"), Severity::Error);
        assert_eq!(profile.map_severity("WARN"), Severity::Warning);
        assert_eq!(profile.map_severity("nonsense"), Severity::Unknown);
    }

    #[test]
    fn missing_required_field() {
        let toml = r#"
[profile]
id = ""
name = "Empty ID"

[detection]
content_match = "test"

[parsing]
line_pattern = "(?P<message>.+)"
timestamp_format = "%Y"
"#;
        let path = PathBuf::from("bad.toml");
        let def = parse_profile_toml(toml, &path).unwrap();
        let result = validate_and_compile(def, &path);
        assert!(matches!(
            result.unwrap_err(),
            ProfileError::MissingField { field: "profile.id", .. }
        ));
    }

    #[test]
    fn invalid_regex_rejected() {
        let toml = r#"
[profile]
id = "bad-regex"
name = "Bad Regex"

[detection]
content_match = "[invalid"

[parsing]
line_pattern = "(?P<message>.+)"
timestamp_format = "%Y"
"#;
        let path = PathBuf::from("bad.toml");
        let def = parse_profile_toml(toml, &path).unwrap();
        let result = validate_and_compile(def, &path);
        assert!(matches!(result.unwrap_err(), ProfileError::InvalidRegex { .. }));
    }

    #[test]
    fn glob_like_match_handles_prefix_and_suffix_wildcards() {
        assert!(glob_like_match("test*.log", "test123.log"));
        assert!(glob_like_match("*.log", "anything.log"));
        assert!(!glob_like_match("test*.log", "other.log"));
        assert!(glob_like_match("exact.log", "exact.log"));
    }

    #[test]
    fn load_builtin_profiles_succeeds() {
        let profiles = load_builtin_profiles();
        assert!(!profiles.is_empty());
        assert!(profiles.iter().any(|p| p.id == "syslog-rfc3164"));
    }

    #[test]
    fn load_profile_from_file_reads_and_compiles() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        tmp.write_all(VALID_PROFILE_TOML.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let profile = load_profile_from_file(tmp.path()).unwrap();
        assert_eq!(profile.id, "test-profile");
    }

    #[test]
    fn load_profile_from_file_rejects_oversized_documents() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        let oversized = "# padding\n".repeat(constants::MAX_PROFILE_FILE_SIZE as usize / 8 + 1);
        tmp.write_all(oversized.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let result = load_profile_from_file(tmp.path());
        assert!(matches!(result.unwrap_err(), ProfileError::FileTooLarge { .. }));
    }
}
