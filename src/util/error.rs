// logdex - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation; every error preserves its causal
// chain so callers can log or match on the underlying cause.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all logdex operations.
#[derive(Debug)]
pub enum LogdexError {
    /// Format profile loading or validation failed.
    Profile(ProfileError),

    /// `LogFile::open` construction failed.
    Open(OpenError),

    /// An index rebuild pass failed.
    Index(IndexError),

    /// I/O error with path context, for construction-time steps that don't
    /// fit a more specific `OpenError` variant (e.g. duplicating a file
    /// handle for the line buffer transport).
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for LogdexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profile(e) => write!(f, "profile error: {e}"),
            Self::Open(e) => write!(f, "open error: {e}"),
            Self::Index(e) => write!(f, "index error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for LogdexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Profile(e) => Some(e),
            Self::Open(e) => Some(e),
            Self::Index(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<ProfileError> for LogdexError {
    fn from(e: ProfileError) -> Self {
        Self::Profile(e)
    }
}

impl From<OpenError> for LogdexError {
    fn from(e: OpenError) -> Self {
        Self::Open(e)
    }
}

impl From<IndexError> for LogdexError {
    fn from(e: IndexError) -> Self {
        Self::Index(e)
    }
}

// ---------------------------------------------------------------------------
// Profile errors
// ---------------------------------------------------------------------------

/// Errors related to format profile loading and validation.
#[derive(Debug)]
pub enum ProfileError {
    /// TOML document could not be parsed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Profile document exceeds the maximum allowed size.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// A required field is missing from the profile definition.
    MissingField {
        profile_id: String,
        field: &'static str,
    },

    /// A regex pattern in the profile is invalid.
    InvalidRegex {
        profile_id: String,
        field: &'static str,
        pattern: String,
        source: regex::Error,
    },

    /// A regex pattern exceeds the maximum allowed length.
    RegexTooLong {
        profile_id: String,
        field: &'static str,
        length: usize,
        max_length: usize,
    },

    /// I/O error reading a profile document.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "failed to parse TOML '{}': {source}", path.display())
            }
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "profile '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::MissingField { profile_id, field } => {
                write!(
                    f,
                    "profile '{profile_id}': missing required field '{field}'"
                )
            }
            Self::InvalidRegex {
                profile_id,
                field,
                pattern,
                source,
            } => write!(
                f,
                "profile '{profile_id}': invalid regex in '{field}' ('{pattern}'): {source}"
            ),
            Self::RegexTooLong {
                profile_id,
                field,
                length,
                max_length,
            } => write!(
                f,
                "profile '{profile_id}': regex in '{field}' is {length} chars, \
                 exceeds maximum of {max_length}"
            ),
            Self::Io { path, source } => {
                write!(
                    f,
                    "I/O error reading profile '{}': {source}",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for ProfileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::InvalidRegex { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Construction (open) errors
// ---------------------------------------------------------------------------

/// Errors that can fail `LogFile::open`. Distinct from `IndexError`
/// (rebuild-time failures) per §7/§10.2: a caller can match on these to
/// tell "this path never opened" apart from "this already-open file failed
/// mid-rebuild".
#[derive(Debug)]
pub enum OpenError {
    /// The path could not be resolved (e.g. a broken symlink, or a
    /// component that isn't a directory).
    PathResolution { path: PathBuf, source: io::Error },

    /// `stat` on the resolved path failed.
    Stat { path: PathBuf, source: io::Error },

    /// The path exists but is not a regular file.
    NotRegularFile { path: PathBuf },

    /// Permission denied, or another OS-level failure, opening the file.
    Open { path: PathBuf, source: io::Error },
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathResolution { path, source } => {
                write!(f, "failed to resolve '{}': {source}", path.display())
            }
            Self::Stat { path, source } => {
                write!(f, "failed to stat '{}': {source}", path.display())
            }
            Self::NotRegularFile { path } => {
                write!(f, "'{}' is not a regular file", path.display())
            }
            Self::Open { path, source } => {
                write!(f, "failed to open '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PathResolution { source, .. } => Some(source),
            Self::Stat { source, .. } => Some(source),
            Self::NotRegularFile { .. } => None,
            Self::Open { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Index (rebuild) errors
// ---------------------------------------------------------------------------

/// Errors during an index rebuild pass on an already-open `LogFile`.
#[derive(Debug)]
pub enum IndexError {
    /// `fstat` on the already-open file handle failed.
    Stat { path: PathBuf, source: io::Error },

    /// The line buffer failed to read or scan; the file handle is closed
    /// and the index's prior contents are left untouched.
    LineBufferError { path: PathBuf, source: io::Error },

    /// The line buffer could not satisfy a `read_range` request (e.g. the
    /// requested range lies beyond what a forward-only transport has
    /// decompressed so far, and restarting from the beginning also failed).
    RangeUnavailable {
        path: PathBuf,
        offset: u64,
        length: u64,
    },
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stat { path, source } => {
                write!(f, "fstat failed on '{}': {source}", path.display())
            }
            Self::LineBufferError { path, source } => {
                write!(f, "line buffer read failed on '{}': {source}", path.display())
            }
            Self::RangeUnavailable {
                path,
                offset,
                length,
            } => write!(
                f,
                "'{}': range [{offset}, {offset}+{length}) is not available from the line buffer",
                path.display()
            ),
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Stat { source, .. } => Some(source),
            Self::LineBufferError { source, .. } => Some(source),
            Self::RangeUnavailable { .. } => None,
        }
    }
}

/// Convenience type alias for logdex results.
pub type Result<T> = std::result::Result<T, LogdexError>;
