// logdex - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Crate metadata
// =============================================================================

/// Crate version (from Cargo.toml).
pub const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Format detection
// =============================================================================

/// Number of consecutive unmatched lines the driver will tolerate before
/// giving up on auto-detection for the remainder of the file.
pub const DEFAULT_AUTO_DETECT_UNMATCHED_CAP: usize = 1_000;

// =============================================================================
// Index / parsing limits
// =============================================================================

/// Initial `Vec` capacity reserved for a freshly created `LineIndex`.
/// Avoids the first handful of reallocations for the common case of a file
/// that already has a few hundred lines by the time it's first opened.
pub const DEFAULT_INDEX_INITIAL_CAPACITY: usize = 1_024;

/// Maximum size of a single logical line (including continuations) in bytes.
/// Lines longer than this are truncated so a single malformed record cannot
/// exhaust memory.
pub const DEFAULT_MAX_LINE_SIZE: usize = 64 * 1024; // 64 KB

/// Maximum regex pattern length accepted from a format profile, to prevent
/// pathological (ReDoS-prone) patterns from being compiled.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

/// Maximum size of a profile TOML document in bytes.
pub const MAX_PROFILE_FILE_SIZE: u64 = 64 * 1024; // 64 KB

// =============================================================================
// Line buffer I/O
// =============================================================================

/// Read buffer size used for non-memory-mapped reads (gzip decompression,
/// header sniffing). 128 KB amortises syscall overhead on both local disks
/// and network shares.
pub const IO_BUFFER_SIZE: usize = 128 * 1024;

/// Chunk size used when pulling additional bytes out of a gzip stream to
/// satisfy a `load_next_line` call.
pub const GZIP_READ_CHUNK_SIZE: usize = 64 * 1024;

// =============================================================================
// Logging
// =============================================================================

/// Default log level used when neither `RUST_LOG` nor an explicit level is
/// supplied.
pub const DEFAULT_LOG_LEVEL: &str = "info";
