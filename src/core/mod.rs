// logdex - core/mod.rs
//
// Core indexing engine.
// Dependencies: std, plus the regex/chrono/memmap2/flate2 crates needed for
// format recognition and I/O transports.
// Must NOT depend on: any CLI, UI, or directory-discovery layer.

pub mod format;
pub mod index;
pub mod linebuffer;
pub mod logfile;
pub mod logline;
pub mod observer;
pub mod profile;
pub mod profile_format;
pub mod textformat;
