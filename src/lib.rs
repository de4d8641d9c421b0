// logdex - lib.rs
//
// Library entry point: an incremental log file indexer. Format detection,
// time-ordered line index, and live rebuild, suitable as the engine behind
// an interactive log viewer.

pub mod core;
pub mod platform;
pub mod util;
