// logdex - platform/fs.rs
//
// File-identity primitives used to tell whether the path a `LogFile` was
// opened against still refers to the same underlying file, or whether it
// has been rotated (renamed away and replaced) or overwritten in place.

use std::fs::File;
use std::io;
use std::path::Path;

/// A point-in-time snapshot of a file's identity and size, used to detect
/// rotation and in-place truncation between successive rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatSnapshot {
    pub dev: u64,
    pub ino: u64,
    pub size: u64,
    pub mtime: i64,
}

impl StatSnapshot {
    /// Two snapshots identify the same underlying file (same device + inode).
    /// Size and mtime are not part of identity, only of the point-in-time view.
    pub fn same_file(&self, other: &StatSnapshot) -> bool {
        self.dev == other.dev && self.ino == other.ino
    }
}

/// Stat a path and capture its identity/size/mtime.
pub fn stat(path: &Path) -> io::Result<StatSnapshot> {
    let metadata = std::fs::metadata(path)?;
    let (dev, ino) = ids_from_metadata(&metadata);
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    Ok(StatSnapshot {
        dev,
        ino,
        size: metadata.len(),
        mtime,
    })
}

/// Stat an already-open file handle (avoids a second path lookup, and is
/// immune to the path having been reused by an unrelated file in between).
pub fn fstat(file: &File) -> io::Result<StatSnapshot> {
    let metadata = file.metadata()?;
    let (dev, ino) = ids_from_metadata(&metadata);
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    Ok(StatSnapshot {
        dev,
        ino,
        size: metadata.len(),
        mtime,
    })
}

#[cfg(unix)]
fn ids_from_metadata(metadata: &std::fs::Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (metadata.dev(), metadata.ino())
}

#[cfg(not(unix))]
fn ids_from_metadata(metadata: &std::fs::Metadata) -> (u64, u64) {
    // Windows has no std-exposed file index without extra FFI; fall back to
    // a best-effort identity derived from creation time, which is stable
    // across renames but will (rarely) collide for two files created in the
    // same tick. Good enough to detect the common rotation patterns (the
    // new file at the watched path has a different creation time).
    let created = metadata
        .created()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    (0, created)
}

/// Open a file for reading. A thin wrapper kept so callers go through one
/// place that could later add platform-specific open flags. `std::fs::File`
/// already sets close-on-exec on the descriptors it opens on unix.
pub fn open_read(path: &Path) -> io::Result<File> {
    File::open(path)
}
