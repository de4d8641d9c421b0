// logdex - core/linebuffer.rs
//
// I/O abstraction between a `LogFile` and the bytes backing it. Two
// transports are provided: a memory-mapped reader for plain files, and a
// forward-decompressing reader for gzip-compressed logs. Both present the
// same logical-offset-based interface so `rebuild_index` never needs to
// know which one it's driving.

use crate::util::constants;
use std::fs::File;
use std::io::{self, Read};

/// A byte range within a file, identified by its logical start offset and
/// length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileRange {
    pub offset: u64,
    pub length: u64,
}

impl FileRange {
    pub fn next_offset(&self) -> u64 {
        self.offset + self.length
    }
}

/// Metadata about one line discovered by `load_next_line`.
#[derive(Debug, Clone, Copy)]
pub struct LineInfo {
    pub range: FileRange,
    /// True if the range was not newline-terminated (end of currently
    /// available data reached mid-line).
    pub partial: bool,
    /// True if the line's bytes are valid UTF-8.
    pub valid_utf: bool,
}

/// I/O transport a `LogFile` reads through. Implementations track their own
/// forward cursor; `load_next_line` always advances from the logical
/// position given to it.
pub trait LineBuffer: std::fmt::Debug {
    /// Re-point this buffer at a freshly opened handle on the same logical
    /// file (used after detecting the underlying file was replaced).
    fn rebind(&mut self, file: File) -> io::Result<()>;

    /// Current known length of available data, which may lag the true file
    /// size for streaming transports until more has been pulled through.
    fn is_data_available(&mut self, index_size: u64) -> io::Result<bool>;

    /// Attempt to read the next line starting at `index_size`. Returns
    /// `None` if no complete or partial line is available yet.
    fn load_next_line(&mut self, index_size: u64) -> io::Result<Option<LineInfo>>;

    /// Read the raw bytes for an already-identified range. Used both for
    /// message extraction and for the rebuild engine's rollback-verification
    /// re-read of the last indexed anchor.
    fn read_range(&mut self, range: FileRange) -> io::Result<Vec<u8>>;

    /// The file's own notion of modification time (seconds since epoch),
    /// where the transport can determine one; zero otherwise.
    fn file_time(&self) -> i64;

    /// Drop any cached decompressed/mapped state and restart from the
    /// beginning of the underlying file on the next read. Called when a
    /// rollback-verification read needs bytes behind a forward-only
    /// transport's cursor.
    fn clear(&mut self);
}

/// Sniff the gzip magic bytes (`1f 8b`) and construct the matching
/// `LineBuffer` implementation.
pub fn open_line_buffer(mut file: File) -> io::Result<Box<dyn LineBuffer>> {
    use std::io::{Seek, SeekFrom};

    let mut magic = [0u8; 2];
    let start = file.stream_position()?;
    let n = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(start))?;

    if n == 2 && magic == [0x1f, 0x8b] {
        Ok(Box::new(GzipLineBuffer::new(file)?))
    } else {
        Ok(Box::new(PlainLineBuffer::new(file)?))
    }
}

// =============================================================================
// Plain file, memory-mapped
// =============================================================================

/// Reads an uncompressed file through a memory map, re-mapping whenever the
/// file grows past the currently mapped length.
pub struct PlainLineBuffer {
    file: File,
    mmap: Option<memmap2::Mmap>,
    mapped_len: u64,
}

impl std::fmt::Debug for PlainLineBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainLineBuffer")
            .field("mapped_len", &self.mapped_len)
            .finish()
    }
}

impl PlainLineBuffer {
    pub fn new(file: File) -> io::Result<Self> {
        let mut buffer = PlainLineBuffer {
            file,
            mmap: None,
            mapped_len: 0,
        };
        buffer.ensure_mapped()?;
        Ok(buffer)
    }

    fn ensure_mapped(&mut self) -> io::Result<()> {
        let len = self.file.metadata()?.len();
        if len == self.mapped_len && self.mmap.is_some() {
            return Ok(());
        }
        if len == 0 {
            self.mmap = None;
            self.mapped_len = 0;
            return Ok(());
        }
        // Safety: the mapping is read-only and the file is not expected to
        // shrink out from under it mid-scan; `rebuild_index` re-stats the
        // file before every read and rebinds on rotation/truncation.
        let mmap = unsafe { memmap2::Mmap::map(&self.file)? };
        self.mapped_len = len;
        self.mmap = Some(mmap);
        Ok(())
    }
}

impl LineBuffer for PlainLineBuffer {
    fn rebind(&mut self, file: File) -> io::Result<()> {
        self.file = file;
        self.mmap = None;
        self.mapped_len = 0;
        self.ensure_mapped()
    }

    fn is_data_available(&mut self, index_size: u64) -> io::Result<bool> {
        let len = self.file.metadata()?.len();
        Ok(len > index_size)
    }

    fn load_next_line(&mut self, index_size: u64) -> io::Result<Option<LineInfo>> {
        self.ensure_mapped()?;
        let Some(mmap) = self.mmap.as_ref() else {
            return Ok(None);
        };
        let len = self.mapped_len;
        if index_size >= len {
            return Ok(None);
        }

        let start = index_size as usize;
        let slice = &mmap[start..len as usize];
        match slice.iter().position(|&b| b == b'\n') {
            Some(nl) => Ok(Some(LineInfo {
                range: FileRange {
                    offset: index_size,
                    length: (nl as u64) + 1,
                },
                partial: false,
                valid_utf: std::str::from_utf8(&slice[..nl]).is_ok(),
            })),
            None => {
                // No newline yet. If the pending data has already grown past
                // the single-line cap, force a break here rather than
                // waiting indefinitely for a terminator that may never
                // arrive (e.g. a binary file handed to the indexer by
                // mistake) - the line is still marked `partial` so a future
                // rebuild picks up the remainder.
                let length = (slice.len() as u64).min(constants::DEFAULT_MAX_LINE_SIZE as u64);
                Ok(Some(LineInfo {
                    range: FileRange {
                        offset: index_size,
                        length,
                    },
                    partial: true,
                    valid_utf: std::str::from_utf8(&slice[..length as usize]).is_ok(),
                }))
            }
        }
    }

    fn read_range(&mut self, range: FileRange) -> io::Result<Vec<u8>> {
        self.ensure_mapped()?;
        let mmap = self
            .mmap
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "empty file"))?;
        let start = range.offset as usize;
        let end = range.next_offset() as usize;
        if end > mmap.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "range extends past mapped length",
            ));
        }
        Ok(mmap[start..end].to_vec())
    }

    fn file_time(&self) -> i64 {
        self.file
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn clear(&mut self) {
        self.mmap = None;
        self.mapped_len = 0;
    }
}

// =============================================================================
// Gzip transport
// =============================================================================

/// Reads a gzip-compressed file by decompressing forward into a growing
/// buffer. `read_range` and `load_next_line` are both satisfied from this
/// buffer; `clear()` discards it and restarts decompression from the start
/// of the file, which is the only way a forward-only transport can answer
/// a read behind its current cursor.
pub struct GzipLineBuffer {
    file: File,
    decoder: Option<flate2::read::GzDecoder<File>>,
    buffer: Vec<u8>,
    eof: bool,
    mtime: i64,
}

impl std::fmt::Debug for GzipLineBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipLineBuffer")
            .field("buffered", &self.buffer.len())
            .field("eof", &self.eof)
            .finish()
    }
}

impl GzipLineBuffer {
    pub fn new(file: File) -> io::Result<Self> {
        let mtime = file
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut buffer = GzipLineBuffer {
            file,
            decoder: None,
            buffer: Vec::new(),
            eof: false,
            mtime,
        };
        buffer.restart()?;
        Ok(buffer)
    }

    fn restart(&mut self) -> io::Result<()> {
        use std::io::{Seek, SeekFrom};
        self.file.seek(SeekFrom::Start(0))?;
        self.decoder = Some(flate2::read::GzDecoder::new(self.file.try_clone()?));
        self.buffer.clear();
        self.eof = false;
        Ok(())
    }

    /// Pull more decompressed bytes until at least `target_len` bytes are
    /// buffered, or the stream is exhausted.
    fn fill_to(&mut self, target_len: u64) -> io::Result<()> {
        if self.eof {
            return Ok(());
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(());
        };
        let mut chunk = vec![0u8; constants::GZIP_READ_CHUNK_SIZE];
        while (self.buffer.len() as u64) < target_len {
            let n = decoder.read(&mut chunk)?;
            if n == 0 {
                self.eof = true;
                break;
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }
}

impl LineBuffer for GzipLineBuffer {
    fn rebind(&mut self, file: File) -> io::Result<()> {
        self.file = file;
        self.restart()
    }

    fn is_data_available(&mut self, index_size: u64) -> io::Result<bool> {
        if (self.buffer.len() as u64) <= index_size && !self.eof {
            self.fill_to(index_size + 1)?;
        }
        Ok((self.buffer.len() as u64) > index_size)
    }

    fn load_next_line(&mut self, index_size: u64) -> io::Result<Option<LineInfo>> {
        if !self.is_data_available(index_size)? {
            return Ok(None);
        }
        let start = index_size as usize;
        loop {
            if let Some(nl) = self.buffer[start..].iter().position(|&b| b == b'\n') {
                return Ok(Some(LineInfo {
                    range: FileRange {
                        offset: index_size,
                        length: (nl as u64) + 1,
                    },
                    partial: false,
                    valid_utf: std::str::from_utf8(&self.buffer[start..start + nl]).is_ok(),
                }));
            }
            let pending = self.buffer.len() - start;
            if self.eof || pending as u64 >= constants::DEFAULT_MAX_LINE_SIZE as u64 {
                let slice = &self.buffer[start..];
                if slice.is_empty() {
                    return Ok(None);
                }
                let length = (slice.len() as u64).min(constants::DEFAULT_MAX_LINE_SIZE as u64);
                return Ok(Some(LineInfo {
                    range: FileRange {
                        offset: index_size,
                        length,
                    },
                    partial: true,
                    valid_utf: std::str::from_utf8(&slice[..length as usize]).is_ok(),
                }));
            }
            self.fill_to(self.buffer.len() as u64 + constants::GZIP_READ_CHUNK_SIZE as u64)?;
        }
    }

    fn read_range(&mut self, range: FileRange) -> io::Result<Vec<u8>> {
        if self.buffer.len() as u64 <= range.next_offset() && !self.eof {
            self.fill_to(range.next_offset())?;
        }
        let start = range.offset as usize;
        let end = range.next_offset() as usize;
        if end > self.buffer.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "range extends past decompressed length",
            ));
        }
        Ok(self.buffer[start..end].to_vec())
    }

    fn file_time(&self) -> i64 {
        self.mtime
    }

    fn clear(&mut self) {
        let _ = self.restart();
    }
}
