use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::closed_source;
use crate::{Error, Result};

/// A forward-only origin of bytes.
///
/// Decode filters are byte sources stacked on top of each other; the bottom of
/// the stack is usually a [`SeekableSource`].
pub trait ByteSource {
    /// Reads up to `buf.len()` bytes. Returns `0` once the end of the stream
    /// is reached.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Skips up to `n` bytes and returns how many were actually skipped.
    fn skip(&mut self, n: u64) -> Result<u64> {
        let mut scratch = [0_u8; 512];
        let mut skipped = 0;
        while skipped < n {
            let want = (n - skipped).min(scratch.len() as u64) as usize;
            let read = self.read(&mut scratch[..want])?;
            if read == 0 {
                break;
            }
            skipped += read as u64;
        }
        Ok(skipped)
    }

    /// Rewinds to the first byte.
    fn reset(&mut self) -> Result<()>;

    /// Invalidates the source. Later reads fail.
    fn close(&mut self);

    /// Reads everything that is left and appends it to `out`.
    fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut chunk = [0_u8; 4096];
        let mut total = 0;
        loop {
            let read = self.read(&mut chunk)?;
            if read == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&chunk[..read]);
            total += read;
        }
    }
}

/// A random-access origin of bytes.
pub trait SeekableSource: ByteSource {
    /// Next byte without consuming it, `None` at the end of the stream.
    fn peek(&mut self) -> Result<Option<u8>>;

    /// Moves the cursor. Fails unless `offset` lies in `[0, len)`.
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Current cursor.
    fn position(&self) -> u64;

    /// Total number of bytes.
    fn len(&self) -> Result<u64>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// An independent source covering exactly `[offset, offset + length)`.
    fn sub_range(&self, offset: u64, length: u64) -> Result<Self>
    where
        Self: Sized;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn skip(&mut self, n: u64) -> Result<u64> {
        (**self).skip(n)
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn skip(&mut self, n: u64) -> Result<u64> {
        (**self).skip(n)
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

fn check_range(offset: u64, length: u64, total: u64) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= total => Ok(()),
        _ => Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("range {offset}+{length} is outside of a {total} byte source"),
        ))),
    }
}

fn seek_error(offset: u64, total: u64) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("can't seek to offset {offset} in a {total} byte source"),
    ))
}

/// How a [`MemorySource`] holds the caller's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// Take a private copy. Sub-ranges share that copy.
    Copy,
    /// Keep borrowing the caller's buffer. The caller keeps the buffer and can
    /// reuse it once the source (and every sub-range of it) is dropped; until
    /// then the borrow keeps it from being mutated.
    Borrow,
}

#[derive(Debug, Clone)]
enum Bytes<'a> {
    Owned(Arc<[u8]>),
    Borrowed(&'a [u8]),
}

impl Bytes<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Bytes::Owned(bytes) => bytes,
            Bytes::Borrowed(bytes) => bytes,
        }
    }
}

/// In-memory byte source.
#[derive(Debug, Clone)]
pub struct MemorySource<'a> {
    bytes: Option<Bytes<'a>>,
    start: usize,
    end: usize,
    pos: usize,
}

impl<'a> MemorySource<'a> {
    pub fn new(buffer: &'a [u8], mode: BufferMode) -> Self {
        let bytes = match mode {
            BufferMode::Copy => Bytes::Owned(Arc::from(buffer)),
            BufferMode::Borrow => Bytes::Borrowed(buffer),
        };
        MemorySource {
            bytes: Some(bytes),
            start: 0,
            end: buffer.len(),
            pos: 0,
        }
    }

    /// Whether the source holds a private copy of its bytes.
    pub fn is_copied(&self) -> bool {
        matches!(self.bytes, Some(Bytes::Owned(_)))
    }

    /// Bytes left between the cursor and the end.
    pub fn available(&self) -> usize {
        self.end - self.start - self.pos
    }

    fn window(&self) -> Result<&[u8]> {
        let bytes = self.bytes.as_ref().ok_or_else(closed_source)?;
        Ok(&bytes.as_slice()[self.start..self.end])
    }
}

impl MemorySource<'static> {
    pub fn from_vec(buffer: Vec<u8>) -> Self {
        let end = buffer.len();
        MemorySource {
            bytes: Some(Bytes::Owned(Arc::from(buffer))),
            start: 0,
            end,
            pos: 0,
        }
    }
}

impl ByteSource for MemorySource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let pos = self.pos;
        let window = self.window()?;
        let available = window.len() - pos;
        let count = available.min(buf.len());
        buf[..count].copy_from_slice(&window[pos..pos + count]);
        self.pos += count;
        Ok(count)
    }

    fn skip(&mut self, n: u64) -> Result<u64> {
        self.window()?;
        let skipped = (self.available() as u64).min(n);
        self.pos += skipped as usize;
        Ok(skipped)
    }

    fn reset(&mut self) -> Result<()> {
        self.window()?;
        self.pos = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.bytes = None;
        self.start = 0;
        self.end = 0;
        self.pos = 0;
    }
}

impl SeekableSource for MemorySource<'_> {
    fn peek(&mut self) -> Result<Option<u8>> {
        Ok(self.window()?.get(self.pos).copied())
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        let total = self.window()?.len() as u64;
        if offset >= total {
            return Err(seek_error(offset, total));
        }
        self.pos = offset as usize;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn len(&self) -> Result<u64> {
        Ok(self.window()?.len() as u64)
    }

    fn sub_range(&self, offset: u64, length: u64) -> Result<Self> {
        let total = self.window()?.len() as u64;
        check_range(offset, length, total)?;
        let start = self.start + offset as usize;
        Ok(MemorySource {
            bytes: self.bytes.clone(),
            start,
            end: start + length as usize,
            pos: 0,
        })
    }
}

struct FileHandle {
    file: Mutex<Option<File>>,
}

impl FileHandle {
    fn lock(&self) -> Result<MutexGuard<'_, Option<File>>> {
        self.file
            .lock()
            .map_err(|_| Error::Io(io::Error::other("file handle lock poisoned")))
    }
}

/// Random-access file source.
///
/// Sub-ranges and clones share the OS handle but keep their own cursor, so
/// they can be handed to different threads. Closing any of them closes the
/// handle for all of them.
#[derive(Clone)]
pub struct FileSource {
    handle: Arc<FileHandle>,
    start: u64,
    len: u64,
    pos: u64,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_file(file)
    }

    pub fn from_file(file: File) -> Result<Self> {
        let len = file.metadata()?.len();
        Ok(FileSource {
            handle: Arc::new(FileHandle {
                file: Mutex::new(Some(file)),
            }),
            start: 0,
            len,
            pos: 0,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.handle.lock().map(|file| file.is_none()).unwrap_or(true)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.handle.lock()?.is_none() {
            return Err(closed_source());
        }
        Ok(())
    }
}

impl ByteSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self.handle.lock()?;
        let file = guard.as_mut().ok_or_else(closed_source)?;
        let remaining = self.len - self.pos;
        let want = (buf.len() as u64).min(remaining) as usize;
        if want == 0 {
            return Ok(0);
        }
        file.seek(SeekFrom::Start(self.start + self.pos))?;
        let read = file.read(&mut buf[..want])?;
        self.pos += read as u64;
        Ok(read)
    }

    fn skip(&mut self, n: u64) -> Result<u64> {
        self.ensure_open()?;
        let skipped = (self.len - self.pos).min(n);
        self.pos += skipped;
        Ok(skipped)
    }

    fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.pos = 0;
        Ok(())
    }

    fn close(&mut self) {
        if let Ok(mut file) = self.handle.lock() {
            file.take();
        }
    }
}

impl SeekableSource for FileSource {
    fn peek(&mut self) -> Result<Option<u8>> {
        let mut byte = [0_u8; 1];
        let read = self.read(&mut byte)?;
        if read == 0 {
            return Ok(None);
        }
        self.pos -= 1;
        Ok(Some(byte[0]))
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.ensure_open()?;
        if offset >= self.len {
            return Err(seek_error(offset, self.len));
        }
        self.pos = offset;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn len(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.len)
    }

    fn sub_range(&self, offset: u64, length: u64) -> Result<Self> {
        self.ensure_open()?;
        check_range(offset, length, self.len)?;
        Ok(FileSource {
            handle: Arc::clone(&self.handle),
            start: self.start + offset,
            len: length,
            pos: 0,
        })
    }
}

/// Reads exactly `buf.len()` bytes unless the source ends first; returns how
/// many bytes were filled.
pub(crate) fn read_full<S: ByteSource + ?Sized>(source: &mut S, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = source.read(&mut buf[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}
