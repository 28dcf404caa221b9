use crate::Result;
use crate::sink::ByteSink;
use crate::source::ByteSource;

/// Capacity used by filters unless [`LoadOptions`](crate::LoadOptions) says otherwise.
pub const DEFAULT_CAPACITY: usize = 2048;

/// Fixed-capacity byte buffer shared by every streaming filter.
///
/// Bytes are appended at the write cursor (`end`) and taken out at the read
/// cursor (`pos`), with `0 <= pos <= end <= capacity` at all times. Draining
/// the buffer moves both cursors back to the start.
#[derive(Debug, Clone)]
pub struct FilterBuffer {
    data: Box<[u8]>,
    pos: usize,
    end: usize,
}

impl Default for FilterBuffer {
    fn default() -> Self {
        FilterBuffer::new(DEFAULT_CAPACITY)
    }
}

impl FilterBuffer {
    pub fn new(capacity: usize) -> Self {
        FilterBuffer {
            data: vec![0; capacity.max(1)].into_boxed_slice(),
            pos: 0,
            end: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.end - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.end
    }

    /// Room left behind the write cursor.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.end
    }

    pub fn is_full(&self) -> bool {
        self.end == self.capacity()
    }

    pub fn clear(&mut self) {
        self.pos = 0;
        self.end = 0;
    }

    /// Moves the unread bytes to the front so that the free space is contiguous.
    pub fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        self.data.copy_within(self.pos..self.end, 0);
        self.end -= self.pos;
        self.pos = 0;
    }

    /// Pulls bytes from `upstream` into the free space. Returns `None` once
    /// `upstream` reports end of stream, otherwise the number of bytes added,
    /// which is `0` only when the buffer is already full of unread data.
    pub fn feed<S: ByteSource + ?Sized>(&mut self, upstream: &mut S) -> Result<Option<usize>> {
        self.compact();
        if self.is_full() {
            return Ok(Some(0));
        }
        let read = upstream.read(&mut self.data[self.end..])?;
        if read == 0 {
            return Ok(None);
        }
        self.end += read;
        Ok(Some(read))
    }

    /// Appends as much of `bytes` as fits and returns how much that was.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        self.compact();
        let count = bytes.len().min(self.remaining());
        self.data[self.end..self.end + count].copy_from_slice(&bytes[..count]);
        self.end += count;
        count
    }

    /// Appends a single byte. Returns `false` when there is no room.
    pub fn store_byte(&mut self, byte: u8) -> bool {
        if self.is_full() {
            self.compact();
            if self.is_full() {
                return false;
            }
        }
        self.data[self.end] = byte;
        self.end += 1;
        true
    }

    /// Free space behind the write cursor, for producers that write in place.
    /// Follow with [`commit`](Self::commit).
    pub fn spare_mut(&mut self) -> &mut [u8] {
        self.compact();
        &mut self.data[self.end..]
    }

    /// Marks `count` bytes written through [`spare_mut`](Self::spare_mut).
    pub fn commit(&mut self, count: usize) {
        self.end = (self.end + count).min(self.capacity());
    }

    /// Retracts up to `n` of the most recently written bytes that have not
    /// been read yet and returns how many were retracted.
    pub fn rewind(&mut self, n: usize) -> usize {
        let count = n.min(self.len());
        self.end -= count;
        count
    }

    /// Last written byte that is still unread.
    pub fn last(&self) -> Option<u8> {
        self.unread().last().copied()
    }

    /// Copies unread bytes into `dest` and returns how many were moved.
    pub fn pop_into(&mut self, dest: &mut [u8]) -> usize {
        let count = dest.len().min(self.len());
        dest[..count].copy_from_slice(&self.data[self.pos..self.pos + count]);
        self.consume(count);
        count
    }

    /// Unread bytes, without consuming them.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.pos..self.end]
    }

    /// Marks `count` unread bytes as read.
    pub fn consume(&mut self, count: usize) {
        self.pos = (self.pos + count).min(self.end);
        if self.pos == self.end {
            self.clear();
        }
    }

    /// Writes every unread byte to `sink`.
    pub fn drain_to<S: ByteSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        if !self.is_empty() {
            sink.write(self.unread())?;
        }
        self.clear();
        Ok(())
    }
}
