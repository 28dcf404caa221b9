use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::closed_source;
use crate::source::ByteSource;
use crate::{Error, Result};

/// A destination of bytes.
pub trait ByteSink {
    /// Writes all of `buf`.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Pumps `source` into the sink until the source is exhausted and returns
    /// the number of bytes moved.
    fn write_from(&mut self, source: &mut dyn ByteSource) -> Result<u64> {
        let mut chunk = [0_u8; 4096];
        let mut total = 0;
        loop {
            let read = source.read(&mut chunk)?;
            if read == 0 {
                return Ok(total);
            }
            self.write(&chunk[..read])?;
            total += read as u64;
        }
    }

    fn flush(&mut self) -> Result<()>;

    /// Flushes and releases the sink. Later writes fail.
    fn close(&mut self) -> Result<()>;
}

impl<S: ByteSink + ?Sized> ByteSink for &mut S {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<S: ByteSink + ?Sized> ByteSink for Box<S> {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Growable in-memory sink.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    buffer: Vec<u8>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        MemorySink {
            buffer: Vec::with_capacity(capacity),
            closed: false,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

impl ByteSink for MemorySink {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if self.closed {
            return Err(closed_source());
        }
        self.buffer.extend_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Buffered file sink.
pub struct FileSink {
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_file(File::create(path)?))
    }

    pub fn from_file(file: File) -> Self {
        FileSink {
            writer: Some(BufWriter::new(file)),
        }
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        self.writer.as_mut().ok_or_else(closed_source)
    }
}

impl ByteSink for FileSink {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.writer()?.write_all(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer()?.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.flush() {
                log::warn!("failed to flush file sink on drop: {err}");
            }
        }
    }
}

/// Adapter letting any [`std::io::Write`] be used as a sink.
pub struct WriteSink<W: Write> {
    inner: Option<W>,
}

impl<W: Write> WriteSink<W> {
    pub fn new(inner: W) -> Self {
        WriteSink { inner: Some(inner) }
    }
}

impl<W: Write> ByteSink for WriteSink<W> {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let inner = self.inner.as_mut().ok_or_else(closed_source)?;
        inner.write_all(buf).map_err(Error::Io)
    }

    fn flush(&mut self) -> Result<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.flush().map_err(Error::Io),
            None => Err(closed_source()),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut inner) = self.inner.take() {
            inner.flush()?;
        }
        Ok(())
    }
}
