use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use log::debug;

use super::buffer::FilterBuffer;
use super::{DecodeFilter, EncodeFilter};
use crate::error::closed_source;
use crate::sink::ByteSink;
use crate::source::ByteSource;
use crate::{Error, Result};

fn progress(before: u64, after: u64) -> usize {
    (after - before) as usize
}

/// `FlateDecode`: zlib inflate, pulling compressed bytes on demand.
pub struct FlateDecode<'a> {
    source: DecodeFilter<'a>,
    input: FilterBuffer,
    inflater: Decompress,
    source_done: bool,
    finished: bool,
    closed: bool,
}

impl<'a> FlateDecode<'a> {
    pub fn new(source: DecodeFilter<'a>, capacity: usize) -> Self {
        FlateDecode {
            source,
            input: FilterBuffer::new(capacity),
            inflater: Decompress::new(true),
            source_done: false,
            finished: false,
            closed: false,
        }
    }
}

impl ByteSource for FlateDecode<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(closed_source());
        }
        if self.finished || buf.is_empty() {
            return Ok(0);
        }

        let mut stalled = false;
        loop {
            if !self.source_done && (self.input.is_empty() || stalled) {
                match self.input.feed(&mut self.source)? {
                    None => self.source_done = true,
                    Some(0) if stalled => {
                        return Err(Error::MalformedStream("flate decoder made no progress".into()));
                    }
                    Some(_) => (),
                }
            }

            if self.source_done && self.input.is_empty() && self.inflater.total_in() == 0 {
                self.finished = true;
                return Ok(0);
            }

            let flush = if self.source_done {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };
            let (in_before, out_before) = (self.inflater.total_in(), self.inflater.total_out());
            let status = self
                .inflater
                .decompress(self.input.unread(), buf, flush)
                .map_err(|err| Error::MalformedStream(format!("corrupt flate data: {err}")))?;
            let consumed = progress(in_before, self.inflater.total_in());
            let produced = progress(out_before, self.inflater.total_out());
            self.input.consume(consumed);

            if status == Status::StreamEnd {
                debug!("flate stream ended after {} input bytes", self.inflater.total_in());
                self.finished = true;
                return Ok(produced);
            }
            if produced > 0 {
                return Ok(produced);
            }

            stalled = consumed == 0;
            if stalled && self.source_done {
                return Err(Error::MalformedStream("truncated flate data".into()));
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        if self.closed {
            return Err(closed_source());
        }
        self.source.reset()?;
        self.input.clear();
        self.inflater.reset(true);
        self.source_done = false;
        self.finished = false;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.input.clear();
    }
}

/// `FlateDecode` encoder: zlib deflate with the default compression level.
pub struct FlateEncode<'a> {
    sink: EncodeFilter<'a>,
    output: FilterBuffer,
    deflater: Compress,
    closed: bool,
}

impl<'a> FlateEncode<'a> {
    pub fn new(sink: EncodeFilter<'a>, capacity: usize) -> Self {
        FlateEncode {
            sink,
            output: FilterBuffer::new(capacity),
            deflater: Compress::new(Compression::default(), true),
            closed: false,
        }
    }

    fn compress(&mut self, mut input: &[u8], flush: FlushCompress) -> Result<()> {
        loop {
            if self.output.is_full() {
                self.output.drain_to(&mut self.sink)?;
            }
            let (in_before, out_before) = (self.deflater.total_in(), self.deflater.total_out());
            let status = self
                .deflater
                .compress(input, self.output.spare_mut(), flush)
                .map_err(|err| Error::MalformedStream(format!("deflate failed: {err}")))?;
            let consumed = progress(in_before, self.deflater.total_in());
            let produced = progress(out_before, self.deflater.total_out());
            self.output.commit(produced);
            input = &input[consumed..];

            let done = match flush {
                FlushCompress::Finish => status == Status::StreamEnd,
                _ => input.is_empty() && !self.output.is_full(),
            };
            if done {
                return Ok(());
            }
        }
    }
}

impl ByteSink for FlateEncode<'_> {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if self.closed {
            return Err(closed_source());
        }
        self.compress(buf, FlushCompress::None)
    }

    fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(closed_source());
        }
        self.compress(&[], FlushCompress::Sync)?;
        self.output.drain_to(&mut self.sink)?;
        self.sink.flush()
    }

    /// Finishes the zlib stream, then closes the downstream sink.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.compress(&[], FlushCompress::Finish)?;
        self.output.drain_to(&mut self.sink)?;
        self.closed = true;
        self.sink.close()
    }
}
