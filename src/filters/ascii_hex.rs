use super::buffer::FilterBuffer;
use super::{DecodeFilter, EncodeFilter};
use crate::error::closed_source;
use crate::sink::ByteSink;
use crate::source::ByteSource;
use crate::{Error, Result};

const LINE_WIDTH: usize = 64;
const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0')
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// `ASCIIHexDecode`: pairs of hex digits up to the `>` end marker.
pub struct AsciiHexDecode<'a> {
    source: DecodeFilter<'a>,
    input: FilterBuffer,
    high_nibble: Option<u8>,
    finished: bool,
    closed: bool,
}

impl<'a> AsciiHexDecode<'a> {
    pub fn new(source: DecodeFilter<'a>, capacity: usize) -> Self {
        AsciiHexDecode {
            source,
            input: FilterBuffer::new(capacity),
            high_nibble: None,
            finished: false,
            closed: false,
        }
    }

    fn finish(&mut self) -> Option<u8> {
        self.finished = true;
        self.high_nibble.take().map(|high| high << 4)
    }
}

impl ByteSource for AsciiHexDecode<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(closed_source());
        }

        let mut written = 0;
        while written < buf.len() && !self.finished {
            if self.input.is_empty() && self.input.feed(&mut self.source)?.is_none() {
                if let Some(byte) = self.finish() {
                    buf[written] = byte;
                    written += 1;
                }
                break;
            }

            let mut used = 0;
            for &byte in self.input.unread() {
                if written == buf.len() {
                    break;
                }
                used += 1;
                if is_whitespace(byte) {
                    continue;
                }
                if byte == b'>' {
                    self.finished = true;
                    if let Some(high) = self.high_nibble.take() {
                        buf[written] = high << 4;
                        written += 1;
                    }
                    break;
                }
                let value = hex_value(byte).ok_or_else(|| {
                    Error::MalformedStream(format!("illegal character 0x{byte:02X} in ASCIIHexDecode data"))
                })?;
                match self.high_nibble.take() {
                    Some(high) => {
                        buf[written] = (high << 4) | value;
                        written += 1;
                    }
                    None => self.high_nibble = Some(value),
                }
            }
            self.input.consume(used);
        }
        Ok(written)
    }

    fn reset(&mut self) -> Result<()> {
        if self.closed {
            return Err(closed_source());
        }
        self.source.reset()?;
        self.input.clear();
        self.high_nibble = None;
        self.finished = false;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.input.clear();
    }
}

/// `ASCIIHexDecode` encoder: upper-case digit pairs, 64 columns per line.
pub struct AsciiHexEncode<'a> {
    sink: EncodeFilter<'a>,
    output: FilterBuffer,
    column: usize,
    closed: bool,
}

impl<'a> AsciiHexEncode<'a> {
    pub fn new(sink: EncodeFilter<'a>, capacity: usize) -> Self {
        AsciiHexEncode {
            sink,
            output: FilterBuffer::new(capacity),
            column: 0,
            closed: false,
        }
    }

    fn store(&mut self, byte: u8) -> Result<()> {
        if !self.output.store_byte(byte) {
            self.output.drain_to(&mut self.sink)?;
            self.output.store_byte(byte);
        }
        Ok(())
    }
}

impl ByteSink for AsciiHexEncode<'_> {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if self.closed {
            return Err(closed_source());
        }
        for &byte in buf {
            self.store(HEX_DIGITS[usize::from(byte >> 4)])?;
            self.store(HEX_DIGITS[usize::from(byte & 0x0F)])?;
            self.column += 2;
            if self.column >= LINE_WIDTH {
                self.store(b'\n')?;
                self.column = 0;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(closed_source());
        }
        self.output.drain_to(&mut self.sink)?;
        self.sink.flush()
    }

    /// Writes the end marker, then closes the downstream sink.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        // a line break right before the marker is noise
        if self.output.last() == Some(b'\n') {
            self.output.rewind(1);
        }
        self.store(b'>')?;
        self.output.drain_to(&mut self.sink)?;
        self.closed = true;
        self.sink.close()
    }
}
