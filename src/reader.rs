use std::collections::HashMap;

use log::{debug, warn};

use crate::error::{ParseError, XrefError};
use crate::load_options::LoadOptions;
use crate::parser::{self, XrefParser};
use crate::source::{SeekableSource, read_full};
use crate::xref::{XrefSection, XrefTable};
use crate::{Error, Object, Result};

/// How far from the end of the file `startxref` is looked for.
const TAIL_WINDOW: u64 = 512;
/// How far from the start of the file the header is looked for.
const HEAD_WINDOW: u64 = 1024;

/// What the bootstrap found out about a file.
#[derive(Debug)]
pub struct ReadOutcome {
    pub version: String,
    pub xref: XrefTable,
    /// Damage that was worked around.
    pub warnings: Vec<Error>,
}

/// Walks a file's cross-reference chain and merges it.
pub struct Reader<'a, S, P> {
    pub source: &'a mut S,
    pub parser: &'a P,
    pub options: &'a LoadOptions,
}

fn read_at<S: SeekableSource + ?Sized>(source: &mut S, offset: u64, len: u64) -> Result<Vec<u8>> {
    let mut buffer = vec![0; len as usize];
    source.seek(offset)?;
    let filled = read_full(source, &mut buffer)?;
    buffer.truncate(filled);
    Ok(buffer)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|window| window == needle)
}

/// Offset of `%PDF-` and the version it announces. Some files carry junk
/// in front of the header; their offsets count from the header.
pub fn locate_header<S: SeekableSource + ?Sized>(source: &mut S) -> Result<(u64, String)> {
    let len = source.len()?;
    if len == 0 {
        return Err(ParseError::InvalidFileHeader.into());
    }
    let head = read_at(source, 0, len.min(HEAD_WINDOW))?;
    let offset = head
        .windows(5)
        .position(|window| window == b"%PDF-")
        .ok_or(ParseError::InvalidFileHeader)?;
    let version = parser::header(&head[offset..]).ok_or(ParseError::InvalidFileHeader)?;
    Ok((offset as u64, version))
}

impl<S: SeekableSource, P: XrefParser> Reader<'_, S, P> {
    /// Reads the header and every cross-reference section.
    pub fn read(mut self) -> Result<ReadOutcome> {
        let (_, version) = locate_header(&mut *self.source)?;
        let start = self.xref_start()?;
        let mut warnings = Vec::new();
        let sections = self.read_chain(start, &mut warnings)?;
        let xref = XrefTable::merge(sections.into_iter().rev());

        let size = xref.trailer().get(b"Size").and_then(Object::as_i64).ok();
        let correct = i64::from(xref.max_number()) + 1;
        if size.is_some_and(|size| size < correct) {
            warn!("Size entry of trailer dictionary is {size:?}, correct value is {correct}.");
        }

        Ok(ReadOutcome {
            version,
            xref,
            warnings,
        })
    }

    /// Offset named by the last `startxref` of the file.
    pub fn xref_start(&mut self) -> Result<u64> {
        let len = self.source.len()?;
        let tail_start = len.saturating_sub(TAIL_WINDOW);
        let tail = read_at(&mut *self.source, tail_start, len - tail_start)?;
        let position = rfind(&tail, b"startxref").ok_or(XrefError::Start)?;
        let start = parser::xref_start(&tail[position..]).ok_or(XrefError::Start)?;
        match u64::try_from(start) {
            Ok(start) if start < len => Ok(start),
            _ => Err(XrefError::Start.into()),
        }
    }

    /// Sections from `start` backwards through `Prev`, newest first. Only a
    /// failure of the newest section is an error, damage further down the
    /// chain ends the walk with a warning.
    fn read_chain(&mut self, start: u64, warnings: &mut Vec<Error>) -> Result<Vec<XrefSection>> {
        let len = self.source.len()?;
        // section offset -> position in `sections`
        let mut already_seen = HashMap::new();
        let mut sections = Vec::new();
        let mut offset = start;

        loop {
            already_seen.insert(offset, sections.len());
            let mut section = match self.parser.parse_xref_and_trailer_at(&mut *self.source, offset) {
                Ok(section) => section,
                Err(err) if sections.is_empty() => return Err(err),
                Err(err) => {
                    warn!("cross-reference section at {offset} can't be read, older revisions are ignored: {err}");
                    warnings.push(err);
                    break;
                }
            };
            debug!("cross-reference section at {offset} with {} entries", section.entries.len());

            if let Some(stream_offset) = section.xref_stream() {
                match self.read_hybrid_stream(stream_offset, len) {
                    Ok(stream) => section.absorb_stream(stream),
                    Err(err) => {
                        warn!("cross-reference stream at {stream_offset} is ignored: {err}");
                        warnings.push(err);
                    }
                }
            }

            let prev = section.prev();
            sections.push(section);

            let Some(prev) = prev else {
                break;
            };
            let prev = match u64::try_from(prev) {
                Ok(prev) if prev < len => prev,
                _ => {
                    warn!("Prev offset {prev} is outside the file");
                    warnings.push(XrefError::PrevStart.into());
                    break;
                }
            };
            if let Some(&position) = already_seen.get(&prev) {
                // the loop's sections after its first one are not trusted
                warn!("cross-reference chain loops back to offset {prev}");
                sections.truncate(position + 1);
                warnings.push(Error::CyclicXref { offset: prev });
                break;
            }
            if sections.len() >= self.options.max_xref_sections {
                warn!("more than {} cross-reference sections, older ones are ignored", self.options.max_xref_sections);
                break;
            }
            offset = prev;
        }
        Ok(sections)
    }

    fn read_hybrid_stream(&mut self, offset: i64, len: u64) -> Result<XrefSection> {
        match u64::try_from(offset) {
            Ok(offset) if offset < len => self.parser.parse_xref_and_trailer_at(&mut *self.source, offset),
            _ => Err(XrefError::StreamStart.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CosParser;
    use crate::source::{BufferMode, MemorySource};

    const MINIMAL: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\nxref\n0 2\n0000000000 65535 f\r\n0000000009 00000 n\r\ntrailer\n<< /Size 2 /Root 1 0 R >>\nstartxref\n45\n%%EOF\n";

    #[test]
    fn header_after_junk() {
        let mut buffer = b"\x00\x00junk\n".to_vec();
        buffer.extend_from_slice(MINIMAL);
        let mut source = MemorySource::new(&buffer, BufferMode::Borrow);
        assert_eq!(locate_header(&mut source).unwrap(), (7, "1.4".to_string()));

        let mut empty = MemorySource::new(b"", BufferMode::Borrow);
        assert!(matches!(locate_header(&mut empty), Err(Error::Parse(ParseError::InvalidFileHeader))));
    }

    #[test]
    fn reads_single_section() {
        let mut source = MemorySource::new(MINIMAL, BufferMode::Borrow);
        let parser = CosParser::default();
        let options = LoadOptions::default();
        let reader = Reader {
            source: &mut source,
            parser: &parser,
            options: &options,
        };
        let outcome = reader.read().unwrap();
        assert_eq!(outcome.version, "1.4");
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.xref.len(), 1);
        assert_eq!(outcome.xref.start_xref(), Some(45));
        assert_eq!(outcome.xref.trailer().get(b"Root").unwrap(), &Object::Reference((1, 0)));
    }

    #[test]
    fn startxref_past_end() {
        let buffer = String::from_utf8_lossy(MINIMAL).replace("startxref\n45", "startxref\n4500");
        let mut source = MemorySource::new(buffer.as_bytes(), BufferMode::Borrow);
        let parser = CosParser::default();
        let options = LoadOptions::default();
        let mut reader = Reader {
            source: &mut source,
            parser: &parser,
            options: &options,
        };
        assert!(matches!(reader.xref_start(), Err(Error::Xref(XrefError::Start))));
    }
}
