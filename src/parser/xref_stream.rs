use log::warn;

use crate::error::ParseError;
use crate::filters::decode_stream;
use crate::source::{BufferMode, MemorySource, read_full};
use crate::xref::{XrefEntry, XrefSection};
use crate::{Object, Result, Stream};

fn parse_integer_array(array: &Object) -> Result<Vec<i64>> {
    array.as_array()?.iter().map(Object::as_i64).collect()
}

fn big_endian(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |value, &byte| (value << 8) | u64::from(byte))
}

/// Turns a cross-reference stream into a section. The stream dictionary,
/// minus its stream specific keys, is the section's trailer.
pub fn decode_xref_stream(stream: Stream, start: u64, capacity: usize) -> Result<XrefSection> {
    let Stream { mut dict, content, .. } = stream;
    let size = dict
        .get(b"Size")
        .and_then(Object::as_i64)
        .map_err(|_| ParseError::InvalidXref)?;
    let section_indices = dict
        .get(b"Index")
        .and_then(parse_integer_array)
        .unwrap_or_else(|_| vec![0, size]);
    let widths = dict
        .get(b"W")
        .and_then(parse_integer_array)
        .map_err(|_| ParseError::InvalidXref)?;
    if widths.len() < 3 || widths[..3].iter().any(|w| !(0..=8).contains(w)) {
        return Err(ParseError::InvalidXref.into());
    }
    let widths = [widths[0] as usize, widths[1] as usize, widths[2] as usize];

    let mut section = XrefSection::new(start, Default::default());
    {
        let source = Box::new(MemorySource::new(&content, BufferMode::Borrow));
        let mut rows = decode_stream(&Stream::with_position(dict.clone(), start), source, capacity)?;
        let mut row = vec![0_u8; widths.iter().sum()];

        'sections: for pair in section_indices.chunks_exact(2) {
            let (first, count) = (pair[0], pair[1]);
            if first < 0 || count < 0 {
                return Err(ParseError::InvalidXref.into());
            }
            let end = first.checked_add(count).ok_or(ParseError::InvalidXref)?;
            for number in first..end {
                if read_full(&mut rows, &mut row)? < row.len() {
                    warn!("cross-reference stream at {start} ends before object {number}");
                    break 'sections;
                }
                let (kind, rest) = row.split_at(widths[0]);
                let (field2, field3) = rest.split_at(widths[1]);
                let kind = if widths[0] == 0 { 1 } else { big_endian(kind) };
                let Ok(number) = u32::try_from(number) else {
                    break 'sections;
                };
                let entry = match kind {
                    0 => XrefEntry::Free,
                    1 => XrefEntry::Normal {
                        offset: big_endian(field2),
                        generation: big_endian(field3) as u16,
                    },
                    2 => XrefEntry::Compressed {
                        container: big_endian(field2) as u32,
                        index: big_endian(field3) as u32,
                    },
                    // reserved types are treated as null references
                    _ => continue,
                };
                section.insert(number, entry);
            }
        }
    }

    for key in [&b"Length"[..], &b"W"[..], &b"Index"[..], &b"Filter"[..], &b"DecodeParms"[..]] {
        dict.remove(key);
    }
    section.trailer = dict;
    Ok(section)
}
