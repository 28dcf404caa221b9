//! Stream filters.
//!
//! Decode filters are [`ByteSource`]s wrapping another source, encode filters
//! are [`ByteSink`]s wrapping another sink, so a chain is built by nesting.

pub mod ascii_hex;
pub mod buffer;
pub mod flate;
pub mod predictor;

use log::debug;

use crate::sink::{ByteSink, MemorySink};
use crate::source::{BufferMode, ByteSource, MemorySource};
use crate::{Dictionary, Error, Result, Stream};

pub use ascii_hex::{AsciiHexDecode, AsciiHexEncode};
pub use buffer::{DEFAULT_CAPACITY, FilterBuffer};
pub use flate::{FlateDecode, FlateEncode};
pub use predictor::{PredictorDecode, PredictorParams};

pub type DecodeFilter<'a> = Box<dyn ByteSource + 'a>;
pub type EncodeFilter<'a> = Box<dyn ByteSink + 'a>;

/// Filter names this crate can decode and encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    AsciiHex,
    Flate,
}

impl FilterKind {
    /// Looks up a filter by its full or abbreviated name.
    pub fn from_name(name: &[u8]) -> Result<Self> {
        match name {
            b"ASCIIHexDecode" | b"AHx" => Ok(FilterKind::AsciiHex),
            b"FlateDecode" | b"Fl" => Ok(FilterKind::Flate),
            _ => Err(Error::UnsupportedFilter(String::from_utf8_lossy(name).into_owned())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::AsciiHex => "ASCIIHexDecode",
            FilterKind::Flate => "FlateDecode",
        }
    }
}

/// Wraps `source` in the decode filter called `name`.
pub fn decode_filter<'a>(name: &[u8], params: Option<&Dictionary>, source: DecodeFilter<'a>) -> Result<DecodeFilter<'a>> {
    decode_filter_with_capacity(name, params, source, DEFAULT_CAPACITY)
}

pub fn decode_filter_with_capacity<'a>(
    name: &[u8], params: Option<&Dictionary>, source: DecodeFilter<'a>, capacity: usize,
) -> Result<DecodeFilter<'a>> {
    match FilterKind::from_name(name)? {
        FilterKind::AsciiHex => Ok(Box::new(AsciiHexDecode::new(source, capacity))),
        FilterKind::Flate => {
            let inflated: DecodeFilter<'a> = Box::new(FlateDecode::new(source, capacity));
            let params = match params {
                Some(params) => PredictorParams::from_dict(params)?,
                None => return Ok(inflated),
            };
            if params.is_active() {
                Ok(Box::new(PredictorDecode::new(inflated, params, capacity)?))
            } else {
                Ok(inflated)
            }
        }
    }
}

/// Wraps `sink` in the encode filter called `name`. Closing the filter ends
/// the encoding and closes `sink`.
pub fn encode_filter<'a>(name: &[u8], sink: EncodeFilter<'a>) -> Result<EncodeFilter<'a>> {
    encode_filter_with_capacity(name, sink, DEFAULT_CAPACITY)
}

pub fn encode_filter_with_capacity<'a>(name: &[u8], sink: EncodeFilter<'a>, capacity: usize) -> Result<EncodeFilter<'a>> {
    match FilterKind::from_name(name)? {
        FilterKind::AsciiHex => Ok(Box::new(AsciiHexEncode::new(sink, capacity))),
        FilterKind::Flate => Ok(Box::new(FlateEncode::new(sink, capacity))),
    }
}

/// Builds the decode chain described by a stream dictionary's `Filter` and
/// `DecodeParms` on top of `source`. `Crypt` entries are skipped: decryption
/// sits below this chain.
pub fn decode_stream<'a>(stream: &Stream, source: DecodeFilter<'a>, capacity: usize) -> Result<DecodeFilter<'a>> {
    let mut chain = source;
    for (index, name) in stream.filters()?.into_iter().enumerate() {
        if name == b"Crypt" {
            continue;
        }
        debug!("adding {} to decode chain", String::from_utf8_lossy(name));
        chain = decode_filter_with_capacity(name, stream.decode_params(index), chain, capacity)?;
    }
    Ok(chain)
}

/// Decodes `data` through the filters named in `filters`, in order.
pub fn decode_all(filters: &[(&[u8], Option<&Dictionary>)], data: &[u8]) -> Result<Vec<u8>> {
    let mut chain: DecodeFilter<'_> = Box::new(MemorySource::new(data, BufferMode::Borrow));
    for (name, params) in filters {
        chain = decode_filter(name, *params, chain)?;
    }
    let mut out = Vec::new();
    chain.read_to_end(&mut out)?;
    Ok(out)
}

/// Encodes `data` so that decoding it with `filters`, in order, gives it back.
pub fn encode_all(filters: &[&[u8]], data: &[u8]) -> Result<Vec<u8>> {
    let mut sink = MemorySink::new();
    {
        let mut chain: EncodeFilter<'_> = Box::new(&mut sink);
        for name in filters {
            chain = encode_filter(name, chain)?;
        }
        chain.write(data)?;
        chain.close()?;
    }
    Ok(sink.into_inner())
}
