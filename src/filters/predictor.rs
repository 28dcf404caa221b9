use std::mem;

use log::warn;

use super::DecodeFilter;
use super::buffer::FilterBuffer;
use crate::error::closed_source;
use crate::source::{ByteSource, read_full};
use crate::{Dictionary, Error, Object, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PngFilter {
    None,
    Sub,
    Up,
    Avg,
    Paeth,
}

impl TryFrom<u8> for PngFilter {
    type Error = Error;

    fn try_from(tag: u8) -> Result<PngFilter> {
        match tag {
            0 => Ok(PngFilter::None),
            1 => Ok(PngFilter::Sub),
            2 => Ok(PngFilter::Up),
            3 => Ok(PngFilter::Avg),
            4 => Ok(PngFilter::Paeth),
            _ => Err(Error::MalformedStream(format!("invalid PNG predictor tag {tag}"))),
        }
    }
}

fn paeth_predict(left: u8, above: u8, upper_left: u8) -> u8 {
    let (a, b, c) = (i16::from(left), i16::from(above), i16::from(upper_left));
    let estimate = a + b - c;
    let (pa, pb, pc) = ((estimate - a).abs(), (estimate - b).abs(), (estimate - c).abs());
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

fn decode_png_row(filter: PngFilter, bpp: usize, previous: &[u8], current: &mut [u8]) {
    let len = current.len();
    match filter {
        PngFilter::None => (),
        PngFilter::Sub => {
            for i in bpp..len {
                current[i] = current[i].wrapping_add(current[i - bpp]);
            }
        }
        PngFilter::Up => {
            for i in 0..len {
                current[i] = current[i].wrapping_add(previous[i]);
            }
        }
        PngFilter::Avg => {
            for i in 0..len {
                let left = if i >= bpp { u16::from(current[i - bpp]) } else { 0 };
                let average = (left + u16::from(previous[i])) / 2;
                current[i] = current[i].wrapping_add(average as u8);
            }
        }
        PngFilter::Paeth => {
            for i in 0..len {
                let predicted = if i >= bpp {
                    paeth_predict(current[i - bpp], previous[i], previous[i - bpp])
                } else {
                    paeth_predict(0, previous[i], 0)
                };
                current[i] = current[i].wrapping_add(predicted);
            }
        }
    }
}

fn decode_tiff_row(colors: usize, bits: usize, row: &mut [u8]) {
    match bits {
        8 => {
            for i in colors..row.len() {
                row[i] = row[i].wrapping_add(row[i - colors]);
            }
        }
        16 => {
            let stride = colors * 2;
            let mut i = stride;
            while i + 1 < row.len() {
                let left = u16::from_be_bytes([row[i - stride], row[i - stride + 1]]);
                let value = u16::from_be_bytes([row[i], row[i + 1]]).wrapping_add(left);
                row[i..i + 2].copy_from_slice(&value.to_be_bytes());
                i += 2;
            }
        }
        _ => {
            // 1, 2 and 4 bit samples packed MSB first
            let mask = (1_u16 << bits) - 1;
            let samples = row.len() * 8 / bits;
            let mut left = vec![0_u16; colors];
            for index in 0..samples {
                let bit = index * bits;
                let shift = 8 - bits - bit % 8;
                let byte = &mut row[bit / 8];
                let delta = (u16::from(*byte) >> shift) & mask;
                let component = index % colors;
                let value = if index < colors {
                    delta
                } else {
                    (delta + left[component]) & mask
                };
                left[component] = value;
                *byte = (*byte & !((mask as u8) << shift)) | ((value as u8) << shift);
            }
        }
    }
}

/// Longest predictor row accepted, tag byte excluded.
pub const MAX_ROW_BYTES: usize = 4 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
    Tiff,
    Png,
}

/// Predictor parameters from a `DecodeParms` dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for PredictorParams {
    fn default() -> Self {
        PredictorParams {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

impl PredictorParams {
    pub fn from_dict(params: &Dictionary) -> Result<Self> {
        let defaults = PredictorParams::default();
        let read = |key: &[u8], default: i64| -> Result<i64> {
            match params.get(key) {
                Ok(Object::Integer(value)) => Ok(*value),
                Ok(Object::Null) | Err(_) => Ok(default),
                Ok(other) => Err(Error::MalformedStream(format!(
                    "decode parameter {} must be an integer, found {}",
                    String::from_utf8_lossy(key),
                    other.enum_variant()
                ))),
            }
        };
        let positive = |key: &[u8], default: usize| -> Result<usize> {
            let value = read(key, default as i64)?;
            usize::try_from(value)
                .ok()
                .filter(|value| *value > 0)
                .ok_or_else(|| Error::MalformedStream(format!("invalid {} {value}", String::from_utf8_lossy(key))))
        };

        let params = PredictorParams {
            predictor: read(b"Predictor", defaults.predictor)?,
            colors: positive(b"Colors", defaults.colors)?,
            bits_per_component: positive(b"BitsPerComponent", defaults.bits_per_component)?,
            columns: positive(b"Columns", defaults.columns)?,
        };
        if params.is_active() {
            params.row_layout()?;
        }
        Ok(params)
    }

    /// Whether the parameters ask for any prediction at all.
    pub fn is_active(&self) -> bool {
        self.predictor > 1
    }

    /// Bytes per pixel and bytes per row, the row at most [`MAX_ROW_BYTES`].
    fn row_layout(&self) -> Result<(usize, usize)> {
        let too_large = || {
            Error::MalformedStream(format!(
                "predictor rows of {} columns, {} colors and {} bits are too large",
                self.columns, self.colors, self.bits_per_component
            ))
        };
        let pixel_bits = self.colors.checked_mul(self.bits_per_component).ok_or_else(too_large)?;
        let row_bits = pixel_bits.checked_mul(self.columns).ok_or_else(too_large)?;
        let row = row_bits.div_ceil(8);
        if row > MAX_ROW_BYTES {
            return Err(too_large());
        }
        Ok((pixel_bits.div_ceil(8), row))
    }
}

/// Undoes TIFF (`Predictor 2`) or PNG (`Predictor 10..=15`) prediction row by row.
pub struct PredictorDecode<'a> {
    source: DecodeFilter<'a>,
    params: PredictorParams,
    algorithm: Algorithm,
    bytes_per_pixel: usize,
    previous: Vec<u8>,
    current: Vec<u8>,
    output: FilterBuffer,
    finished: bool,
    closed: bool,
}

impl<'a> PredictorDecode<'a> {
    pub fn new(source: DecodeFilter<'a>, params: PredictorParams, capacity: usize) -> Result<Self> {
        let algorithm = match params.predictor {
            2 => Algorithm::Tiff,
            10..=15 => Algorithm::Png,
            other => return Err(Error::MalformedStream(format!("unknown predictor {other}"))),
        };
        if algorithm == Algorithm::Tiff && !matches!(params.bits_per_component, 1 | 2 | 4 | 8 | 16) {
            return Err(Error::MalformedStream(format!(
                "TIFF predictor can't handle {} bits per component",
                params.bits_per_component
            )));
        }

        let (bytes_per_pixel, row) = params.row_layout()?;
        let tag = usize::from(algorithm == Algorithm::Png);
        Ok(PredictorDecode {
            source,
            params,
            algorithm,
            bytes_per_pixel,
            previous: vec![0; row],
            current: vec![0; row + tag],
            output: FilterBuffer::new(capacity.max(row)),
            finished: false,
            closed: false,
        })
    }

    /// Decodes the next row into the output buffer. Returns `false` at the end.
    fn next_row(&mut self) -> Result<bool> {
        let filled = read_full(&mut self.source, &mut self.current)?;
        if filled == 0 {
            return Ok(false);
        }
        let complete = filled == self.current.len();
        if !complete {
            warn!("predictor input ends with a partial row of {filled} bytes");
        }

        let row = match self.algorithm {
            Algorithm::Png => {
                let filter = PngFilter::try_from(self.current[0])?;
                let row = &mut self.current[1..filled];
                decode_png_row(filter, self.bytes_per_pixel, &self.previous, row);
                self.previous[..row.len()].copy_from_slice(row);
                &self.previous[..filled - 1]
            }
            Algorithm::Tiff => {
                let row = &mut self.current[..filled];
                decode_tiff_row(self.params.colors, self.params.bits_per_component, row);
                mem::swap(&mut self.previous, &mut self.current);
                &self.previous[..filled]
            }
        };
        self.output.push(row);
        Ok(complete)
    }
}

impl ByteSource for PredictorDecode<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(closed_source());
        }
        while self.output.is_empty() && !self.finished {
            if !self.next_row()? {
                self.finished = true;
            }
        }
        Ok(self.output.pop_into(buf))
    }

    fn reset(&mut self) -> Result<()> {
        if self.closed {
            return Err(closed_source());
        }
        self.source.reset()?;
        self.previous.fill(0);
        self.output.clear();
        self.finished = false;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.output.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;
    use crate::source::{BufferMode, MemorySource};

    fn decode(data: &[u8], params: PredictorParams) -> Result<Vec<u8>> {
        let source = Box::new(MemorySource::new(data, BufferMode::Borrow));
        let mut filter = PredictorDecode::new(source, params, 16)?;
        let mut out = Vec::new();
        filter.read_to_end(&mut out)?;
        Ok(out)
    }

    fn png(columns: usize) -> PredictorParams {
        PredictorParams {
            predictor: 12,
            columns,
            ..PredictorParams::default()
        }
    }

    #[test]
    fn params_default_like_pdf() {
        let params = PredictorParams::from_dict(&dictionary! { "Predictor" => 12, "Columns" => 5 }).unwrap();
        assert_eq!(params.colors, 1);
        assert_eq!(params.bits_per_component, 8);
        assert_eq!(params.columns, 5);
        assert!(params.is_active());
        assert!(PredictorParams::from_dict(&dictionary! { "Columns" => 0 }).is_err());
    }

    #[test]
    fn png_rows_with_mixed_tags() {
        // xref-stream style rows: (type, offset hi, offset lo)
        let encoded = [
            2, 1, 0, 16, // Up on a zero row
            2, 0, 0, 10, // Up: 1 0 26
            1, 2, 1, 1, // Sub: 2 3 4
            0, 9, 9, 9, // None
            3, 4, 4, 4, // Avg: previous 9 9 9
            4, 1, 1, 1, // Paeth: previous 8 12 14
        ];
        let decoded = decode(&encoded, png(3)).unwrap();
        assert_eq!(
            decoded,
            vec![1, 0, 16, 1, 0, 26, 2, 3, 4, 9, 9, 9, 8, 12, 14, 9, 13, 15]
        );
    }

    #[test]
    fn truncated_last_row_is_kept() {
        let decoded = decode(&[0, 1, 2, 3, 2, 1], png(3)).unwrap();
        assert_eq!(decoded, vec![1, 2, 3, 2]);
    }

    #[test]
    fn invalid_png_tag_fails() {
        assert!(matches!(decode(&[7, 1, 2, 3], png(3)), Err(Error::MalformedStream(_))));
    }

    #[test]
    fn unknown_predictor_fails() {
        let params = PredictorParams {
            predictor: 5,
            ..PredictorParams::default()
        };
        assert!(matches!(decode(b"", params), Err(Error::MalformedStream(_))));
    }

    #[test]
    fn oversized_rows_are_rejected() {
        let overflowing = dictionary! { "Predictor" => 12, "Columns" => 1_i64 << 62 };
        assert!(matches!(PredictorParams::from_dict(&overflowing), Err(Error::MalformedStream(_))));

        let huge = dictionary! { "Predictor" => 12, "Colors" => 4, "Columns" => 1_i64 << 30 };
        assert!(matches!(PredictorParams::from_dict(&huge), Err(Error::MalformedStream(_))));

        let unchecked = PredictorParams {
            predictor: 15,
            colors: usize::MAX / 2,
            bits_per_component: 16,
            columns: 3,
        };
        assert!(matches!(decode(&[0, 1, 2], unchecked), Err(Error::MalformedStream(_))));
        // no prediction, no row to size
        assert!(PredictorParams::from_dict(&dictionary! { "Columns" => 1_i64 << 62 }).is_ok());
    }

    #[test]
    fn tiff_rows() {
        let params = PredictorParams {
            predictor: 2,
            colors: 2,
            columns: 3,
            ..PredictorParams::default()
        };
        let decoded = decode(&[10, 20, 1, 2, 1, 2, 5, 5, 0, 0, 255, 1], params).unwrap();
        assert_eq!(decoded, vec![10, 20, 11, 22, 12, 24, 5, 5, 5, 5, 4, 6]);
    }

    #[test]
    fn tiff_sub_byte_samples() {
        let params = PredictorParams {
            predictor: 2,
            bits_per_component: 4,
            columns: 4,
            ..PredictorParams::default()
        };
        // deltas 1 1 1 1 -> 1 2 3 4
        let decoded = decode(&[0x11, 0x11], params).unwrap();
        assert_eq!(decoded, vec![0x12, 0x34]);
    }
}
