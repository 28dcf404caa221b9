use aes::cipher::block_padding::{PadType, RawPadding, UnpadError};

/// Pad block with bytes with value equal to the number of bytes added.
///
/// PKCS#5 is described in [RFC 2898](https://tools.ietf.org/html/rfc2898).
#[derive(Clone, Copy, Debug)]
pub struct Pkcs5;

impl Pkcs5 {
    /// Strips the padding from the final block of a stream.
    pub fn unpad(block: &[u8]) -> Result<&[u8], UnpadError> {
        let bs = block.len();
        if bs == 0 || bs > 16 {
            return Err(UnpadError);
        }
        let n = block[bs - 1];
        if n == 0 || n as usize > bs {
            return Err(UnpadError);
        }
        let s = bs - n as usize;
        if block[s..bs - 1].iter().any(|&v| v != n) {
            return Err(UnpadError);
        }
        Ok(&block[..s])
    }
}

impl RawPadding for Pkcs5 {
    const TYPE: PadType = PadType::Reversible;

    #[inline]
    fn raw_pad(block: &mut [u8], pos: usize) {
        let n = block.len().saturating_sub(pos) as u8;
        for b in block.iter_mut().skip(pos) {
            *b = n;
        }
    }

    #[inline]
    fn raw_unpad(block: &[u8]) -> Result<&[u8], UnpadError> {
        Pkcs5::unpad(block)
    }
}
