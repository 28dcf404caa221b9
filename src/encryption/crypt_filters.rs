use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use log::debug;

use super::DecryptionError;
use super::pkcs5::Pkcs5;
use super::rc4::Rc4;
use crate::error::closed_source;
use crate::filters::{DecodeFilter, FilterBuffer};
use crate::source::{ByteSource, read_full};
use crate::{Error, Result};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const BLOCK: usize = 16;

/// RC4 decryption of a stream, one buffer load at a time.
pub struct Rc4DecryptFilter<'a> {
    source: DecodeFilter<'a>,
    cipher: Rc4,
    input: FilterBuffer,
    closed: bool,
}

impl<'a> Rc4DecryptFilter<'a> {
    /// `key` is the per-object key.
    pub fn new(source: DecodeFilter<'a>, key: &[u8], capacity: usize) -> Result<Self> {
        Ok(Rc4DecryptFilter {
            source,
            cipher: Rc4::new(key)?,
            input: FilterBuffer::new(capacity),
            closed: false,
        })
    }
}

impl ByteSource for Rc4DecryptFilter<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(closed_source());
        }
        if self.input.is_empty() && self.input.feed(&mut self.source)?.is_none() {
            return Ok(0);
        }
        let count = self.input.pop_into(buf);
        self.cipher.apply_keystream(&mut buf[..count]);
        Ok(count)
    }

    fn reset(&mut self) -> Result<()> {
        if self.closed {
            return Err(closed_source());
        }
        self.source.reset()?;
        self.cipher.reset();
        self.input.clear();
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.input.clear();
    }
}

enum AesCbc {
    Aes128(Aes128CbcDec),
    Aes256(Aes256CbcDec),
}

impl AesCbc {
    fn new(key: &[u8], iv: &[u8]) -> std::result::Result<Self, DecryptionError> {
        let cipher = match key.len() {
            16 => Aes128CbcDec::new_from_slices(key, iv).map(AesCbc::Aes128),
            32 => Aes256CbcDec::new_from_slices(key, iv).map(AesCbc::Aes256),
            _ => return Err(DecryptionError::InvalidKeyLength),
        };
        cipher.map_err(|_| DecryptionError::InvalidKeyLength)
    }

    fn decrypt_block(&mut self, block: &mut [u8; BLOCK]) {
        let block = GenericArray::from_mut_slice(&mut block[..]);
        match self {
            AesCbc::Aes128(cipher) => cipher.decrypt_block_mut(block),
            AesCbc::Aes256(cipher) => cipher.decrypt_block_mut(block),
        }
    }
}

/// AES-CBC decryption of a stream whose first 16 bytes are the IV.
///
/// The last decrypted block is held back until the source ends, because
/// only then it is known to carry the PKCS#5 padding.
pub struct AesDecryptFilter<'a> {
    source: DecodeFilter<'a>,
    key: Vec<u8>,
    cipher: Option<AesCbc>,
    input: FilterBuffer,
    output: FilterBuffer,
    held_back: Option<[u8; BLOCK]>,
    source_done: bool,
    finished: bool,
    closed: bool,
}

impl<'a> AesDecryptFilter<'a> {
    /// `key` is the per-object key: 16 bytes for AES-128, 32 for AES-256.
    pub fn new(source: DecodeFilter<'a>, key: &[u8], capacity: usize) -> Result<Self> {
        if key.len() != 16 && key.len() != 32 {
            return Err(DecryptionError::InvalidKeyLength.into());
        }
        let capacity = capacity.max(2 * BLOCK);
        Ok(AesDecryptFilter {
            source,
            key: key.to_vec(),
            cipher: None,
            input: FilterBuffer::new(capacity),
            output: FilterBuffer::new(capacity),
            held_back: None,
            source_done: false,
            finished: false,
            closed: false,
        })
    }

    fn start(&mut self) -> Result<AesCbc> {
        let mut iv = [0_u8; BLOCK];
        let filled = read_full(&mut self.source, &mut iv)?;
        if filled < BLOCK {
            return Err(Error::MalformedStream(format!(
                "AES stream holds {filled} bytes, not enough for the 16 byte IV"
            )));
        }
        Ok(AesCbc::new(&self.key, &iv)?)
    }

    fn decrypt_available(&mut self, cipher: &mut AesCbc) {
        while self.input.len() >= BLOCK && self.output.remaining() >= BLOCK {
            let mut block = [0_u8; BLOCK];
            block.copy_from_slice(&self.input.unread()[..BLOCK]);
            self.input.consume(BLOCK);
            cipher.decrypt_block(&mut block);
            if let Some(previous) = self.held_back.replace(block) {
                self.output.push(&previous);
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        if !self.input.is_empty() {
            return Err(Error::MalformedStream(format!(
                "AES data ends with a partial block of {} bytes",
                self.input.len()
            )));
        }
        if let Some(last) = self.held_back.take() {
            let plain = Pkcs5::unpad(&last).map_err(|_| Error::MalformedStream("invalid AES padding".into()))?;
            self.output.push(plain);
        }
        self.finished = true;
        Ok(())
    }
}

impl ByteSource for AesDecryptFilter<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(closed_source());
        }
        loop {
            if !self.output.is_empty() || self.finished {
                return Ok(self.output.pop_into(buf));
            }

            let mut cipher = match self.cipher.take() {
                Some(cipher) => cipher,
                None => self.start()?,
            };
            if !self.source_done && self.input.feed(&mut self.source)?.is_none() {
                self.source_done = true;
            }
            self.decrypt_available(&mut cipher);
            self.cipher = Some(cipher);

            if self.source_done && self.output.is_empty() {
                self.finish()?;
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        if self.closed {
            return Err(closed_source());
        }
        self.source.reset()?;
        self.cipher = None;
        self.input.clear();
        self.output.clear();
        self.held_back = None;
        self.source_done = false;
        self.finished = false;
        debug!("AES filter rewound, IV will be read again");
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.input.clear();
        self.output.clear();
    }
}
