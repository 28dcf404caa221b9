pub mod crypt_filters;
mod pkcs5;
mod rc4;

use std::collections::BTreeMap;

use md5::{Digest as _, Md5};
use thiserror::Error;

use crate::filters::{DEFAULT_CAPACITY, DecodeFilter};
use crate::source::{BufferMode, ByteSource, MemorySource};
use crate::{Dictionary, Object, ObjectId, Result, Stream};

pub use crypt_filters::{AesDecryptFilter, Rc4DecryptFilter};
pub use rc4::Rc4;

#[derive(Error, Debug)]
pub enum DecryptionError {
    #[error("invalid key length")]
    InvalidKeyLength,
    #[error("crypt filter method {0} is not supported")]
    UnsupportedMethod(String),
    #[error("crypt filter {0} is not defined in the /Encrypt dictionary")]
    MissingCryptFilter(String),
    #[error("encryption version {0} is not supported")]
    UnsupportedVersion(i64),
    // Used generically when an /Encrypt entry has the wrong type
    #[error("unexpected type in the /Encrypt dictionary")]
    InvalidType,
}

/// Cipher selected by a crypt filter's `/CFM` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Identity,
    Rc4,
    Aes128,
    Aes256,
}

impl CryptMethod {
    pub fn from_name(name: &[u8]) -> std::result::Result<Self, DecryptionError> {
        match name {
            b"None" | b"Identity" => Ok(CryptMethod::Identity),
            b"V2" => Ok(CryptMethod::Rc4),
            b"AESV2" => Ok(CryptMethod::Aes128),
            b"AESV3" => Ok(CryptMethod::Aes256),
            _ => Err(DecryptionError::UnsupportedMethod(String::from_utf8_lossy(name).into_owned())),
        }
    }

    /// Derives the key used for the object `id`.
    ///
    /// RC4 and AES-128 hash the file key, the low 3 bytes of the object
    /// number and the low 2 bytes of the generation (plus `sAlT` for AES), and
    /// keep the first `min(16, n + 5)` bytes. AES-256 uses the file key as is.
    pub fn object_key(self, file_key: &[u8], id: ObjectId) -> std::result::Result<Vec<u8>, DecryptionError> {
        let salt: &[u8] = match self {
            CryptMethod::Identity => return Ok(file_key.to_vec()),
            CryptMethod::Aes256 if file_key.len() == 32 => return Ok(file_key.to_vec()),
            CryptMethod::Aes256 => return Err(DecryptionError::InvalidKeyLength),
            CryptMethod::Rc4 => &[],
            CryptMethod::Aes128 => &b"sAlT"[..],
        };

        let mut hasher = Md5::new();
        hasher.update(file_key);
        hasher.update(&id.0.to_le_bytes()[..3]);
        hasher.update(&id.1.to_le_bytes()[..2]);
        hasher.update(salt);

        let key_len = std::cmp::min(file_key.len() + 5, 16);
        Ok(hasher.finalize()[..key_len].to_vec())
    }

    /// Wraps `source` in the decrypting filter for the object `id`.
    pub fn decrypt_filter<'a>(
        self, file_key: &[u8], id: ObjectId, source: DecodeFilter<'a>, capacity: usize,
    ) -> Result<DecodeFilter<'a>> {
        let key = self.object_key(file_key, id)?;
        Ok(match self {
            CryptMethod::Identity => source,
            CryptMethod::Rc4 => Box::new(Rc4DecryptFilter::new(source, &key, capacity)?),
            CryptMethod::Aes128 | CryptMethod::Aes256 => Box::new(AesDecryptFilter::new(source, &key, capacity)?),
        })
    }

    /// Decrypts a whole buffer, e.g. a string value.
    pub fn decrypt_bytes(self, file_key: &[u8], id: ObjectId, data: &[u8]) -> Result<Vec<u8>> {
        if self == CryptMethod::Identity {
            return Ok(data.to_vec());
        }
        let source = Box::new(MemorySource::new(data, BufferMode::Borrow));
        let mut filter = self.decrypt_filter(file_key, id, source, DEFAULT_CAPACITY)?;
        let mut plain = Vec::with_capacity(data.len());
        filter.read_to_end(&mut plain)?;
        Ok(plain)
    }
}

/// Document-wide decryption state: the file key and the crypt filters in use.
#[derive(Debug, Clone)]
pub struct EncryptionContext {
    file_key: Vec<u8>,
    stream_method: CryptMethod,
    string_method: CryptMethod,
    crypt_filters: BTreeMap<Vec<u8>, CryptMethod>,
    capacity: usize,
}

impl EncryptionContext {
    /// Same method for strings and streams.
    pub fn new<K: Into<Vec<u8>>>(file_key: K, method: CryptMethod) -> Self {
        Self::with_methods(file_key, method, method)
    }

    pub fn with_methods<K: Into<Vec<u8>>>(file_key: K, stream_method: CryptMethod, string_method: CryptMethod) -> Self {
        EncryptionContext {
            file_key: file_key.into(),
            stream_method,
            string_method,
            crypt_filters: BTreeMap::new(),
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Reads `V`, `CF`, `StmF` and `StrF` from an `/Encrypt` dictionary.
    /// The file key has to be computed by the caller.
    pub fn from_dict<K: Into<Vec<u8>>>(encrypt: &Dictionary, file_key: K) -> Result<Self> {
        let version = match encrypt.get(b"V") {
            Ok(value) => value.as_i64().map_err(|_| DecryptionError::InvalidType)?,
            Err(_) => 0,
        };

        match version {
            0..=3 => Ok(Self::new(file_key, CryptMethod::Rc4)),
            4 | 5 => {
                let mut crypt_filters = BTreeMap::new();
                if let Ok(filters) = encrypt.get(b"CF") {
                    let filters = filters.as_dict().map_err(|_| DecryptionError::InvalidType)?;
                    for (name, filter) in filters {
                        let filter = filter.as_dict().map_err(|_| DecryptionError::InvalidType)?;
                        let method = match filter.get(b"CFM") {
                            Ok(method) => CryptMethod::from_name(method.as_name().map_err(|_| DecryptionError::InvalidType)?)?,
                            Err(_) => CryptMethod::Identity,
                        };
                        crypt_filters.insert(name.clone(), method);
                    }
                }

                let select = |key: &[u8]| -> std::result::Result<CryptMethod, DecryptionError> {
                    let name = match encrypt.get(key) {
                        Ok(name) => name.as_name().map_err(|_| DecryptionError::InvalidType)?,
                        Err(_) => return Ok(CryptMethod::Identity),
                    };
                    if name == b"Identity" {
                        return Ok(CryptMethod::Identity);
                    }
                    crypt_filters
                        .get(name)
                        .copied()
                        .ok_or_else(|| DecryptionError::MissingCryptFilter(String::from_utf8_lossy(name).into_owned()))
                };
                let stream_method = select(&b"StmF"[..])?;
                let string_method = select(&b"StrF"[..])?;

                let mut context = Self::with_methods(file_key, stream_method, string_method);
                context.crypt_filters = crypt_filters;
                Ok(context)
            }
            other => Err(DecryptionError::UnsupportedVersion(other).into()),
        }
    }

    /// Registers a named crypt filter, as listed under `/CF`.
    pub fn add_crypt_filter<N: Into<Vec<u8>>>(&mut self, name: N, method: CryptMethod) {
        self.crypt_filters.insert(name.into(), method);
    }

    /// Buffer capacity of the decrypting filters.
    pub fn set_buffer_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn file_key(&self) -> &[u8] {
        &self.file_key
    }

    pub fn stream_method(&self) -> CryptMethod {
        self.stream_method
    }

    pub fn string_method(&self) -> CryptMethod {
        self.string_method
    }

    /// Method protecting the data of `stream`. Cross-reference streams are
    /// never encrypted; a `Crypt` entry in the filter list names its own
    /// crypt filter (`Identity` when it doesn't).
    pub fn method_for_stream(&self, stream: &Stream) -> CryptMethod {
        if stream.dict.has_type(b"XRef") {
            return CryptMethod::Identity;
        }

        let filters = stream.filters().unwrap_or_default();
        match filters.iter().position(|name| *name == b"Crypt") {
            Some(index) => stream
                .decode_params(index)
                .and_then(|params| params.get(b"Name").and_then(Object::as_name).ok())
                .and_then(|name| self.crypt_filters.get(name).copied())
                .unwrap_or(CryptMethod::Identity),
            None => self.stream_method,
        }
    }

    /// Wraps the raw data of stream `id` in the matching decrypting filter.
    pub fn decrypt_stream<'a>(&self, id: ObjectId, stream: &Stream, source: DecodeFilter<'a>) -> Result<DecodeFilter<'a>> {
        self.method_for_stream(stream)
            .decrypt_filter(&self.file_key, id, source, self.capacity)
    }

    /// Decrypts the strings inside `obj` in place. Stream data is left alone:
    /// it is decrypted when the stream is decoded.
    pub fn decrypt_object(&self, id: ObjectId, obj: &mut Object) -> Result<()> {
        match obj {
            Object::String(content, _) => {
                *content = self.string_method.decrypt_bytes(&self.file_key, id, content)?;
            }
            Object::Array(objects) => {
                for obj in objects {
                    self.decrypt_object(id, obj)?;
                }
            }
            Object::Dictionary(dict) => {
                for (_, obj) in dict.iter_mut() {
                    self.decrypt_object(id, obj)?;
                }
            }
            Object::Stream(stream) => {
                if !stream.dict.has_type(b"XRef") {
                    for (_, obj) in stream.dict.iter_mut() {
                        self.decrypt_object(id, obj)?;
                    }
                }
            }
            _ => (),
        }
        Ok(())
    }
}
