use thiserror::Error;

use crate::ObjectId;
use crate::encryption::DecryptionError;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The origin is unavailable, or a read or seek went out of bounds.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The filter catalog does not know the requested filter.
    #[error("filter {0} is not supported")]
    UnsupportedFilter(String),
    /// A filter met data that violates its format.
    #[error("malformed stream: {0}")]
    MalformedStream(String),
    /// The key is absent from the cross-reference table.
    #[error("object {0:?} not found")]
    ObjectNotFound(ObjectId),
    /// A `Prev` link pointed back to a cross-reference section already read.
    #[error("cyclic cross-reference chain at offset {offset}")]
    CyclicXref { offset: u64 },
    /// Failed to parse input.
    #[error("couldn't parse input: {0}")]
    Parse(#[from] ParseError),
    /// Error while reading the cross-reference chain.
    #[error("invalid cross-reference table: {0}")]
    Xref(XrefError),
    /// Error when decrypting the contents of the file.
    #[error("decryption error: {0}")]
    Decryption(#[from] DecryptionError),
    /// The object found at an offset is not the object that was asked for.
    #[error("expected object {expected:?} but found {found:?}")]
    ObjectIdMismatch { expected: ObjectId, found: ObjectId },
    /// Dereferencing an object led back to itself.
    #[error("reference cycle while resolving object {0:?}")]
    ReferenceCycle(ObjectId),
    /// An Object has the wrong type, e.g. the Object is an Array where a Name would be expected.
    #[error("object has wrong type; expected type {expected} but found type {found}")]
    ObjectType {
        expected: &'static str,
        found: &'static str,
    },
    /// Dictionary key was not found.
    #[error("missing required dictionary key \"{0}\"")]
    DictKey(String),
    /// Offset in file is invalid.
    #[error("invalid file offset {0}")]
    InvalidOffset(u64),
    /// Every object number up to `u32::MAX` is taken.
    #[error("no object number left to allocate")]
    ObjectNumbersExhausted,
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("unexpected end of input")]
    EndOfInput,
    #[error("invalid file header")]
    InvalidFileHeader,
    #[error("invalid indirect object at offset {0}")]
    IndirectObject(u64),
    #[error("invalid stream")]
    InvalidStream,
    #[error("invalid trailer")]
    InvalidTrailer,
    #[error("invalid cross-reference table")]
    InvalidXref,
    #[error("invalid object stream")]
    InvalidObjectStream,
}

#[derive(Debug)]
pub enum XrefError {
    /// Could not parse cross reference table.
    Parse,
    /// Could not find start of cross reference table.
    Start,
    /// The trailer's "Prev" field was invalid.
    PrevStart,
    /// The trailer's "XRefStm" field was invalid.
    StreamStart,
}

impl fmt::Display for XrefError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            XrefError::Parse => write!(f, "could not parse xref"),
            XrefError::Start => write!(f, "invalid start value"),
            XrefError::PrevStart => write!(f, "invalid start value in Prev field"),
            XrefError::StreamStart => write!(f, "invalid stream start value"),
        }
    }
}

impl std::error::Error for XrefError {}

impl From<XrefError> for Error {
    fn from(err: XrefError) -> Self {
        Error::Xref(err)
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_err: std::str::Utf8Error) -> Self {
        Error::Parse(ParseError::InvalidStream)
    }
}

impl Error {
    /// Whether a full document view should keep going after this error,
    /// attaching it as a warning instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ObjectNotFound(_)
                | Error::CyclicXref { .. }
                | Error::ObjectIdMismatch { .. }
                | Error::ReferenceCycle(_)
                | Error::Parse(_)
                | Error::MalformedStream(_)
        )
    }
}

pub(crate) fn closed_source() -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::NotConnected, "byte source is closed"))
}
