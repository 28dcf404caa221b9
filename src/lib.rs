mod object;
pub use crate::object::{Dictionary, FREE_OBJECT_ID, Object, ObjectId, Stream, StringFormat};

mod document;
pub use document::Document;

pub mod encryption;
mod error;
pub use error::{Error, ParseError, Result, XrefError};

pub mod filters;
mod load_options;
pub use load_options::{LoadOptions, LoadOptionsBuilder};

mod object_stream;
pub use object_stream::ObjectStream;

pub mod parser;
pub use parser::{CosParser, ObjectParser, XrefParser};

mod reader;
pub use reader::{ReadOutcome, Reader};

mod renumber;
pub use renumber::Renumbering;

pub mod sink;
pub mod source;
pub use sink::{ByteSink, FileSink, MemorySink, WriteSink};
pub use source::{BufferMode, ByteSource, FileSource, MemorySource, SeekableSource};

mod store;
pub use store::{DocumentStore, ResolvedObjects};

pub mod xref;
pub use xref::{XrefEntry, XrefSection, XrefTable};
