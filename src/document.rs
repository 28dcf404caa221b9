use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use crate::encryption::EncryptionContext;
use crate::load_options::LoadOptions;
use crate::parser::CosParser;
use crate::reader::{Reader, locate_header};
use crate::source::{BufferMode, FileSource, MemorySource, SeekableSource};
use crate::store::{DocumentStore, ResolvedObjects};
use crate::xref::XrefTable;
use crate::{Dictionary, Error, Object, ObjectId, Result};

/// PDF document
pub struct Document<S = MemorySource<'static>> {
    /// The version of the PDF specification to which the file conforms.
    pub version: String,

    /// Objects of the document, resolved on demand.
    store: DocumentStore<S>,

    /// Damage found and worked around while opening the file.
    warnings: Vec<Error>,
}

impl Document<FileSource> {
    /// Open a PDF document from a specified file path.
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_options(path, &LoadOptions::default())
    }

    pub fn load_with_options<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Self> {
        Self::load_from(FileSource::open(path)?, options)
    }
}

impl Document<MemorySource<'static>> {
    /// Open a PDF document from a copy of a memory slice.
    pub fn load_mem(buffer: &[u8]) -> Result<Self> {
        Self::load_vec(buffer.to_vec())
    }

    /// Open a PDF document from an owned buffer.
    pub fn load_vec(buffer: Vec<u8>) -> Result<Self> {
        Self::load_from(MemorySource::from_vec(buffer), &LoadOptions::default())
    }
}

impl<'a> Document<MemorySource<'a>> {
    /// Open a PDF document reading straight from `buffer`, which stays
    /// borrowed for as long as the document lives.
    pub fn load_borrowed(buffer: &'a [u8], options: &LoadOptions) -> Result<Self> {
        Self::load_from(MemorySource::new(buffer, BufferMode::Borrow), options)
    }
}

impl<S: SeekableSource> Document<S> {
    /// Open a PDF document from any random-access source.
    pub fn load_from(mut source: S, options: &LoadOptions) -> Result<Self> {
        let (header_offset, _) = locate_header(&mut source)?;
        if header_offset > 0 {
            info!("{header_offset} bytes of junk before the header");
            let len = source.len()? - header_offset;
            source = source.sub_range(header_offset, len)?;
        }

        let parser = CosParser::new(options);
        let outcome = Reader {
            source: &mut source,
            parser: &parser,
            options,
        }
        .read()?;

        let store = DocumentStore::new(source, outcome.xref, parser).with_buffer_capacity(options.filter_buffer_capacity);
        Ok(Document {
            version: outcome.version,
            store,
            warnings: outcome.warnings,
        })
    }

    pub fn store(&self) -> &DocumentStore<S> {
        &self.store
    }

    /// The trailer of the newest revision.
    pub fn trailer(&self) -> Dictionary {
        self.store.with_xref(|xref| xref.trailer().clone())
    }

    /// Runs `f` on the merged cross-reference table.
    pub fn with_xref<R>(&self, f: impl FnOnce(&XrefTable) -> R) -> R {
        self.store.with_xref(f)
    }

    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    pub fn add_warning(&mut self, warning: Error) {
        self.warnings.push(warning);
    }

    /// Get object by object id.
    pub fn get_object(&self, id: ObjectId) -> Result<Arc<Object>> {
        self.store.resolve(id)
    }

    /// Get object by object id, following references.
    pub fn get_dereferenced(&self, id: ObjectId) -> Result<Arc<Object>> {
        self.store.follow(id)
    }

    /// Decoded bytes of stream `id`.
    pub fn get_stream_content(&self, id: ObjectId) -> Result<Vec<u8>> {
        self.store.decoded_content(id)
    }

    /// Object the trailer names under `key`: resolved if it is a
    /// reference, copied if it is a direct value.
    fn trailer_entry(&self, key: &[u8]) -> Result<(Option<ObjectId>, Arc<Object>)> {
        let trailer = self.trailer();
        match trailer.get(key)? {
            Object::Reference(id) => Ok((Some(*id), self.store.follow(*id)?)),
            object => Ok((None, Arc::new(object.clone()))),
        }
    }

    /// The document catalog.
    pub fn catalog(&self) -> Result<Arc<Object>> {
        let (_, catalog) = self.trailer_entry(b"Root")?;
        catalog.as_dict()?;
        Ok(catalog)
    }

    pub fn is_encrypted(&self) -> bool {
        self.trailer().has(b"Encrypt")
    }

    /// The `/Encrypt` dictionary of the trailer.
    pub fn encryption_dict(&self) -> Result<Dictionary> {
        let (_, encrypt) = self.trailer_entry(b"Encrypt")?;
        Ok(encrypt.as_dict()?.clone())
    }

    /// Decrypts objects with `file_key`, the key computed from the
    /// document's password. Objects resolved before are parsed again.
    pub fn set_encryption_key<K: Into<Vec<u8>>>(&mut self, file_key: K) -> Result<()> {
        let (encrypt_id, encrypt) = self.trailer_entry(b"Encrypt")?;
        let context = EncryptionContext::from_dict(encrypt.as_dict()?, file_key)?;
        self.store.set_encryption(context, encrypt_id);
        Ok(())
    }

    /// Decrypts objects with an already built context.
    pub fn set_encryption(&mut self, context: EncryptionContext) {
        let encrypt_id = self.trailer().get(b"Encrypt").and_then(Object::as_reference).ok();
        self.store.set_encryption(context, encrypt_id);
    }

    /// Number of objects in the cross-reference table.
    pub fn object_count(&self) -> usize {
        self.store.len()
    }

    /// Create a new object id for an object that is about to be added.
    pub fn new_object_id(&self) -> Result<ObjectId> {
        self.store.allocate_key()
    }

    /// Add an object under a fresh id and return the id.
    pub fn add_object<T: Into<Object>>(&self, object: T) -> Result<ObjectId> {
        let id = self.new_object_id()?;
        self.store.set_object(id, object);
        Ok(id)
    }

    /// Replace or create object `id`.
    pub fn set_object<T: Into<Object>>(&self, id: ObjectId, object: T) {
        self.store.set_object(id, object);
    }

    /// Lazily resolves every object.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, Result<Arc<Object>>)> + '_ {
        self.store.all_objects()
    }

    /// Resolves every object. Failures are returned rather than raised.
    pub fn resolve_all(&self) -> ResolvedObjects {
        let resolved = self.store.resolve_all();
        if !resolved.failures.is_empty() {
            warn!("{} of {} objects can't be resolved", resolved.failures.len(), self.object_count());
        }
        resolved
    }

    /// Closes the origin. Objects resolved so far stay readable.
    pub fn close(&self) {
        self.store.close();
    }
}
