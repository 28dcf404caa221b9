use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, warn};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::encryption::EncryptionContext;
use crate::filters::{self, DEFAULT_CAPACITY, DecodeFilter};
use crate::object_stream::ObjectStream;
use crate::parser::{CosParser, ObjectParser};
use crate::source::{BufferMode, ByteSource, MemorySource, SeekableSource};
use crate::xref::{XrefEntry, XrefTable};
use crate::{Error, Object, ObjectId, Result, Stream};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Every object resolved by [`DocumentStore::resolve_all`], plus the keys
/// that failed.
#[derive(Debug, Default)]
pub struct ResolvedObjects {
    pub objects: BTreeMap<ObjectId, Arc<Object>>,
    pub failures: Vec<(ObjectId, Error)>,
}

impl ResolvedObjects {
    fn record(&mut self, id: ObjectId, result: Result<Arc<Object>>) {
        match result {
            Ok(object) => {
                self.objects.insert(id, object);
            }
            Err(err) => self.failures.push((id, err)),
        }
    }
}

/// Indirect objects of one document, parsed from the origin on first access
/// and cached afterwards.
///
/// A cache hit only takes the cache's read lock. A miss takes the origin's
/// lock, looks at the cache again and only then parses, so no key is parsed
/// twice even when several threads ask for it at once.
pub struct DocumentStore<S, P = CosParser> {
    source: Mutex<S>,
    parser: P,
    xref: RwLock<XrefTable>,
    cache: RwLock<HashMap<ObjectId, Arc<Object>>>,
    object_streams: RwLock<HashMap<u32, Arc<ObjectStream>>>,
    next_number: Mutex<Option<u32>>,
    encryption: Option<EncryptionContext>,
    encrypt_id: Option<ObjectId>,
    buffer_capacity: usize,
}

impl<S: SeekableSource, P: ObjectParser> DocumentStore<S, P> {
    pub fn new(source: S, xref: XrefTable, parser: P) -> Self {
        let next_number = xref.max_number().checked_add(1);
        DocumentStore {
            source: Mutex::new(source),
            parser,
            xref: RwLock::new(xref),
            cache: RwLock::new(HashMap::new()),
            object_streams: RwLock::new(HashMap::new()),
            next_number: Mutex::new(next_number),
            encryption: None,
            encrypt_id: None,
            buffer_capacity: DEFAULT_CAPACITY,
        }
    }

    /// Capacity of the filter buffers used to decode streams.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    /// Decrypts every object resolved from now on with `context`, except
    /// `encrypt_id`, the encryption dictionary. Drops everything cached from
    /// the origin so far; objects registered with
    /// [`set_object`](Self::set_object) stay.
    pub fn set_encryption(&mut self, mut context: EncryptionContext, encrypt_id: Option<ObjectId>) {
        context.set_buffer_capacity(self.buffer_capacity);
        self.encryption = Some(context);
        self.encrypt_id = encrypt_id;
        let xref = read(&self.xref);
        write(&self.cache).retain(|id, _| matches!(xref.get(*id), Some(XrefEntry::Created { .. })));
        write(&self.object_streams).clear();
    }

    pub fn encryption(&self) -> Option<&EncryptionContext> {
        self.encryption.as_ref()
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    fn lock_source(&self) -> MutexGuard<'_, S> {
        self.source.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cached(&self, id: ObjectId) -> Option<Arc<Object>> {
        read(&self.cache).get(&id).cloned()
    }

    /// Whether `id` has been resolved or set already.
    pub fn is_cached(&self, id: ObjectId) -> bool {
        read(&self.cache).contains_key(&id)
    }

    /// The value of object `id`.
    pub fn resolve(&self, id: ObjectId) -> Result<Arc<Object>> {
        if let Some(object) = self.cached(id) {
            return Ok(object);
        }
        let mut source = self.lock_source();
        self.resolve_locked(&mut source, id, &mut HashSet::new())
    }

    /// Resolves `id`, then keeps resolving for as long as the value is a
    /// reference.
    pub fn follow(&self, id: ObjectId) -> Result<Arc<Object>> {
        let mut source = self.lock_source();
        self.follow_locked(&mut source, id, &mut HashSet::new())
    }

    fn follow_locked(&self, source: &mut S, id: ObjectId, already_seen: &mut HashSet<ObjectId>) -> Result<Arc<Object>> {
        let mut visited = HashSet::new();
        let mut id = id;
        loop {
            if !visited.insert(id) {
                warn!("reference cycle detected following object {} {}", id.0, id.1);
                return Err(Error::ReferenceCycle(id));
            }
            let object = self.resolve_locked(source, id, already_seen)?;
            match object.as_reference() {
                Ok(next) => id = next,
                Err(_) => return Ok(object),
            }
        }
    }

    fn resolve_locked(&self, source: &mut S, id: ObjectId, already_seen: &mut HashSet<ObjectId>) -> Result<Arc<Object>> {
        if let Some(object) = self.cached(id) {
            return Ok(object);
        }
        if !already_seen.insert(id) {
            warn!("reference cycle detected resolving object {} {}", id.0, id.1);
            return Err(Error::ReferenceCycle(id));
        }

        let entry = read(&self.xref).get(id).copied().ok_or(Error::ObjectNotFound(id))?;
        let object = match entry {
            XrefEntry::Normal { offset, .. } => {
                debug!("parsing object {} {} at offset {offset}", id.0, id.1);
                let mut object = self.parser.parse_object_at(source, offset, id)?;
                if let Object::Stream(stream) = &mut object {
                    if stream.is_pending() {
                        self.complete_stream(source, id, stream, already_seen)?;
                    }
                }
                if let Some(encryption) = &self.encryption {
                    if self.encrypt_id != Some(id) {
                        encryption.decrypt_object(id, &mut object)?;
                    }
                }
                object
            }
            XrefEntry::Compressed { container, index } => {
                let object_stream = self.object_stream_locked(source, container, already_seen)?;
                object_stream.get(index, id)?.clone()
            }
            XrefEntry::Free | XrefEntry::Created { .. } => return Err(Error::ObjectNotFound(id)),
        };

        let object = Arc::new(object);
        write(&self.cache).insert(id, object.clone());
        Ok(object)
    }

    /// Reads the data of a stream whose length was unknown at parse time.
    fn complete_stream(
        &self, source: &mut S, id: ObjectId, stream: &mut Stream, already_seen: &mut HashSet<ObjectId>,
    ) -> Result<()> {
        let Some(start) = stream.start_position else {
            return Ok(());
        };
        let length = match stream.dict.get(b"Length") {
            Ok(Object::Reference(length_id)) => match self.follow_locked(source, *length_id, already_seen) {
                Ok(length) => length.as_i64().ok(),
                Err(err @ Error::ReferenceCycle(_)) => return Err(err),
                Err(err) => {
                    warn!("length of stream {} {} can't be resolved: {err}", id.0, id.1);
                    None
                }
            },
            Ok(length) => length.as_i64().ok(),
            Err(_) => None,
        };
        let length = length.and_then(|length| u64::try_from(length).ok());
        stream.content = self.parser.read_stream_data(source, start, length)?;
        stream.dict.set("Length", stream.content.len() as i64);
        Ok(())
    }

    fn object_stream_locked(
        &self, source: &mut S, container: u32, already_seen: &mut HashSet<ObjectId>,
    ) -> Result<Arc<ObjectStream>> {
        if let Some(object_stream) = read(&self.object_streams).get(&container) {
            return Ok(object_stream.clone());
        }
        let container_id = (container, 0);
        let object = self.resolve_locked(source, container_id, already_seen)?;
        let stream = object.as_stream()?;
        let direct = direct_filter_entries(stream, |id| self.follow_locked(source, id, already_seen))?;
        let mut content = Vec::new();
        self.build_chain(container_id, stream, direct.as_ref())?
            .read_to_end(&mut content)?;
        let object_stream = Arc::new(ObjectStream::new(&stream.dict, &content)?);
        debug!("object stream {container} holds {} objects", object_stream.len());
        write(&self.object_streams).insert(container, object_stream.clone());
        Ok(object_stream)
    }

    /// Builds the decrypt and decode chain for `stream`, object `id`, on top
    /// of its raw bytes. Indirect `Filter` and `DecodeParms` values are
    /// resolved first.
    pub fn decode_chain<'a>(&self, id: ObjectId, stream: &'a Stream) -> Result<DecodeFilter<'a>> {
        let direct = direct_filter_entries(stream, |target| self.follow(target))?;
        self.build_chain(id, stream, direct.as_ref())
    }

    /// `direct` stands in for `stream`'s dictionary when it is given.
    fn build_chain<'a>(&self, id: ObjectId, stream: &'a Stream, direct: Option<&Stream>) -> Result<DecodeFilter<'a>> {
        let description = direct.unwrap_or(stream);
        let mut chain: DecodeFilter<'a> = Box::new(MemorySource::new(&stream.content, BufferMode::Borrow));
        if let Some(encryption) = &self.encryption {
            if self.encrypt_id != Some(id) {
                chain = encryption.decrypt_stream(id, description, chain)?;
            }
        }
        filters::decode_stream(description, chain, self.buffer_capacity)
    }

    /// Fully decoded bytes of `stream`, object `id`.
    pub fn decode_stream(&self, id: ObjectId, stream: &Stream) -> Result<Vec<u8>> {
        let mut chain = self.decode_chain(id, stream)?;
        let mut content = Vec::new();
        chain.read_to_end(&mut content)?;
        Ok(content)
    }

    /// Resolves `id` and decodes it, it has to be a stream.
    pub fn decoded_content(&self, id: ObjectId) -> Result<Vec<u8>> {
        let object = self.resolve(id)?;
        self.decode_stream(id, object.as_stream()?)
    }

    /// Registers `object` under `id`, replacing whatever the origin or an
    /// earlier call had for that object number.
    pub fn set_object<T: Into<Object>>(&self, id: ObjectId, object: T) {
        {
            let mut cache = write(&self.cache);
            cache.retain(|cached, _| cached.0 != id.0);
            cache.insert(id, Arc::new(object.into()));
        }
        write(&self.object_streams).remove(&id.0);
        write(&self.xref).insert(id.0, XrefEntry::Created { generation: id.1 });
    }

    /// A key no object uses and that this store never handed out before.
    /// Fails once `u32::MAX` has been passed.
    pub fn allocate_key(&self) -> Result<ObjectId> {
        let mut next = self.next_number.lock().unwrap_or_else(PoisonError::into_inner);
        let xref = read(&self.xref);
        loop {
            let number = next.ok_or(Error::ObjectNumbersExhausted)?;
            *next = number.checked_add(1);
            if !xref.contains_number(number) {
                return Ok((number, 0));
            }
        }
    }

    /// Lazily resolves every object of the cross-reference table, in object
    /// number order. A failing key is logged and yields its error; the
    /// iteration goes on with the next key.
    pub fn all_objects(&self) -> impl Iterator<Item = (ObjectId, Result<Arc<Object>>)> + '_ {
        self.ids().into_iter().map(move |id| {
            let result = self.resolve(id);
            if let Err(err) = &result {
                warn!("object {} {} can't be resolved: {err}", id.0, id.1);
            }
            (id, result)
        })
    }

    /// Resolves every object, collecting the failures.
    pub fn resolve_all(&self) -> ResolvedObjects {
        let mut resolved = ResolvedObjects::default();
        for (id, result) in self.all_objects() {
            resolved.record(id, result);
        }
        resolved
    }

    /// Keys of every object, in object number order.
    pub fn ids(&self) -> Vec<ObjectId> {
        read(&self.xref).ids().collect()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        read(&self.xref).contains(id)
    }

    /// Number of objects in the cross-reference table.
    pub fn len(&self) -> usize {
        read(&self.xref).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.xref).is_empty()
    }

    /// Runs `f` on the merged cross-reference table.
    pub fn with_xref<R>(&self, f: impl FnOnce(&XrefTable) -> R) -> R {
        f(&read(&self.xref))
    }

    /// Closes the origin. Cached objects stay available.
    pub fn close(&self) {
        self.lock_source().close();
    }

    pub fn into_source(self) -> S {
        self.source.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A copy of `stream` without data whose `Filter` and `DecodeParms`, and
/// their array elements, are direct objects. `None` when they already are.
fn direct_filter_entries(
    stream: &Stream, mut follow: impl FnMut(ObjectId) -> Result<Arc<Object>>,
) -> Result<Option<Stream>> {
    const KEYS: [&[u8]; 2] = [b"Filter", b"DecodeParms"];
    let indirect = |object: &Object| match object {
        Object::Reference(_) => true,
        Object::Array(items) => items.iter().any(|item| matches!(item, Object::Reference(_))),
        _ => false,
    };
    if !KEYS.iter().any(|key| stream.dict.get(key).is_ok_and(indirect)) {
        return Ok(None);
    }

    let mut dict = stream.dict.clone();
    for key in KEYS {
        let Ok(value) = dict.get_mut(key) else {
            continue;
        };
        if let Object::Reference(id) = *value {
            *value = Object::clone(&*follow(id)?);
        }
        if let Object::Array(items) = value {
            for item in items.iter_mut() {
                if let Object::Reference(id) = *item {
                    *item = Object::clone(&*follow(id)?);
                }
            }
        }
    }
    Ok(Some(Stream::new(dict, Vec::new())))
}

#[cfg(feature = "rayon")]
impl<S: SeekableSource + Send, P: ObjectParser + Sync> DocumentStore<S, P> {
    /// [`resolve_all`](Self::resolve_all) on the rayon thread pool. Parsing
    /// still happens one object at a time, cache hits run in parallel.
    pub fn par_resolve_all(&self) -> ResolvedObjects {
        let results: Vec<_> = self
            .ids()
            .into_par_iter()
            .map(|id| (id, self.resolve(id)))
            .collect();
        let mut resolved = ResolvedObjects::default();
        for (id, result) in results {
            if let Err(err) = &result {
                warn!("object {} {} can't be resolved: {err}", id.0, id.1);
            }
            resolved.record(id, result);
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;
    use crate::xref::XrefSection;

    fn store_for(body: &str, objects: &[(u32, &str)]) -> DocumentStore<MemorySource<'static>> {
        let mut data = String::from("%PDF-1.5\n");
        let mut section = XrefSection::new(0, dictionary! {});
        data.push_str(body);
        for (number, text) in objects {
            section.insert(*number, XrefEntry::Normal { offset: data.len() as u64, generation: 0 });
            data.push_str(&format!("{number} 0 obj\n{text}\nendobj\n"));
        }
        let source = MemorySource::from_vec(data.into_bytes());
        DocumentStore::new(source, XrefTable::merge(vec![section]), CosParser::default())
    }

    #[test]
    fn resolves_and_caches() {
        let store = store_for("", &[(1, "<< /Type /Catalog >>"), (2, "(text)")]);
        assert!(!store.is_cached((1, 0)));
        let first = store.resolve((1, 0)).unwrap();
        assert!(first.as_dict().unwrap().has_type(b"Catalog"));
        assert!(store.is_cached((1, 0)));
        let second = store.resolve((1, 0)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(store.resolve((9, 0)), Err(Error::ObjectNotFound((9, 0)))));
        assert!(matches!(store.resolve((2, 1)), Err(Error::ObjectNotFound((2, 1)))));
    }

    #[test]
    fn indirect_length_is_resolved() {
        let store = store_for(
            "",
            &[
                (1, "<< /Length 2 0 R >>\nstream\nhello world\nendstream"),
                (2, "11"),
            ],
        );
        let object = store.resolve((1, 0)).unwrap();
        let stream = object.as_stream().unwrap();
        assert_eq!(stream.content, b"hello world");
        assert_eq!(stream.dict.get(b"Length").unwrap().as_i64().unwrap(), 11);
        assert_eq!(store.decoded_content((1, 0)).unwrap(), b"hello world");
    }

    #[test]
    fn length_reference_cycle_is_detected() {
        let store = store_for(
            "",
            &[
                (1, "<< /Length 2 0 R >>\nstream\nabc\nendstream"),
                (2, "3 0 R"),
                (3, "2 0 R"),
            ],
        );
        assert!(matches!(store.resolve((1, 0)), Err(Error::ReferenceCycle(_))));
        assert!(matches!(store.follow((2, 0)), Err(Error::ReferenceCycle((2, 0)))));
    }

    #[test]
    fn set_object_and_allocate() {
        let store = store_for("", &[(1, "true"), (2, "false")]);
        assert_eq!(store.allocate_key().unwrap(), (3, 0));
        store.set_object((4, 0), 42);
        assert_eq!(store.allocate_key().unwrap(), (5, 0));
        store.set_object((2, 3), "replaced");
        assert_eq!(store.resolve((2, 3)).unwrap().as_name().unwrap(), b"replaced");
        assert!(matches!(store.resolve((2, 0)), Err(Error::ObjectNotFound(_))));
        assert_eq!(store.ids(), vec![(1, 0), (2, 3), (4, 0)]);
    }

    #[test]
    fn allocation_stops_at_the_last_number() {
        let mut section = XrefSection::new(0, dictionary! {});
        section.insert(u32::MAX - 1, XrefEntry::Created { generation: 0 });
        let source = MemorySource::from_vec(b"%PDF-1.5\n".to_vec());
        let store = DocumentStore::new(source, XrefTable::merge(vec![section]), CosParser::default());
        assert_eq!(store.allocate_key().unwrap(), (u32::MAX, 0));
        assert!(matches!(store.allocate_key(), Err(Error::ObjectNumbersExhausted)));

        let mut section = XrefSection::new(0, dictionary! {});
        section.insert(u32::MAX, XrefEntry::Created { generation: 0 });
        let source = MemorySource::from_vec(b"%PDF-1.5\n".to_vec());
        let store = DocumentStore::new(source, XrefTable::merge(vec![section]), CosParser::default());
        assert!(matches!(store.allocate_key(), Err(Error::ObjectNumbersExhausted)));
        assert!(matches!(store.allocate_key(), Err(Error::ObjectNumbersExhausted)));
    }

    #[test]
    fn indirect_filter_and_params_are_resolved() {
        let encoded = filters::encode_all(&[&b"FlateDecode"[..]], &[2, 1, 2, 2, 1, 1]).unwrap();
        let mut data = b"%PDF-1.5\n".to_vec();
        let mut section = XrefSection::new(0, dictionary! {});
        let mut object = |number: u32, body: &[u8]| {
            section.insert(number, XrefEntry::Normal { offset: data.len() as u64, generation: 0 });
            data.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
            data.extend_from_slice(body);
            data.extend_from_slice(b"\nendobj\n");
        };
        let stream = |dict: &str| {
            let mut body = format!("<< {dict} /Length {} >>\nstream\n", encoded.len()).into_bytes();
            body.extend_from_slice(&encoded);
            body.extend_from_slice(b"\nendstream");
            body
        };
        object(1, &stream("/Filter /FlateDecode /DecodeParms 2 0 R"));
        object(2, b"<< /Predictor 12 /Columns 2 >>");
        object(3, &stream("/Filter 4 0 R /DecodeParms [5 0 R]"));
        object(4, b"[/FlateDecode]");
        object(5, b"6 0 R");
        object(6, b"<< /Predictor 12 /Columns 2 >>");
        object(7, &stream("/Filter 8 0 R"));
        object(8, b"/FlateDecode");
        let source = MemorySource::from_vec(data);
        let store = DocumentStore::new(source, XrefTable::merge(vec![section]), CosParser::default());

        assert_eq!(store.decoded_content((1, 0)).unwrap(), [1, 2, 2, 3]);
        assert_eq!(store.decoded_content((3, 0)).unwrap(), [1, 2, 2, 3]);
        assert_eq!(store.decoded_content((7, 0)).unwrap(), [2, 1, 2, 2, 1, 1]);
    }

    #[test]
    fn set_objects_survive_set_encryption() {
        let mut store = store_for("", &[(1, "(origin)")]);
        assert_eq!(store.resolve((1, 0)).unwrap().as_str().unwrap(), b"origin");
        let id = store.allocate_key().unwrap();
        store.set_object(id, 7);
        store.set_encryption(EncryptionContext::new(vec![0x11; 5], crate::encryption::CryptMethod::Rc4), None);

        assert_eq!(*store.resolve(id).unwrap(), Object::Integer(7));
        assert!(!store.is_cached((1, 0)));
        assert_ne!(store.resolve((1, 0)).unwrap().as_str().unwrap(), b"origin");
    }

    #[test]
    fn all_objects_goes_past_failures() {
        let store = store_for("", &[(1, "[1 2]"), (3, "null")]);
        write(&store.xref).insert(2, XrefEntry::Normal { offset: 3, generation: 0 });
        let results: Vec<_> = store.all_objects().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert!(results[2].1.is_ok());

        let resolved = store.resolve_all();
        assert_eq!(resolved.objects.len(), 2);
        assert_eq!(resolved.failures.len(), 1);
        assert_eq!(resolved.failures[0].0, (2, 0));
    }
}
