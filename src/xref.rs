use std::collections::BTreeMap;

use crate::{Dictionary, Object, ObjectId};

/// Where an object lives, according to one cross-reference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// Deleted in the section that lists it.
    Free,
    /// Byte offset of `N G obj` in the origin.
    Normal { offset: u64, generation: u16 },
    /// Object `index` of the object stream `container`.
    Compressed { container: u32, index: u32 },
    /// Registered in memory, it has no bytes in the origin.
    Created { generation: u16 },
}

impl XrefEntry {
    pub fn is_free(&self) -> bool {
        matches!(self, XrefEntry::Free)
    }

    /// Generation of the object the entry points at. Objects in object
    /// streams always have generation 0.
    pub fn generation(&self) -> Option<u16> {
        match *self {
            XrefEntry::Free => None,
            XrefEntry::Normal { generation, .. } | XrefEntry::Created { generation } => Some(generation),
            XrefEntry::Compressed { .. } => Some(0),
        }
    }
}

/// One cross-reference section with its trailer, as written by one save.
#[derive(Debug, Clone, Default)]
pub struct XrefSection {
    /// Offset of the section's own data (`xref` keyword or xref stream object).
    pub start: u64,
    pub entries: BTreeMap<u32, XrefEntry>,
    pub trailer: Dictionary,
}

impl XrefSection {
    pub fn new(start: u64, trailer: Dictionary) -> Self {
        XrefSection {
            start,
            entries: BTreeMap::new(),
            trailer,
        }
    }

    pub fn insert(&mut self, number: u32, entry: XrefEntry) {
        self.entries.insert(number, entry);
    }

    pub fn get(&self, number: u32) -> Option<&XrefEntry> {
        self.entries.get(&number)
    }

    /// Offset of the previous section, from the trailer's `/Prev`.
    pub fn prev(&self) -> Option<i64> {
        self.trailer.get(b"Prev").and_then(Object::as_i64).ok()
    }

    /// Offset of a hybrid file's cross-reference stream, from `/XRefStm`.
    pub fn xref_stream(&self) -> Option<i64> {
        self.trailer.get(b"XRefStm").and_then(Object::as_i64).ok()
    }

    /// Takes over the entries of a hybrid file's cross-reference stream for
    /// every object this section leaves out or marks free.
    pub fn absorb_stream(&mut self, stream: XrefSection) {
        for (number, entry) in stream.entries {
            let replace = self.entries.get(&number).is_none_or(XrefEntry::is_free);
            if replace {
                self.entries.insert(number, entry);
            }
        }
    }
}

/// All sections of a file folded into one offset table.
#[derive(Debug, Clone, Default)]
pub struct XrefTable {
    entries: BTreeMap<u32, XrefEntry>,
    first_trailer: Dictionary,
    last_trailer: Dictionary,
    start_xref: Option<u64>,
    section_count: usize,
}

impl XrefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `sections`, given oldest first.
    pub fn merge<I: IntoIterator<Item = XrefSection>>(sections: I) -> Self {
        let mut table = XrefTable::new();
        sections.into_iter().for_each(|section| table.apply(section));
        table
    }

    /// Layers `section` on top of everything merged so far: its entries
    /// replace older ones for the same object number, whatever their
    /// generation, and its free entries delete the number.
    pub fn apply(&mut self, section: XrefSection) {
        if self.section_count == 0 {
            self.first_trailer = section.trailer.clone();
        }
        for (number, entry) in section.entries {
            match entry {
                XrefEntry::Free => {
                    self.entries.remove(&number);
                }
                entry => {
                    self.entries.insert(number, entry);
                }
            }
        }
        self.last_trailer = section.trailer;
        self.start_xref = Some(section.start);
        self.section_count += 1;
    }

    /// Entry for `id`, provided the generation matches.
    pub fn get(&self, id: ObjectId) -> Option<&XrefEntry> {
        self.entries
            .get(&id.0)
            .filter(|entry| entry.generation() == Some(id.1))
    }

    /// Entry for an object number, whatever its generation.
    pub fn entry(&self, number: u32) -> Option<&XrefEntry> {
        self.entries.get(&number)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    pub fn contains_number(&self, number: u32) -> bool {
        self.entries.contains_key(&number)
    }

    pub fn insert(&mut self, number: u32, entry: XrefEntry) {
        self.entries.insert(number, entry);
    }

    /// Highest object number in use, 0 for an empty table.
    pub fn max_number(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    /// Keys of every object in the table, in object number order.
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.entries
            .iter()
            .filter_map(|(number, entry)| entry.generation().map(|generation| (*number, generation)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &XrefEntry)> + '_ {
        self.entries.iter().map(|(number, entry)| (*number, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Trailer of the oldest section.
    pub fn first_trailer(&self) -> &Dictionary {
        &self.first_trailer
    }

    /// Trailer of the newest section, the one that names `Root`, `Encrypt` and `ID`.
    pub fn trailer(&self) -> &Dictionary {
        &self.last_trailer
    }

    pub fn trailer_mut(&mut self) -> &mut Dictionary {
        &mut self.last_trailer
    }

    /// Start of the newest section.
    pub fn start_xref(&self) -> Option<u64> {
        self.start_xref
    }

    pub fn section_count(&self) -> usize {
        self.section_count
    }
}
