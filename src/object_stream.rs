use std::collections::BTreeMap;
use std::str::FromStr;

use log::warn;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::error::ParseError;
use crate::parser;
use crate::{Dictionary, Error, Object, ObjectId, Result};

/// The objects of one decoded object stream, by their position in it.
#[derive(Debug, Default)]
pub struct ObjectStream {
    objects: BTreeMap<u32, (u32, Object)>,
}

impl ObjectStream {
    /// Parses every object of a stream whose decoded data is `content`.
    /// Objects that fail to parse are left out with a warning.
    pub fn new(dict: &Dictionary, content: &[u8]) -> Result<ObjectStream> {
        if content.is_empty() {
            return Ok(ObjectStream::default());
        }

        let first_offset: usize = dict
            .get(b"First")
            .and_then(Object::as_i64)?
            .try_into()
            .map_err(|_| ParseError::InvalidObjectStream)?;
        let index_block = content
            .get(..first_offset)
            .ok_or(Error::InvalidOffset(first_offset as u64))?;

        let numbers_str = std::str::from_utf8(index_block)?;
        let numbers: Vec<_> = numbers_str
            .split_whitespace()
            .map(|number| usize::from_str(number).ok())
            .collect();
        let len = numbers.len() / 2 * 2;

        let n = dict.get(b"N").and_then(Object::as_i64)?;
        if numbers.len().try_into().ok() != n.checked_mul(2) {
            warn!("object stream: the object stream dictionary specifies a wrong number of objects")
        }

        let parse_entry = |(index, chunk): (usize, &[Option<usize>])| {
            let number = u32::try_from(chunk[0]?).ok()?;
            let offset = first_offset.checked_add(chunk[1]?)?;
            if offset >= content.len() {
                warn!("out-of-bounds offset {offset} for object {number} in object stream");
                return None;
            }
            let Some(object) = parser::direct_object(&content[offset..]) else {
                warn!("object {number} in object stream can't be parsed");
                return None;
            };
            Some((index as u32, (number, object)))
        };
        #[cfg(feature = "rayon")]
        let objects = numbers[..len].par_chunks(2).enumerate().filter_map(parse_entry).collect();
        #[cfg(not(feature = "rayon"))]
        let objects = numbers[..len].chunks(2).enumerate().filter_map(parse_entry).collect();

        Ok(ObjectStream { objects })
    }

    /// The object stored at `index`, which must be `id`. When the entry at
    /// `index` holds another object, the stream is searched for `id`.
    pub fn get(&self, index: u32, id: ObjectId) -> Result<&Object> {
        if id.1 != 0 {
            return Err(Error::ObjectNotFound(id));
        }
        match self.objects.get(&index) {
            Some((number, object)) if *number == id.0 => Ok(object),
            _ => self
                .objects
                .values()
                .find(|(number, _)| *number == id.0)
                .map(|(_, object)| {
                    warn!("object {id:?} isn't at index {index} of its object stream");
                    object
                })
                .ok_or(Error::ObjectNotFound(id)),
        }
    }

    /// Keys and objects in stream order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> + '_ {
        self.objects.values().map(|(number, object)| ((*number, 0), object))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;

    fn container(header: &str, body: &str, n: i64) -> (Dictionary, Vec<u8>) {
        let dict = dictionary! { "Type" => "ObjStm", "N" => n, "First" => header.len() as i64 };
        (dict, format!("{header}{body}").into_bytes())
    }

    #[test]
    fn objects_by_index() {
        let (dict, content) = container("11 0 12 6 13 12 ", "(abc) [1 2] <</K 3>>", 3);
        let stream = ObjectStream::new(&dict, &content).unwrap();
        assert_eq!(stream.len(), 3);
        assert_eq!(stream.get(0, (11, 0)).unwrap(), &Object::string_literal("abc"));
        assert_eq!(stream.get(1, (12, 0)).unwrap(), &Object::Array(vec![1.into(), 2.into()]));
        assert_eq!(stream.get(2, (13, 0)).unwrap().as_dict().unwrap().get(b"K").unwrap(), &Object::Integer(3));
        // wrong index falls back to a search
        assert_eq!(stream.get(0, (13, 0)).unwrap().as_dict().unwrap().len(), 1);
        assert!(matches!(stream.get(0, (14, 0)), Err(Error::ObjectNotFound((14, 0)))));
        assert!(stream.get(0, (11, 1)).is_err());
        let ids: Vec<_> = stream.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![(11, 0), (12, 0), (13, 0)]);
    }

    #[test]
    fn bad_offsets_are_skipped() {
        let (dict, content) = container("1 0 2 500 ", "true", 2);
        let stream = ObjectStream::new(&dict, &content).unwrap();
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.get(0, (1, 0)).unwrap(), &Object::Boolean(true));
    }

    #[test]
    fn empty_and_invalid() {
        let dict = dictionary! { "N" => 0, "First" => 0 };
        assert!(ObjectStream::new(&dict, b"").unwrap().is_empty());
        let dict = dictionary! { "N" => 1, "First" => 100 };
        assert!(ObjectStream::new(&dict, b"1 0 null").is_err());
    }
}
