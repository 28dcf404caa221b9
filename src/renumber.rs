use std::collections::HashMap;

use crate::{FREE_OBJECT_ID, Object, ObjectId};

/// Assigns compact keys to objects in the order they are first seen:
/// `1 0`, `2 0`, and so on. The free key maps to itself.
#[derive(Debug, Clone)]
pub struct Renumbering {
    map: HashMap<ObjectId, ObjectId>,
}

impl Default for Renumbering {
    fn default() -> Self {
        Self::new()
    }
}

impl Renumbering {
    pub fn new() -> Self {
        let mut map = HashMap::new();
        map.insert(FREE_OBJECT_ID, FREE_OBJECT_ID);
        Renumbering { map }
    }

    /// New key for `id`, assigned now if `id` wasn't seen before.
    pub fn key_for(&mut self, id: ObjectId) -> ObjectId {
        let next = (self.map.len() as u32, 0);
        *self.map.entry(id).or_insert(next)
    }

    /// New key for `id` if it has one already.
    pub fn get(&self, id: ObjectId) -> Option<ObjectId> {
        self.map.get(&id).copied()
    }

    /// Number of keys assigned, the free key included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() <= 1
    }

    /// Rewrites every reference inside `object`, assigning keys to the ones
    /// not seen yet.
    pub fn apply(&mut self, object: &mut Object) {
        match object {
            Object::Reference(id) => *id = self.key_for(*id),
            Object::Array(items) => items.iter_mut().for_each(|item| self.apply(item)),
            Object::Dictionary(dict) => dict.iter_mut().for_each(|(_, value)| self.apply(value)),
            Object::Stream(stream) => stream.dict.iter_mut().for_each(|(_, value)| self.apply(value)),
            _ => {}
        }
    }

    /// Old and new keys, ordered by new key.
    pub fn pairs(&self) -> Vec<(ObjectId, ObjectId)> {
        let mut pairs: Vec<_> = self
            .map
            .iter()
            .filter(|(old, _)| **old != FREE_OBJECT_ID)
            .map(|(old, new)| (*old, *new))
            .collect();
        pairs.sort_by_key(|(_, new)| *new);
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Stream, dictionary};

    #[test]
    fn first_seen_order() {
        let mut renumbering = Renumbering::new();
        assert!(renumbering.is_empty());
        assert_eq!(renumbering.key_for((12, 0)), (1, 0));
        assert_eq!(renumbering.key_for((7, 3)), (2, 0));
        assert_eq!(renumbering.key_for((12, 0)), (1, 0));
        assert_eq!(renumbering.key_for(FREE_OBJECT_ID), FREE_OBJECT_ID);
        assert_eq!(renumbering.get((99, 0)), None);
        assert_eq!(renumbering.pairs(), vec![((12, 0), (1, 0)), ((7, 3), (2, 0))]);
    }

    #[test]
    fn rewrites_nested_references() {
        let mut object = Object::Dictionary(dictionary! {
            "Kids" => vec![Object::Reference((40, 0)), Object::Reference((30, 0))],
            "Parent" => Object::Reference((40, 0)),
            "Contents" => Stream::new(dictionary! { "Resources" => Object::Reference((50, 0)) }, vec![]),
        });
        let mut renumbering = Renumbering::new();
        renumbering.apply(&mut object);

        let dict = object.as_dict().unwrap();
        assert_eq!(
            dict.get(b"Kids").unwrap().as_array().unwrap(),
            &vec![Object::Reference((1, 0)), Object::Reference((2, 0))]
        );
        assert_eq!(dict.get(b"Parent").unwrap(), &Object::Reference((1, 0)));
        let contents = dict.get(b"Contents").unwrap().as_stream().unwrap();
        assert_eq!(contents.dict.get(b"Resources").unwrap(), &Object::Reference((3, 0)));
        assert_eq!(renumbering.len(), 4);
    }
}
