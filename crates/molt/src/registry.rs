//! Per-kind object registries.
//!
//! A [`Registry`] owns every object of one kind for one side of a diff.
//! Insertion order is preserved (catalog queries order their rows, the
//! document loader keeps declaration order), which keeps emitted statements
//! deterministic. A registry is populated once and read-only afterwards;
//! re-deriving state means building a fresh graph.

use indexmap::IndexMap;

use crate::error::Error;
use crate::object::{Key, Kind, Object};

#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    kind: Kind,
    map: IndexMap<Key, Object>,
}

impl Registry {
    pub fn new(kind: Kind) -> Registry {
        Registry {
            kind,
            map: IndexMap::new(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Insert an object, rejecting key collisions: two objects of one kind
    /// resolving to the same composite key is an invariant violation, never
    /// a silent overwrite.
    pub fn insert(&mut self, object: Object) -> Result<(), Error> {
        debug_assert_eq!(object.kind, self.kind);
        if self.map.contains_key(&object.key) {
            return Err(Error::DuplicateKey {
                kind: self.kind.word(),
                key: object.key.to_string(),
            });
        }
        self.map.insert(object.key.clone(), object);
        Ok(())
    }

    pub fn get(&self, key: &Key) -> Option<&Object> {
        self.map.get(key)
    }

    pub fn get_mut(&mut self, key: &Key) -> Option<&mut Object> {
        self.map.get_mut(key)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.map.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.map.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.map.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Object> {
        self.map.values_mut()
    }

    /// Keep only objects satisfying the predicate (scope filtering).
    pub fn retain(&mut self, mut keep: impl FnMut(&Object) -> bool) {
        self.map.retain(|_, obj| keep(obj));
    }

    /// Drop every member. Used when a whole registry is excluded from a
    /// scoped run.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut reg = Registry::new(Kind::Table);
        let key = Key::two("public", "orders");
        reg.insert(Object::new(Kind::Table, key.clone())).unwrap();
        let err = reg.insert(Object::new(Kind::Table, key)).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { kind: "table", .. }));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut reg = Registry::new(Kind::Schema);
        for name in ["zeta", "alpha", "midway"] {
            reg.insert(Object::new(Kind::Schema, Key::one(name))).unwrap();
        }
        let names: Vec<&str> = reg.iter().map(|o| o.name()).collect();
        assert_eq!(names, ["zeta", "alpha", "midway"]);
    }
}
