// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod cons_list;
mod trie;

use std::fmt;

use cons_list::ConsList;
use trie::Trie;

use crate::{key::PropertyKey, layout::PropertyMapKind, property::Property};

/// Persistent, insertion-ordered map from [`PropertyKey`] to [`Property`].
///
/// Every modification returns a new map and leaves the receiver untouched;
/// unchanged entries are shared between the two.
#[derive(Clone)]
pub struct PropertyMap {
    repr: Repr,
    kind: PropertyMapKind,
}

#[derive(Clone)]
enum Repr {
    ConsList(ConsList),
    Trie(Trie),
}

impl PropertyMap {
    pub fn empty(kind: PropertyMapKind) -> Self {
        let repr = match kind {
            PropertyMapKind::Trie => Repr::Trie(Trie::default()),
            PropertyMapKind::ConsList | PropertyMapKind::Auto { .. } => {
                Repr::ConsList(ConsList::default())
            }
        };
        Self { repr, kind }
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::ConsList(list) => list.len(),
            Repr::Trie(trie) => trie.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &PropertyKey) -> Option<&Property> {
        match &self.repr {
            Repr::ConsList(list) => list.get(key),
            Repr::Trie(trie) => trie.get(key),
        }
    }

    pub fn contains_key(&self, key: &PropertyKey) -> bool {
        self.get(key).is_some()
    }

    /// The most recently added property.
    pub fn last(&self) -> Option<&Property> {
        match &self.repr {
            Repr::ConsList(list) => list.last(),
            Repr::Trie(trie) => trie.last(),
        }
    }

    /// Copy with `property` added at the end, or replacing the property with
    /// the same key in place.
    pub fn copy_and_put(&self, property: Property) -> Self {
        if self.contains_key(property.key()) {
            let key = property.key().clone();
            return self.copy_and_replace(&key, property);
        }
        let repr = match &self.repr {
            Repr::ConsList(list) => match self.kind {
                PropertyMapKind::Auto { trie_threshold } if list.len() + 1 > trie_threshold => {
                    let trie = list
                        .iter_rev()
                        .collect::<Vec<_>>()
                        .into_iter()
                        .rev()
                        .fold(Trie::default(), |trie, p| trie.put(p.clone()));
                    Repr::Trie(trie.put(property))
                }
                _ => Repr::ConsList(list.push(property)),
            },
            Repr::Trie(trie) => Repr::Trie(trie.put(property)),
        };
        Self {
            repr,
            kind: self.kind,
        }
    }

    /// Copy with the property for `key` replaced, keeping its position.
    pub fn copy_and_replace(&self, key: &PropertyKey, property: Property) -> Self {
        debug_assert!(self.contains_key(key));
        debug_assert!(property.key() == key);
        let repr = match &self.repr {
            Repr::ConsList(list) => Repr::ConsList(list.rebuild(key, Some(property))),
            Repr::Trie(trie) => Repr::Trie(trie.put(property)),
        };
        Self {
            repr,
            kind: self.kind,
        }
    }

    pub fn copy_and_remove(&self, key: &PropertyKey) -> Self {
        let repr = match &self.repr {
            Repr::ConsList(list) => Repr::ConsList(list.rebuild(key, None)),
            Repr::Trie(trie) => Repr::Trie(trie.remove(key)),
        };
        Self {
            repr,
            kind: self.kind,
        }
    }

    /// Properties in insertion order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Property> + ExactSizeIterator {
        let properties: Vec<&Property> = match &self.repr {
            Repr::ConsList(list) => {
                let mut properties: Vec<_> = list.iter_rev().collect();
                properties.reverse();
                properties
            }
            Repr::Trie(trie) => trie.iter().collect(),
        };
        properties.into_iter()
    }

    /// Properties from the most recently added one backwards.
    pub fn iter_rev(&self) -> Box<dyn Iterator<Item = &Property> + '_> {
        match &self.repr {
            Repr::ConsList(list) => Box::new(list.iter_rev()),
            Repr::Trie(trie) => Box::new(trie.iter_rev()),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &PropertyKey> {
        self.iter().map(Property::key)
    }

    #[cfg(test)]
    pub(crate) fn is_trie(&self) -> bool {
        matches!(self.repr, Repr::Trie(_))
    }
}

impl fmt::Debug for PropertyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
