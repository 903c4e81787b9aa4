// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hash array mapped trie keyed by [`PropertyKey`].
//!
//! Every entry also records the keys of its insertion-order neighbours so
//! the map can be walked in order from `head` or in reverse from `tail`.

use std::sync::Arc;

use crate::{key::PropertyKey, property::Property};

const BITS: u32 = 5;
const MASK: u64 = (1 << BITS) - 1;

#[derive(Clone, Default)]
pub(super) struct Trie {
    root: Option<Arc<Node>>,
    len: usize,
    head: Option<PropertyKey>,
    tail: Option<PropertyKey>,
}

#[derive(Clone)]
struct Entry {
    property: Property,
    prev: Option<PropertyKey>,
    next: Option<PropertyKey>,
}

/// Bitmap-indexed branch. Leaves hold every entry whose full hash is equal.
#[derive(Clone)]
struct Node {
    bitmap: u32,
    children: Box<[Child]>,
}

#[derive(Clone)]
enum Child {
    Leaf { hash: u64, entries: Box<[Entry]> },
    Node(Arc<Node>),
}

#[inline]
fn index_at(hash: u64, shift: u32) -> u32 {
    ((hash >> shift) & MASK) as u32
}

impl Node {
    #[inline]
    fn position(&self, bit: u32) -> usize {
        (self.bitmap & (bit - 1)).count_ones() as usize
    }

    fn get(&self, hash: u64, key: &PropertyKey, shift: u32) -> Option<&Entry> {
        let bit = 1 << index_at(hash, shift);
        if self.bitmap & bit == 0 {
            return None;
        }
        match &self.children[self.position(bit)] {
            Child::Leaf {
                hash: leaf_hash,
                entries,
            } => {
                if *leaf_hash != hash {
                    return None;
                }
                entries.iter().find(|e| e.property.key() == key)
            }
            Child::Node(node) => node.get(hash, key, shift + BITS),
        }
    }

    /// Copy with `entry` inserted, replacing an entry with the same key.
    fn insert(&self, hash: u64, entry: Entry, shift: u32) -> Node {
        let bit = 1 << index_at(hash, shift);
        let position = self.position(bit);
        let mut children = self.children.to_vec();
        if self.bitmap & bit == 0 {
            children.insert(
                position,
                Child::Leaf {
                    hash,
                    entries: Box::new([entry]),
                },
            );
            return Node {
                bitmap: self.bitmap | bit,
                children: children.into_boxed_slice(),
            };
        }
        children[position] = match &self.children[position] {
            Child::Leaf {
                hash: leaf_hash,
                entries,
            } if *leaf_hash == hash => {
                let mut entries = entries.to_vec();
                match entries
                    .iter()
                    .position(|e| e.property.key() == entry.property.key())
                {
                    Some(i) => entries[i] = entry,
                    None => entries.push(entry),
                }
                Child::Leaf {
                    hash,
                    entries: entries.into_boxed_slice(),
                }
            }
            Child::Leaf {
                hash: leaf_hash,
                entries,
            } => Child::Node(Arc::new(Node::pair(
                Child::Leaf {
                    hash: *leaf_hash,
                    entries: entries.clone(),
                },
                *leaf_hash,
                Child::Leaf {
                    hash,
                    entries: Box::new([entry]),
                },
                hash,
                shift + BITS,
            ))),
            Child::Node(node) => Child::Node(Arc::new(node.insert(hash, entry, shift + BITS))),
        };
        Node {
            bitmap: self.bitmap,
            children: children.into_boxed_slice(),
        }
    }

    /// Branch holding two leaves with distinct hashes.
    fn pair(a: Child, a_hash: u64, b: Child, b_hash: u64, shift: u32) -> Node {
        debug_assert_ne!(a_hash, b_hash);
        let a_index = index_at(a_hash, shift);
        let b_index = index_at(b_hash, shift);
        if a_index == b_index {
            return Node {
                bitmap: 1 << a_index,
                children: Box::new([Child::Node(Arc::new(Node::pair(
                    a,
                    a_hash,
                    b,
                    b_hash,
                    shift + BITS,
                )))]),
            };
        }
        let children = if a_index < b_index { [a, b] } else { [b, a] };
        Node {
            bitmap: (1 << a_index) | (1 << b_index),
            children: Box::new(children),
        }
    }

    /// Copy without `key`. Returns `None` if the key is absent, `Some(None)`
    /// if the node became empty.
    fn remove(&self, hash: u64, key: &PropertyKey, shift: u32) -> Option<Option<Node>> {
        let bit = 1 << index_at(hash, shift);
        if self.bitmap & bit == 0 {
            return None;
        }
        let position = self.position(bit);
        let replacement = match &self.children[position] {
            Child::Leaf {
                hash: leaf_hash,
                entries,
            } => {
                if *leaf_hash != hash {
                    return None;
                }
                let i = entries.iter().position(|e| e.property.key() == key)?;
                if entries.len() == 1 {
                    None
                } else {
                    let mut entries = entries.to_vec();
                    entries.remove(i);
                    Some(Child::Leaf {
                        hash,
                        entries: entries.into_boxed_slice(),
                    })
                }
            }
            Child::Node(node) => match node.remove(hash, key, shift + BITS)? {
                None => None,
                // Pull a lone leaf up so branches never hold a single leaf.
                Some(node)
                    if node.children.len() == 1
                        && matches!(node.children[0], Child::Leaf { .. }) =>
                {
                    Some(node.children[0].clone())
                }
                Some(node) => Some(Child::Node(Arc::new(node))),
            },
        };
        let mut children = self.children.to_vec();
        let bitmap = match replacement {
            Some(child) => {
                children[position] = child;
                self.bitmap
            }
            None => {
                children.remove(position);
                self.bitmap & !bit
            }
        };
        if bitmap == 0 {
            return Some(None);
        }
        Some(Some(Node {
            bitmap,
            children: children.into_boxed_slice(),
        }))
    }
}

impl Trie {
    pub(super) fn len(&self) -> usize {
        self.len
    }

    fn entry(&self, key: &PropertyKey) -> Option<&Entry> {
        self.root.as_ref()?.get(key.hash_code(), key, 0)
    }

    pub(super) fn get(&self, key: &PropertyKey) -> Option<&Property> {
        self.entry(key).map(|e| &e.property)
    }

    pub(super) fn last(&self) -> Option<&Property> {
        self.get(self.tail.as_ref()?)
    }

    fn with_entry(root: Option<&Arc<Node>>, entry: Entry) -> Arc<Node> {
        let hash = entry.property.key().hash_code();
        let node = match root {
            Some(root) => root.insert(hash, entry, 0),
            None => Node {
                bitmap: 1 << index_at(hash, 0),
                children: Box::new([Child::Leaf {
                    hash,
                    entries: Box::new([entry]),
                }]),
            },
        };
        Arc::new(node)
    }

    /// Copy of `root` with the entry for `key` modified by `f`.
    fn update(root: Arc<Node>, key: &PropertyKey, f: impl FnOnce(&mut Entry)) -> Arc<Node> {
        let Some(mut entry) = root.get(key.hash_code(), key, 0).cloned() else {
            return root;
        };
        f(&mut entry);
        Self::with_entry(Some(&root), entry)
    }

    /// Appends `property`, or replaces the property with its key in place.
    pub(super) fn put(&self, property: Property) -> Self {
        let key = property.key().clone();
        if let Some(existing) = self.entry(&key) {
            let entry = Entry {
                property,
                prev: existing.prev.clone(),
                next: existing.next.clone(),
            };
            return Self {
                root: Some(Self::with_entry(self.root.as_ref(), entry)),
                len: self.len,
                head: self.head.clone(),
                tail: self.tail.clone(),
            };
        }
        let entry = Entry {
            property,
            prev: self.tail.clone(),
            next: None,
        };
        let mut root = Self::with_entry(self.root.as_ref(), entry);
        if let Some(tail) = &self.tail {
            root = Self::update(root, tail, |e| e.next = Some(key.clone()));
        }
        Self {
            root: Some(root),
            len: self.len + 1,
            head: self.head.clone().or_else(|| Some(key.clone())),
            tail: Some(key),
        }
    }

    pub(super) fn remove(&self, key: &PropertyKey) -> Self {
        let (Some(root), Some(entry)) = (self.root.as_ref(), self.entry(key)) else {
            return self.clone();
        };
        let Entry { prev, next, .. } = entry.clone();
        let mut root = match root.remove(key.hash_code(), key, 0) {
            Some(Some(node)) => Some(Arc::new(node)),
            _ => None,
        };
        if let Some(prev_key) = &prev
            && let Some(r) = root.take()
        {
            root = Some(Self::update(r, prev_key, |e| e.next = next.clone()));
        }
        if let Some(next_key) = &next
            && let Some(r) = root.take()
        {
            root = Some(Self::update(r, next_key, |e| e.prev = prev.clone()));
        }
        let head = if self.head.as_ref() == Some(key) {
            next.clone()
        } else {
            self.head.clone()
        };
        let tail = if self.tail.as_ref() == Some(key) {
            prev.clone()
        } else {
            self.tail.clone()
        };
        Self {
            root,
            len: self.len - 1,
            head,
            tail,
        }
    }

    pub(super) fn iter(&self) -> impl Iterator<Item = &Property> {
        let mut cursor = self.head.as_ref();
        std::iter::from_fn(move || {
            let entry = self.entry(cursor?)?;
            cursor = entry.next.as_ref();
            Some(&entry.property)
        })
    }

    pub(super) fn iter_rev(&self) -> impl Iterator<Item = &Property> {
        let mut cursor = self.tail.as_ref();
        std::iter::from_fn(move || {
            let entry = self.entry(cursor?)?;
            cursor = entry.prev.as_ref();
            Some(&entry.property)
        })
    }
}
