// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use crate::{key::PropertyKey, property::Property};

/// Persistent list of properties linked from the most recently added one
/// back to the first. Appending shares the whole previous list.
#[derive(Clone, Default)]
pub(super) struct ConsList {
    head: Option<Arc<ConsNode>>,
}

struct ConsNode {
    property: Property,
    prev: Option<Arc<ConsNode>>,
    len: usize,
}

struct Nodes<'a> {
    next: Option<&'a ConsNode>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a ConsNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.prev.as_deref();
        Some(node)
    }
}

impl ConsList {
    pub(super) fn len(&self) -> usize {
        self.head.as_ref().map_or(0, |node| node.len)
    }

    fn nodes(&self) -> Nodes<'_> {
        Nodes {
            next: self.head.as_deref(),
        }
    }

    pub(super) fn get(&self, key: &PropertyKey) -> Option<&Property> {
        self.nodes()
            .map(|node| &node.property)
            .find(|property| property.key() == key)
    }

    pub(super) fn last(&self) -> Option<&Property> {
        self.head.as_deref().map(|node| &node.property)
    }

    /// Appends a property whose key is not yet present.
    pub(super) fn push(&self, property: Property) -> Self {
        debug_assert!(self.get(property.key()).is_none());
        Self {
            head: Some(Arc::new(ConsNode {
                property,
                prev: self.head.clone(),
                len: self.len() + 1,
            })),
        }
    }

    /// Copy with the property for `key` swapped for `replacement`, or dropped
    /// if `replacement` is None. Entries older than `key` are shared.
    pub(super) fn rebuild(&self, key: &PropertyKey, replacement: Option<Property>) -> Self {
        let mut newer = Vec::new();
        for node in self.nodes() {
            if node.property.key() != key {
                newer.push(&node.property);
                continue;
            }
            let mut list = Self {
                head: node.prev.clone(),
            };
            if let Some(replacement) = replacement {
                list = list.push(replacement);
            }
            for property in newer.into_iter().rev() {
                list = list.push(property.clone());
            }
            return list;
        }
        self.clone()
    }

    /// Properties from newest to oldest.
    pub(super) fn iter_rev(&self) -> impl Iterator<Item = &Property> {
        self.nodes().map(|node| &node.property)
    }

    /// True if `self` extends `other`, sharing all of its nodes.
    #[cfg(test)]
    pub(super) fn shares_prefix(&self, other: &Self) -> bool {
        let Some(other_head) = other.head.as_ref() else {
            return true;
        };
        self.nodes()
            .any(|node| std::ptr::eq(node, Arc::as_ptr(other_head)))
    }
}

impl Drop for ConsList {
    fn drop(&mut self) {
        // Unlink iteratively so long lists do not recurse on drop.
        let mut next = self.head.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.prev.take(),
                Err(_) => break,
            }
        }
    }
}
