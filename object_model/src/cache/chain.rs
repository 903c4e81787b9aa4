// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Result of probing a [`Chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe<T> {
    Hit(T),
    Miss,
    /// The chain gave up caching; take the uncached path.
    Generic,
}

impl<T> Probe<T> {
    /// Drops the hit, keeping whether the chain is still specialized.
    pub(crate) fn map_miss<U>(self) -> Probe<U> {
        match self {
            Probe::Hit(_) | Probe::Miss => Probe::Miss,
            Probe::Generic => Probe::Generic,
        }
    }
}

/// Capped list of cache entries, newest first.
///
/// Once more than `limit` entries would be needed the chain turns
/// [`Chain::Generic`] for good.
#[derive(Debug)]
pub(crate) enum Chain<T> {
    Specialized {
        head: Option<Box<Node<T>>>,
        len: usize,
    },
    Generic,
}

#[derive(Debug)]
pub(crate) struct Node<T> {
    entry: T,
    next: Option<Box<Node<T>>>,
}

impl<T> Default for Chain<T> {
    fn default() -> Self {
        Chain::Specialized { head: None, len: 0 }
    }
}

impl<T> Chain<T> {
    pub(crate) fn is_generic(&self) -> bool {
        matches!(self, Chain::Generic)
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Chain::Specialized { len, .. } => *len,
            Chain::Generic => 0,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        let mut cursor = match self {
            Chain::Specialized { head, .. } => head.as_deref(),
            Chain::Generic => None,
        };
        std::iter::from_fn(move || {
            let node = cursor?;
            cursor = node.next.as_deref();
            Some(&node.entry)
        })
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        let mut cursor = match self {
            Chain::Specialized { head, .. } => head.as_deref_mut(),
            Chain::Generic => None,
        };
        std::iter::from_fn(move || {
            let node = cursor.take()?;
            cursor = node.next.as_deref_mut();
            Some(&mut node.entry)
        })
    }

    pub(crate) fn find(&self, mut accept: impl FnMut(&T) -> bool) -> Probe<&T> {
        if self.is_generic() {
            return Probe::Generic;
        }
        match self.iter().find(|entry| accept(entry)) {
            Some(entry) => Probe::Hit(entry),
            None => Probe::Miss,
        }
    }

    /// Prepends `entry`. Returns `None` if that would exceed `limit`; the
    /// chain is generic afterwards.
    pub(crate) fn push(&mut self, entry: T, limit: usize) -> Option<&mut T> {
        if let Chain::Specialized { len, .. } = self
            && *len >= limit
        {
            *self = Chain::Generic;
            return None;
        }
        let Chain::Specialized { head, len } = self else {
            return None;
        };
        *len += 1;
        let next = head.take();
        let node = head.insert(Box::new(Node { entry, next }));
        Some(&mut node.entry)
    }
}
