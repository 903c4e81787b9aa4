// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use ahash::RandomState;

/// Key of an object property.
///
/// String keys compare by content, with an identity fast path. Hidden keys
/// compare by identity only, so two hidden keys with the same name are
/// distinct.
#[derive(Clone)]
pub enum PropertyKey {
    String(Arc<str>),
    Hidden(HiddenKey),
    Index(i64),
}

/// An identity-compared property key that guest code cannot name.
#[derive(Clone)]
pub struct HiddenKey(Arc<str>);

impl HiddenKey {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl PartialEq for HiddenKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for HiddenKey {}

impl Hash for HiddenKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const u8 as usize).hash(state);
    }
}

impl fmt::Debug for HiddenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HiddenKey({})", self.0)
    }
}

impl PropertyKey {
    pub fn string(s: &str) -> Self {
        PropertyKey::String(Arc::from(s))
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self, PropertyKey::Hidden(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyKey::String(s) => Some(s),
            _ => None,
        }
    }

    /// Stable 64-bit hash used by the trie property map.
    pub(crate) fn hash_code(&self) -> u64 {
        // Fixed seeds: the trie relies on equal keys hashing equally across
        // every map in the process.
        RandomState::with_seeds(
            0x243f_6a88_85a3_08d3,
            0x1319_8a2e_0370_7344,
            0xa409_3822_299f_31d0,
            0x082e_fa98_ec4e_6c89,
        )
        .hash_one(self)
    }
}

impl PartialEq for PropertyKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropertyKey::String(a), PropertyKey::String(b)) => Arc::ptr_eq(a, b) || a == b,
            (PropertyKey::Hidden(a), PropertyKey::Hidden(b)) => a == b,
            (PropertyKey::Index(a), PropertyKey::Index(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for PropertyKey {}

impl Hash for PropertyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            PropertyKey::String(s) => {
                state.write_u8(0);
                s.hash(state);
            }
            PropertyKey::Hidden(h) => {
                state.write_u8(1);
                h.hash(state);
            }
            PropertyKey::Index(i) => {
                state.write_u8(2);
                i.hash(state);
            }
        }
    }
}

impl fmt::Debug for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{s:?}"),
            PropertyKey::Hidden(h) => write!(f, "{h:?}"),
            PropertyKey::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => f.write_str(s),
            PropertyKey::Hidden(h) => write!(f, "#{}", h.name()),
            PropertyKey::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(value: &str) -> Self {
        PropertyKey::string(value)
    }
}

impl From<String> for PropertyKey {
    fn from(value: String) -> Self {
        PropertyKey::String(Arc::from(value))
    }
}

impl From<i64> for PropertyKey {
    fn from(value: i64) -> Self {
        PropertyKey::Index(value)
    }
}

impl From<HiddenKey> for PropertyKey {
    fn from(value: HiddenKey) -> Self {
        PropertyKey::Hidden(value)
    }
}
