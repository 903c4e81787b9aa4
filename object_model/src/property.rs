// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use bitflags::bitflags;

use crate::{key::PropertyKey, location::Location};

bitflags! {
    /// Property flags. The low 16 bits are free for the embedder.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyFlags: u32 {
        const USER_MASK = 0xFFFF;
        /// Not reported by key enumeration unless hidden keys are requested.
        const HIDDEN = 1 << 16;
        /// Property was defined with a constant location.
        const CONSTANT = 1 << 17;
        /// Constant property that rejects writes of a different value
        /// instead of generalizing.
        const FINAL = 1 << 18;
    }
}

impl PropertyFlags {
    pub fn user(bits: u16) -> Self {
        Self::from_bits_retain(bits as u32)
    }

    pub fn user_bits(self) -> u16 {
        (self.bits() & Self::USER_MASK.bits()) as u16
    }
}

/// Immutable association of a key, a location and flags.
///
/// Properties are reference counted so that shapes sharing a prefix share
/// the property records themselves.
#[derive(Clone)]
pub struct Property(Arc<PropertyRecord>);

struct PropertyRecord {
    key: PropertyKey,
    location: Location,
    flags: PropertyFlags,
}

impl Property {
    pub fn new(key: PropertyKey, location: Location, flags: PropertyFlags) -> Self {
        Self(Arc::new(PropertyRecord {
            key,
            location,
            flags,
        }))
    }

    #[inline]
    pub fn key(&self) -> &PropertyKey {
        &self.0.key
    }

    #[inline]
    pub fn location(&self) -> &Location {
        &self.0.location
    }

    #[inline]
    pub fn flags(&self) -> PropertyFlags {
        self.0.flags
    }

    pub fn is_hidden(&self) -> bool {
        self.0.flags.contains(PropertyFlags::HIDDEN) || self.0.key.is_hidden()
    }

    pub fn is_final(&self) -> bool {
        self.0.flags.contains(PropertyFlags::FINAL)
    }

    /// Same property at another location.
    pub fn relocate(&self, location: Location) -> Self {
        if location == self.0.location {
            return self.clone();
        }
        Self::new(self.0.key.clone(), location, self.0.flags)
    }

    pub fn copy_with_flags(&self, flags: PropertyFlags) -> Self {
        if flags == self.0.flags {
            return self.clone();
        }
        Self::new(self.0.key.clone(), self.0.location.clone(), flags)
    }

    /// True if both handles point at the same record.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.0.key == other.0.key
                && self.0.flags == other.0.flags
                && self.0.location == other.0.location)
    }
}

impl Eq for Property {}

impl Hash for Property {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
        self.0.flags.hash(state);
        self.0.location.hash(state);
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.0.key, self.0.location)?;
        if !self.0.flags.is_empty() {
            write!(f, " {:?}", self.0.flags)?;
        }
        Ok(())
    }
}
