// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/// A shareable flag that starts valid and can be invalidated exactly once.
///
/// Used for shape validity, leaf shapes and per-key property assumptions.
/// Clones observe the same flag.
#[derive(Clone)]
pub struct Assumption(Arc<AtomicBool>);

impl Assumption {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// An assumption that was never valid.
    pub fn never_valid() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns true if this call flipped the assumption.
    pub fn invalidate(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Assumption {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Assumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            f.write_str("Assumption(valid)")
        } else {
            f.write_str("Assumption(invalid)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidation_is_shared_and_one_shot() {
        let a = Assumption::new();
        let b = a.clone();
        assert!(b.is_valid());
        assert!(a.invalidate());
        assert!(!b.is_valid());
        assert!(!b.invalidate());
        assert!(!Assumption::never_valid().is_valid());
    }
}
