// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bitflags::bitflags;

use crate::{
    error::{ObjectModelError, ObjectModelResult},
    key::PropertyKey,
    moves::MovePlan,
    property::{Property, PropertyFlags},
    shape::{LocationFactory, Shape},
    value::Value,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) struct PutFlags: u8 {
        /// Only write properties that already exist.
        const SET_EXISTING = 1 << 0;
        /// Replace the property flags of an existing property.
        const UPDATE_FLAGS = 1 << 1;
        /// New properties get a constant location.
        const CONSTANT = 1 << 2;
        /// New properties get a declared location.
        const DECLARE = 1 << 3;
    }
}

/// Everything that distinguishes one kind of write from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PutMode {
    pub(crate) flags: PutFlags,
    pub(crate) property_flags: PropertyFlags,
}

impl PutMode {
    pub(crate) const PUT: PutMode = PutMode {
        flags: PutFlags::empty(),
        property_flags: PropertyFlags::empty(),
    };

    pub(crate) const PUT_IF_PRESENT: PutMode = PutMode {
        flags: PutFlags::SET_EXISTING,
        property_flags: PropertyFlags::empty(),
    };

    pub(crate) fn with_flags(property_flags: PropertyFlags) -> Self {
        Self {
            flags: PutFlags::UPDATE_FLAGS,
            property_flags,
        }
    }

    pub(crate) fn constant(property_flags: PropertyFlags) -> Self {
        Self {
            flags: PutFlags::UPDATE_FLAGS | PutFlags::CONSTANT,
            property_flags: property_flags | PropertyFlags::CONSTANT,
        }
    }

    pub(crate) fn declare(property_flags: PropertyFlags) -> Self {
        Self {
            flags: PutFlags::UPDATE_FLAGS | PutFlags::DECLARE,
            property_flags,
        }
    }

    fn factory(self) -> LocationFactory {
        if self.flags.contains(PutFlags::CONSTANT) {
            LocationFactory::Constant
        } else if self.flags.contains(PutFlags::DECLARE) {
            LocationFactory::Declared
        } else {
            LocationFactory::Default
        }
    }
}

/// Outcome of planning a write against a shape.
#[derive(Debug, Clone)]
pub(crate) enum PutPlan {
    /// The key is missing and the write only applies to existing keys.
    Skip,
    /// Switch to `shape` (possibly the current one), relocating values per
    /// `moves`, then write the value into `property`'s location.
    Write {
        shape: Shape,
        property: Property,
        moves: MovePlan,
    },
}

/// Computes how an object of shape `old` stores `value` under `key`.
///
/// Fails only when a final constant property would have to change its
/// value.
pub(crate) fn plan_put(
    old: &Shape,
    key: &PropertyKey,
    value: &Value,
    mode: PutMode,
) -> ObjectModelResult<PutPlan> {
    let flags = match old.get_property(key) {
        None if mode.flags.contains(PutFlags::SET_EXISTING) => return Ok(PutPlan::Skip),
        None => mode.property_flags,
        Some(existing) => {
            let can_store = existing.location().can_store(value);
            // A final constant keeps its value whatever flags the write asks for.
            if !can_store && existing.is_final() && existing.location().is_constant() {
                return Err(ObjectModelError::incompatible(existing.location(), value));
            }
            let update_flags = mode.flags.contains(PutFlags::UPDATE_FLAGS)
                && existing.flags() != mode.property_flags;
            if !update_flags && can_store {
                return Ok(PutPlan::Write {
                    shape: old.clone(),
                    property: existing.clone(),
                    moves: MovePlan::default(),
                });
            }
            if mode.flags.contains(PutFlags::UPDATE_FLAGS) {
                mode.property_flags
            } else {
                existing.flags()
            }
        }
    };
    let shape = old.define_property_with(key.clone(), value, flags, mode.factory());
    let Some(property) = shape.get_property(key).cloned() else {
        unreachable!("defined property {key:?} missing from {shape}");
    };
    let moves = MovePlan::between(old, &shape, Some(key));
    Ok(PutPlan::Write {
        shape,
        property,
        moves,
    })
}
