// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{
    key::PropertyKey,
    location::Location,
    moves::MovePlan,
    object::{PutMode, PutPlan},
    property::{Property, PropertyFlags},
    shape::{DynamicType, Shape},
    value::{Value, ValueKind},
};

use super::chain::Chain;

/// True if an object currently tagged with `actual` may use an entry
/// recorded for `cached`. Shared shapes are never obsoleted, so identity is
/// enough for them.
#[inline]
pub(super) fn guard(cached: &Shape, actual: &Shape) -> bool {
    cached == actual && (cached.is_shared() || cached.is_valid())
}

/// Shapes whose entries can be recorded at all.
#[inline]
pub(super) fn is_cacheable(shape: &Shape) -> bool {
    shape.is_shared() || shape.is_valid()
}

/// Everything a site remembers about one key.
#[derive(Debug)]
pub(super) struct KeyEntry {
    pub(super) key: PropertyKey,
    pub(super) reads: Chain<ReadEntry>,
    pub(super) puts: Chain<PutEntry>,
    pub(super) removals: Chain<RemoveEntry>,
    pub(super) flag_changes: Chain<FlagsEntry>,
}

impl KeyEntry {
    pub(super) fn new(key: PropertyKey) -> Self {
        Self {
            key,
            reads: Chain::default(),
            puts: Chain::default(),
            removals: Chain::default(),
            flag_changes: Chain::default(),
        }
    }
}

/// Property resolved for a shape; `None` records that the key is missing.
#[derive(Debug)]
pub(super) struct ReadEntry {
    pub(super) shape: Shape,
    pub(super) property: Option<Property>,
}

impl ReadEntry {
    pub(super) fn resolve(shape: &Shape, key: &PropertyKey) -> Option<Self> {
        is_cacheable(shape).then(|| Self {
            shape: shape.clone(),
            property: shape.get_property(key).cloned(),
        })
    }

    pub(super) fn accepts(&self, shape: &Shape) -> bool {
        guard(&self.shape, shape)
    }
}

#[derive(Debug)]
pub(super) struct PutEntry {
    pub(super) old: Shape,
    pub(super) mode: PutMode,
    pub(super) plan: PutPlan,
    /// Location the plan generalized away from. The entry only applies to
    /// values that location cannot store.
    pub(super) generalized: Option<Location>,
    /// Kind of the value the plan was computed for, when it changes the
    /// shape. New locations are chosen by kind.
    pub(super) value_kind: Option<ValueKind>,
}

impl PutEntry {
    pub(super) fn new(
        old: &Shape,
        key: &PropertyKey,
        value: &Value,
        mode: PutMode,
        plan: PutPlan,
    ) -> Option<Self> {
        if !is_cacheable(old) {
            return None;
        }
        let generalized = old
            .get_property(key)
            .map(Property::location)
            .filter(|location| !location.can_store(value))
            .cloned();
        let value_kind = match &plan {
            PutPlan::Write { shape, .. } if shape != old => Some(value.kind()),
            _ => None,
        };
        Some(Self {
            old: old.clone(),
            mode,
            plan,
            generalized,
            value_kind,
        })
    }

    pub(super) fn accepts(&self, shape: &Shape, mode: PutMode, value: &Value) -> bool {
        if !guard(&self.old, shape) || self.mode != mode {
            return false;
        }
        match &self.plan {
            PutPlan::Skip => true,
            PutPlan::Write {
                shape, property, ..
            } => {
                property.location().can_store(value)
                    && is_cacheable(shape)
                    && self.value_kind.is_none_or(|kind| kind == value.kind())
                    && self
                        .generalized
                        .as_ref()
                        .is_none_or(|location| !location.can_store(value))
            }
        }
    }
}

#[derive(Debug)]
pub(super) struct Removal {
    pub(super) property: Property,
    pub(super) shape: Shape,
    pub(super) moves: MovePlan,
}

/// Removal plan for a shape; `None` records that the key is missing.
#[derive(Debug)]
pub(super) struct RemoveEntry {
    pub(super) old: Shape,
    pub(super) removal: Option<Removal>,
}

impl RemoveEntry {
    pub(super) fn plan(old: &Shape, key: &PropertyKey) -> Option<Self> {
        if !is_cacheable(old) {
            return None;
        }
        let removal = old.get_property(key).cloned().map(|property| {
            let shape = old.remove_property(&property);
            let moves = MovePlan::between(old, &shape, None);
            Removal {
                property,
                shape,
                moves,
            }
        });
        Some(Self {
            old: old.clone(),
            removal,
        })
    }

    pub(super) fn accepts(&self, shape: &Shape) -> bool {
        guard(&self.old, shape)
            && self
                .removal
                .as_ref()
                .is_none_or(|removal| is_cacheable(&removal.shape))
    }
}

/// Property flags change for a shape; `new` is `None` if the key is
/// missing.
#[derive(Debug)]
pub(super) struct FlagsEntry {
    pub(super) old: Shape,
    pub(super) flags: PropertyFlags,
    pub(super) new: Option<Shape>,
}

impl FlagsEntry {
    pub(super) fn plan(old: &Shape, key: &PropertyKey, flags: PropertyFlags) -> Option<Self> {
        if !is_cacheable(old) {
            return None;
        }
        let new = old.get_property(key).map(|property| {
            if property.flags() == flags {
                old.clone()
            } else {
                old.replace_property(property, property.copy_with_flags(flags))
            }
        });
        Some(Self {
            old: old.clone(),
            flags,
            new,
        })
    }

    pub(super) fn accepts(&self, shape: &Shape, flags: PropertyFlags) -> bool {
        guard(&self.old, shape)
            && self.flags == flags
            && self.new.as_ref().is_none_or(is_cacheable)
    }
}

/// Shape-wide changes that do not depend on a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ShapeChange {
    DynamicType(DynamicType),
    Flags(u32),
    MakeShared,
}

#[derive(Debug)]
pub(super) struct ShapeChangeEntry {
    pub(super) old: Shape,
    pub(super) change: ShapeChange,
    pub(super) new: Shape,
    pub(super) moves: MovePlan,
}

impl ShapeChangeEntry {
    pub(super) fn plan(old: &Shape, change: ShapeChange) -> Option<Self> {
        if !is_cacheable(old) {
            return None;
        }
        let new = match change {
            ShapeChange::DynamicType(dynamic_type) => old.set_dynamic_type(dynamic_type),
            ShapeChange::Flags(flags) => old.set_flags(flags),
            ShapeChange::MakeShared => old.make_shared(),
        };
        let moves = MovePlan::between(old, &new, None);
        Some(Self {
            old: old.clone(),
            change,
            new,
            moves,
        })
    }

    pub(super) fn accepts(&self, shape: &Shape, change: ShapeChange) -> bool {
        guard(&self.old, shape) && self.change == change && is_cacheable(&self.new)
    }
}
