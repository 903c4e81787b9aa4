// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Replaying transition chains onto other shapes. Used by indirect removal,
//! by generalization with obsolescence and by migration off obsolete shapes.

use tracing::debug;

use super::Shape;
use crate::{
    key::PropertyKey,
    location::SlotKind,
    property::Property,
    transition::Transition,
};

impl Shape {
    /// Rebuilds this shape from the ancestor preceding the addition of
    /// `key`, dropping the property or adding `substitute` in its place.
    /// Transitions touching `key` after its addition are skipped.
    ///
    /// Returns `None` if `key` was never added along the parent chain.
    pub(crate) fn rebuild_from_add(
        &self,
        key: &PropertyKey,
        substitute: Option<&Property>,
    ) -> Option<Shape> {
        let mut replay = Vec::new();
        let mut cursor = self;
        let base = loop {
            let transition = cursor.transition_from_parent()?;
            let parent = cursor.parent()?;
            if let Transition::AddProperty { property } = transition
                && property.key() == key
            {
                break parent.ensure_valid();
            }
            replay.push(transition);
            cursor = parent;
        };
        let mut shape = base;
        if let Some(substitute) = substitute {
            let location = shape.allocator().move_location(substitute.location());
            shape = shape.add_property(substitute.relocate(location));
        }
        for transition in replay.into_iter().rev() {
            if transition.property_key() == Some(key) {
                continue;
            }
            shape = shape.apply_replayed(transition);
        }
        Some(shape.ensure_valid())
    }

    /// Applies a transition recorded elsewhere in the tree to this shape,
    /// allocating fresh locations from this shape's storage usage.
    pub(crate) fn apply_replayed(&self, transition: &Transition) -> Shape {
        match transition {
            Transition::AddProperty { property } => {
                if self.has_property(property.key()) {
                    return self.clone();
                }
                let location = self.allocator().move_location(property.location());
                self.add_property(property.relocate(location))
            }
            Transition::ReplaceProperty { before, after, .. } => {
                let Some(current) = self.get_property(after.key()).cloned() else {
                    return self.clone();
                };
                let location = if after.location().is_value() {
                    after.location().clone()
                } else if before.location() == after.location()
                    || current.location().generalizes(after.location())
                {
                    current.location().clone()
                } else if after.location().generalizes(current.location()) {
                    self.allocator().move_location(after.location())
                } else {
                    self.allocator().location_for_kind(SlotKind::Object)
                };
                self.replace_property(
                    &current,
                    Property::new(after.key().clone(), location, after.flags()),
                )
            }
            Transition::RemoveProperty { property, .. } => {
                match self.get_property(property.key()).cloned() {
                    Some(current) => self.remove_property(&current),
                    None => self.clone(),
                }
            }
            Transition::ObjectTypeChange(dynamic_type) => self.set_dynamic_type(*dynamic_type),
            Transition::ShapeFlagsChange(flags) => self.set_flags(*flags),
            Transition::MakeShared => self.make_shared(),
        }
    }

    /// The valid shape objects of this shape should migrate to. Returns the
    /// shape itself if it is valid.
    pub fn ensure_valid(&self) -> Shape {
        if self.is_valid() {
            return self.clone();
        }
        let mut replay = Vec::new();
        let mut cursor = self;
        let replacement = loop {
            if let Some(replacement) = cursor.obsoleted_by() {
                break replacement.ensure_valid();
            }
            let (Some(parent), Some(transition)) = (cursor.parent(), cursor.transition_from_parent())
            else {
                // Invalid shapes always descend from an obsoleted one.
                unreachable!("invalid shape {self} has no obsolete ancestor");
            };
            replay.push(transition);
            cursor = parent;
        };
        let migrated = replay
            .into_iter()
            .rev()
            .fold(replacement, |shape, transition| shape.apply_replayed(transition));
        // A replayed successor may itself have been obsoleted meanwhile.
        migrated.ensure_valid()
    }

    /// Marks this shape obsolete in favour of `replacement` and invalidates
    /// every structural descendant.
    pub(crate) fn mark_obsolete(&self, replacement: &Shape) {
        if self.0.obsoleted_by.set(replacement.clone()).is_ok() {
            debug!(shape = %self, replacement = %replacement, "shape obsoleted");
        }
        self.invalidate_subtree();
    }

    fn invalidate_subtree(&self) {
        let mut pending = vec![self.clone()];
        while let Some(shape) = pending.pop() {
            if !shape.0.valid.invalidate() {
                continue;
            }
            let children = shape.0.transitions.read().entries();
            pending.extend(
                children
                    .into_iter()
                    .filter(|(transition, child)| {
                        transition.is_direct() && child.parent() == Some(&shape)
                    })
                    .map(|(_, child)| child),
            );
        }
    }
}
