// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::Shape;
use crate::{
    allocator::Allocator,
    key::PropertyKey,
    location::Location,
    property::{Property, PropertyFlags},
    transition::Transition,
    value::Value,
};

/// How the location of a newly defined property is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum LocationFactory {
    /// The allocator's default location for the value.
    Default,
    Constant,
    Declared,
}

impl LocationFactory {
    pub(crate) fn create(self, allocator: &Allocator, value: &Value) -> Location {
        match self {
            LocationFactory::Default => allocator.location_for_value(value),
            LocationFactory::Constant => allocator.constant_location(value),
            LocationFactory::Declared => allocator.declared_location(value),
        }
    }
}

impl Shape {
    /// The shape an object with this shape has after `key` is set to
    /// `value` with `flags`.
    ///
    /// Adds the property if it is missing. If `value` does not fit the
    /// existing location, the property is generalized first: an int slot
    /// widens to a long or double slot, everything else falls back to a
    /// reference slot.
    pub fn define_property(
        &self,
        key: impl Into<PropertyKey>,
        value: &Value,
        flags: PropertyFlags,
    ) -> Shape {
        self.define_property_with(key.into(), value, flags, LocationFactory::Default)
    }

    /// Like [`Shape::define_property`], but a new property keeps its value
    /// in the shape.
    pub fn define_constant(
        &self,
        key: impl Into<PropertyKey>,
        value: &Value,
        flags: PropertyFlags,
    ) -> Shape {
        self.define_property_with(
            key.into(),
            value,
            flags | PropertyFlags::CONSTANT,
            LocationFactory::Constant,
        )
    }

    /// Like [`Shape::define_property`], but a new property only records
    /// `value` as its initial value and gets a slot on the first write of a
    /// different value.
    pub fn declare_property(
        &self,
        key: impl Into<PropertyKey>,
        value: &Value,
        flags: PropertyFlags,
    ) -> Shape {
        self.define_property_with(key.into(), value, flags, LocationFactory::Declared)
    }

    pub(crate) fn define_property_with(
        &self,
        key: PropertyKey,
        value: &Value,
        flags: PropertyFlags,
        factory: LocationFactory,
    ) -> Shape {
        let shape = self.ensure_valid();
        let Some(existing) = shape.get_property(&key).cloned() else {
            let location = factory.create(&shape.allocator(), value);
            return shape
                .add_property(Property::new(key, location, flags))
                .ensure_valid();
        };
        let result = if existing.flags() == flags {
            if existing.location().can_store(value) {
                shape
            } else {
                shape.generalize_property(&existing, value, flags, factory)
            }
        } else {
            let location = if existing.location().can_store(value) {
                existing.location().clone()
            } else if existing.location().is_value() {
                factory.create(&shape.allocator(), value)
            } else {
                shape
                    .allocator()
                    .location_for_value_upcast(value, existing.location())
            };
            let flags = if location.is_value() {
                flags
            } else {
                flags - PropertyFlags::CONSTANT
            };
            shape.replace_property(&existing, Property::new(key, location, flags))
        };
        result.ensure_valid()
    }

    /// Moves `existing` to a location that also holds `value`.
    fn generalize_property(
        &self,
        existing: &Property,
        value: &Value,
        flags: PropertyFlags,
        factory: LocationFactory,
    ) -> Shape {
        let allocator = self.allocator();
        let (location, flags) = if existing.location().is_value() {
            // Constant and declared properties move to the location a fresh
            // definition would get.
            match factory {
                LocationFactory::Constant => (allocator.constant_location(value), flags),
                _ => (
                    allocator.location_for_value(value),
                    flags - PropertyFlags::CONSTANT,
                ),
            }
        } else {
            (
                allocator.location_for_value_upcast(value, existing.location()),
                flags,
            )
        };
        let property = Property::new(existing.key().clone(), location, flags);
        if self.layout().options().obsolescence && !self.is_shared() && !existing.location().is_value()
        {
            self.replace_property_obsoleting(existing, property)
        } else {
            self.replace_property(existing, property)
        }
    }

    /// Generalization with obsolescence: the shape is rebuilt with the new
    /// location in the property's original position and this shape, together
    /// with its descendants, is marked obsolete.
    fn replace_property_obsoleting(&self, existing: &Property, property: Property) -> Shape {
        let transition = Transition::ReplaceProperty {
            before: existing.clone(),
            after: property.clone(),
            direct: false,
        };
        if let Some(replacement) = self.query_transition(&transition) {
            return replacement;
        }
        let Some(rebuilt) = self.rebuild_from_add(existing.key(), Some(&property)) else {
            return self.replace_property(existing, property);
        };
        let replacement = self.get_or_add_indirect(transition, || rebuilt);
        self.mark_obsolete(&replacement);
        replacement
    }
}
