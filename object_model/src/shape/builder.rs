// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::{DynamicType, Shape, ShapeFlags};
use crate::{
    key::PropertyKey,
    layout::Layout,
    location::Location,
    property::{Property, PropertyFlags},
    property_map::PropertyMap,
    value::Value,
};

/// Builds the root shape of a new shape tree.
#[derive(Debug, Clone, Default)]
pub struct ShapeBuilder {
    layout: Layout,
    dynamic_type: DynamicType,
    flags: u32,
    shared: bool,
    property_assumptions: bool,
    constants: Vec<(PropertyKey, Value, PropertyFlags)>,
}

impl ShapeBuilder {
    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn dynamic_type(mut self, dynamic_type: DynamicType) -> Self {
        self.dynamic_type = dynamic_type;
        self
    }

    /// Initial user-visible shape flags; only the low 16 bits are kept.
    pub fn shape_flags(mut self, flags: u32) -> Self {
        self.flags = flags & ShapeFlags::USER_MASK.bits();
        self
    }

    /// Objects of this tree start out shared.
    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// Enables [`Shape::property_assumption`] for the tree.
    pub fn property_assumptions(mut self, enabled: bool) -> Self {
        self.property_assumptions = enabled;
        self
    }

    /// Adds a property whose value lives in the shape and is shared by every
    /// object of the tree.
    pub fn add_constant_property(
        mut self,
        key: impl Into<PropertyKey>,
        value: impl Into<Value>,
        flags: PropertyFlags,
    ) -> Self {
        self.constants.push((key.into(), value.into(), flags));
        self
    }

    pub fn build(self) -> Shape {
        let Self {
            layout,
            dynamic_type,
            flags,
            shared,
            property_assumptions,
            constants,
        } = self;
        let mut root_flags = ShapeFlags::from_bits_retain(flags);
        if shared {
            root_flags |= ShapeFlags::SHARED;
        }
        if property_assumptions {
            root_flags |= ShapeFlags::ALLOWS_PROPERTY_ASSUMPTIONS;
        }
        let properties = PropertyMap::empty(layout.options().property_map);
        let root = Shape::new_root(layout, dynamic_type, root_flags, properties);
        constants
            .into_iter()
            .fold(root, |shape, (key, value, flags)| {
                shape.add_property(Property::new(
                    key,
                    Location::Constant(value),
                    flags | PropertyFlags::CONSTANT,
                ))
            })
    }
}
