// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{
    layout::Layout,
    location::{Location, LocationVisitor, SlotKind, SlotLocation, StorageClass},
    storage::StorageCounters,
    value::Value,
};

/// Hands out storage locations for a shape.
///
/// An allocator starts from the storage usage of the shape it was created
/// from. `location_for_*` only look at the current usage; call
/// [`Allocator::add_location`] to claim a location's slots.
#[derive(Debug, Clone)]
pub struct Allocator {
    layout: Layout,
    shared: bool,
    counters: StorageCounters,
}

impl Allocator {
    pub(crate) fn new(layout: Layout, shared: bool, counters: StorageCounters) -> Self {
        Self {
            layout,
            shared,
            counters,
        }
    }

    /// Storage usage after all added locations.
    pub(crate) fn counters(&self) -> StorageCounters {
        self.counters
    }

    /// Default location for storing `value`.
    ///
    /// Primitives prefer inline primitive fields, then the primitive
    /// extension array. Everything else, and every value of a shared shape,
    /// goes to reference storage.
    pub fn location_for_value(&self, value: &Value) -> Location {
        let options = self.layout.options();
        match value {
            Value::Int(_) => self.allocate(SlotKind::Int, false),
            Value::Long(_) => self.allocate(SlotKind::Long, options.implicit_cast_int_to_long),
            Value::Double(_) => {
                self.allocate(SlotKind::Double, options.implicit_cast_int_to_double)
            }
            Value::Boolean(_) => self.allocate(SlotKind::Boolean, false),
            _ => self.allocate(SlotKind::Object, false),
        }
    }

    /// Location for values of a kind known ahead of time.
    pub fn location_for_kind(&self, kind: SlotKind) -> Location {
        let options = self.layout.options();
        let implicit_cast = match kind {
            SlotKind::Long => options.implicit_cast_int_to_long,
            SlotKind::Double => options.implicit_cast_int_to_double,
            _ => false,
        };
        self.allocate(kind, implicit_cast)
    }

    pub fn constant_location(&self, value: &Value) -> Location {
        Location::Constant(value.clone())
    }

    pub fn declared_location(&self, value: &Value) -> Location {
        Location::Declared(value.clone())
    }

    /// Location able to hold both `value` and everything `old` holds.
    ///
    /// An int slot widens to a long or double slot that still accepts ints
    /// when the layout allows it; every other combination falls back to
    /// reference storage.
    pub fn location_for_value_upcast(&self, value: &Value, old: &Location) -> Location {
        let options = self.layout.options();
        let old_kind = old.as_slot().map(SlotLocation::kind);
        match (old_kind, value) {
            (Some(SlotKind::Int), Value::Long(_)) if options.implicit_cast_int_to_long => {
                self.allocate(SlotKind::Long, true)
            }
            (Some(SlotKind::Int), Value::Double(_)) if options.implicit_cast_int_to_double => {
                self.allocate(SlotKind::Double, true)
            }
            _ => self.allocate(SlotKind::Object, false),
        }
    }

    /// A fresh location of the same kind as `old`, allocated from this
    /// allocator's usage. Value locations are returned unchanged.
    pub fn move_location(&self, old: &Location) -> Location {
        match old {
            Location::Slot(slot) => self.allocate(slot.kind(), slot.implicit_cast()),
            value_location => value_location.clone(),
        }
    }

    /// Claims the slots of `location`.
    pub fn add_location(&mut self, location: &Location) {
        location.accept(self);
    }

    fn allocate(&self, kind: SlotKind, implicit_cast: bool) -> Location {
        let Self {
            layout,
            shared,
            counters,
        } = self;
        if kind.is_primitive() && !shared {
            let width = kind.width();
            if counters.primitive_field_size + width <= layout.primitive_field_count() {
                return Location::Slot(SlotLocation::new(
                    kind,
                    StorageClass::Field,
                    counters.primitive_field_size,
                    implicit_cast,
                ));
            }
            if layout.options().primitive_array_allowed {
                return Location::Slot(SlotLocation::new(
                    kind,
                    StorageClass::Array,
                    counters.primitive_array_size,
                    implicit_cast,
                ));
            }
        }
        if counters.object_field_size < layout.object_field_count() {
            Location::object(StorageClass::Field, counters.object_field_size)
        } else {
            Location::object(StorageClass::Array, counters.object_array_size)
        }
    }
}

impl LocationVisitor for Allocator {
    fn visit_object_field(&mut self, index: u32, count: u32) {
        let size = &mut self.counters.object_field_size;
        *size = (*size).max(index + count);
    }

    fn visit_object_array(&mut self, index: u32, count: u32) {
        let size = &mut self.counters.object_array_size;
        *size = (*size).max(index + count);
    }

    fn visit_primitive_field(&mut self, index: u32, count: u32) {
        let size = &mut self.counters.primitive_field_size;
        *size = (*size).max(index + count);
    }

    fn visit_primitive_array(&mut self, index: u32, count: u32) {
        let size = &mut self.counters.primitive_array_size;
        *size = (*size).max(index + count);
    }
}
