// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{layout::Layout, location::StorageClass, value::Value};

/// Backend interface through which [`Location`](crate::Location)s read and
/// write physical slots.
///
/// Primitive slots are 32-bit units; 64-bit values occupy two consecutive
/// units, low half first.
pub trait SlotStorage {
    fn read_object_slot(&self, storage: StorageClass, index: u32) -> &Value;
    fn write_object_slot(&mut self, storage: StorageClass, index: u32, value: Value);
    fn read_primitive_slot(&self, storage: StorageClass, index: u32) -> u32;
    fn write_primitive_slot(&mut self, storage: StorageClass, index: u32, bits: u32);

    fn read_primitive_pair(&self, storage: StorageClass, index: u32) -> u64 {
        let lo = self.read_primitive_slot(storage, index) as u64;
        let hi = self.read_primitive_slot(storage, index + 1) as u64;
        lo | (hi << 32)
    }

    fn write_primitive_pair(&mut self, storage: StorageClass, index: u32, bits: u64) {
        self.write_primitive_slot(storage, index, bits as u32);
        self.write_primitive_slot(storage, index + 1, (bits >> 32) as u32);
    }
}

/// Extension array capacity for a used size.
///
/// Sizes round up to 0, 4, 8 and then alternate between `3 * 2^n` and
/// `4 * 2^n` (12, 16, 24, 32, 48, ...).
pub(crate) fn capacity_for_size(size: u32) -> u32 {
    match size {
        0 => 0,
        1..=4 => 4,
        5..=8 => 8,
        _ => {
            let mut capacity: u32 = 8;
            while capacity < size {
                capacity = if capacity.is_power_of_two() {
                    capacity + capacity / 2
                } else {
                    capacity / 3 * 4
                };
            }
            capacity
        }
    }
}

/// Storage usage recorded by a shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StorageCounters {
    pub(crate) object_field_size: u32,
    pub(crate) primitive_field_size: u32,
    pub(crate) object_array_size: u32,
    pub(crate) primitive_array_size: u32,
    pub(crate) object_array_capacity: u32,
    pub(crate) primitive_array_capacity: u32,
}

impl StorageCounters {
    /// Recomputes capacities after sizes changed. Capacities never drop
    /// below `floor`'s, which keeps them monotone along a chain of direct
    /// transitions.
    pub(crate) fn with_capacities_from(mut self, floor: &StorageCounters) -> Self {
        self.object_array_capacity =
            capacity_for_size(self.object_array_size).max(floor.object_array_capacity);
        self.primitive_array_capacity =
            capacity_for_size(self.primitive_array_size).max(floor.primitive_array_capacity);
        self
    }
}

/// Physical storage of a [`DynamicObject`](crate::DynamicObject): a fixed
/// number of inline fields plus growable extension arrays, each split into
/// reference and primitive halves.
#[derive(Debug, Clone)]
pub struct ObjectStorage {
    object_fields: Box<[Value]>,
    primitive_fields: Box<[u32]>,
    object_array: Box<[Value]>,
    primitive_array: Box<[u32]>,
}

impl ObjectStorage {
    pub(crate) fn new(layout: &Layout, counters: &StorageCounters) -> Self {
        Self {
            object_fields: vec![Value::Null; layout.object_field_count() as usize]
                .into_boxed_slice(),
            primitive_fields: vec![0; layout.primitive_field_count() as usize].into_boxed_slice(),
            object_array: vec![Value::Null; counters.object_array_capacity as usize]
                .into_boxed_slice(),
            primitive_array: vec![0; counters.primitive_array_capacity as usize]
                .into_boxed_slice(),
        }
    }

    pub fn object_array_len(&self) -> u32 {
        self.object_array.len() as u32
    }

    pub fn primitive_array_len(&self) -> u32 {
        self.primitive_array.len() as u32
    }

    /// Grows the extension arrays to at least the given capacities.
    pub(crate) fn grow_to(&mut self, counters: &StorageCounters) {
        let Self {
            object_array,
            primitive_array,
            ..
        } = self;
        if object_array.len() < counters.object_array_capacity as usize {
            resize_boxed(object_array, counters.object_array_capacity, Value::Null);
        }
        if primitive_array.len() < counters.primitive_array_capacity as usize {
            resize_boxed(primitive_array, counters.primitive_array_capacity, 0);
        }
    }

    /// Shrinks the extension arrays down to the given capacities.
    pub(crate) fn trim_to(&mut self, counters: &StorageCounters) {
        let Self {
            object_array,
            primitive_array,
            ..
        } = self;
        if object_array.len() > counters.object_array_capacity as usize {
            resize_boxed(object_array, counters.object_array_capacity, Value::Null);
        }
        if primitive_array.len() > counters.primitive_array_capacity as usize {
            resize_boxed(primitive_array, counters.primitive_array_capacity, 0);
        }
    }

    /// Resizes the extension arrays to exactly the given capacities.
    pub(crate) fn resize_to(&mut self, counters: &StorageCounters) {
        self.grow_to(counters);
        self.trim_to(counters);
    }

    /// Drops every reference held by the object.
    pub(crate) fn clear_references(&mut self) {
        self.object_fields.fill(Value::Null);
        self.object_array.fill(Value::Null);
    }

    fn object_slots(&self, storage: StorageClass) -> &[Value] {
        match storage {
            StorageClass::Field => &self.object_fields,
            StorageClass::Array => &self.object_array,
        }
    }

    fn primitive_slots(&self, storage: StorageClass) -> &[u32] {
        match storage {
            StorageClass::Field => &self.primitive_fields,
            StorageClass::Array => &self.primitive_array,
        }
    }
}

fn resize_boxed<T: Clone>(slots: &mut Box<[T]>, len: u32, fill: T) {
    let mut vec = std::mem::take(slots).into_vec();
    vec.resize(len as usize, fill);
    *slots = vec.into_boxed_slice();
}

impl SlotStorage for ObjectStorage {
    #[inline]
    fn read_object_slot(&self, storage: StorageClass, index: u32) -> &Value {
        &self.object_slots(storage)[index as usize]
    }

    #[inline]
    fn write_object_slot(&mut self, storage: StorageClass, index: u32, value: Value) {
        let slots = match storage {
            StorageClass::Field => &mut self.object_fields,
            StorageClass::Array => &mut self.object_array,
        };
        slots[index as usize] = value;
    }

    #[inline]
    fn read_primitive_slot(&self, storage: StorageClass, index: u32) -> u32 {
        self.primitive_slots(storage)[index as usize]
    }

    #[inline]
    fn write_primitive_slot(&mut self, storage: StorageClass, index: u32, bits: u32) {
        let slots = match storage {
            StorageClass::Field => &mut self.primitive_fields,
            StorageClass::Array => &mut self.primitive_array,
        };
        slots[index as usize] = bits;
    }
}
