// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use crate::{
    error::{ObjectModelError, ObjectModelResult},
    storage::SlotStorage,
    value::Value,
};

/// Whether a slot lives in the object's inline fields or in an extension
/// array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    Field,
    Array,
}

/// The value kind a physical slot is specialized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Reference slot; holds any value.
    Object,
    Int,
    Long,
    Double,
    Boolean,
}

impl SlotKind {
    #[inline]
    pub fn is_primitive(self) -> bool {
        !matches!(self, SlotKind::Object)
    }

    /// Number of slots taken: object slots for [`SlotKind::Object`], 32-bit
    /// units for primitives.
    #[inline]
    pub fn width(self) -> u32 {
        match self {
            SlotKind::Long | SlotKind::Double => 2,
            _ => 1,
        }
    }

    fn name(self) -> &'static str {
        match self {
            SlotKind::Object => "object",
            SlotKind::Int => "int",
            SlotKind::Long => "long",
            SlotKind::Double => "double",
            SlotKind::Boolean => "boolean",
        }
    }
}

/// A physical storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotLocation {
    kind: SlotKind,
    storage: StorageClass,
    index: u32,
    /// Long and double slots that also accept int values.
    implicit_cast: bool,
}

/// The four independent storage spaces of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SlotSpace {
    PrimitiveField,
    PrimitiveArray,
    ObjectField,
    ObjectArray,
}

impl SlotLocation {
    pub fn new(kind: SlotKind, storage: StorageClass, index: u32, implicit_cast: bool) -> Self {
        debug_assert!(
            !implicit_cast || matches!(kind, SlotKind::Long | SlotKind::Double),
            "only long and double slots accept ints"
        );
        Self {
            kind,
            storage,
            index,
            implicit_cast,
        }
    }

    #[inline]
    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    #[inline]
    pub fn storage(&self) -> StorageClass {
        self.storage
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn implicit_cast(&self) -> bool {
        self.implicit_cast
    }

    fn space(&self) -> SlotSpace {
        match (self.kind.is_primitive(), self.storage) {
            (true, StorageClass::Field) => SlotSpace::PrimitiveField,
            (true, StorageClass::Array) => SlotSpace::PrimitiveArray,
            (false, StorageClass::Field) => SlotSpace::ObjectField,
            (false, StorageClass::Array) => SlotSpace::ObjectArray,
        }
    }

    /// Total order over slots: primitive before reference storage, fields
    /// before arrays, then by index.
    pub(crate) fn ordinal(&self) -> u64 {
        ((self.space() as u64) << 32) | self.index as u64
    }

    /// True if both slots share at least one physical unit.
    pub(crate) fn overlaps(&self, other: &SlotLocation) -> bool {
        self.space() == other.space()
            && self.index < other.index + other.kind.width()
            && other.index < self.index + self.kind.width()
    }

    fn can_store(&self, value: &Value) -> bool {
        match (self.kind, value) {
            (SlotKind::Object, _) => true,
            (SlotKind::Int, Value::Int(_)) => true,
            (SlotKind::Long, Value::Long(_)) => true,
            (SlotKind::Double, Value::Double(_)) => true,
            (SlotKind::Long | SlotKind::Double, Value::Int(_)) => self.implicit_cast,
            (SlotKind::Boolean, Value::Boolean(_)) => true,
            _ => false,
        }
    }

    /// True if every value `other` accepts is also accepted here.
    fn generalizes(&self, other: &SlotLocation) -> bool {
        match (self.kind, other.kind) {
            (SlotKind::Object, _) => true,
            (SlotKind::Long | SlotKind::Double, SlotKind::Int) => self.implicit_cast,
            (a, b) if a == b => self.implicit_cast || !other.implicit_cast,
            _ => false,
        }
    }

    fn read(&self, store: &impl SlotStorage) -> Value {
        let Self {
            kind,
            storage,
            index,
            ..
        } = *self;
        match kind {
            SlotKind::Object => store.read_object_slot(storage, index).clone(),
            SlotKind::Int => Value::Int(store.read_primitive_slot(storage, index) as i32),
            SlotKind::Boolean => Value::Boolean(store.read_primitive_slot(storage, index) != 0),
            SlotKind::Long => Value::Long(store.read_primitive_pair(storage, index) as i64),
            SlotKind::Double => {
                Value::Double(f64::from_bits(store.read_primitive_pair(storage, index)))
            }
        }
    }

    /// Writes without checking; callers have established `can_store`.
    fn write(&self, store: &mut impl SlotStorage, value: &Value) {
        let Self {
            kind,
            storage,
            index,
            ..
        } = *self;
        match (kind, value) {
            (SlotKind::Object, value) => store.write_object_slot(storage, index, value.clone()),
            (SlotKind::Int, Value::Int(v)) => store.write_primitive_slot(storage, index, *v as u32),
            (SlotKind::Boolean, Value::Boolean(v)) => {
                store.write_primitive_slot(storage, index, *v as u32)
            }
            (SlotKind::Long, Value::Long(v)) => store.write_primitive_pair(storage, index, *v as u64),
            (SlotKind::Long, Value::Int(v)) => {
                store.write_primitive_pair(storage, index, *v as i64 as u64)
            }
            (SlotKind::Double, Value::Double(v)) => {
                store.write_primitive_pair(storage, index, v.to_bits())
            }
            (SlotKind::Double, Value::Int(v)) => {
                store.write_primitive_pair(storage, index, (*v as f64).to_bits())
            }
            _ => unreachable!("unchecked write of {value} into {kind:?} slot"),
        }
    }
}

/// Per-dimension storage taken by a location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Footprint {
    pub object_fields: u32,
    pub object_array: u32,
    pub primitive_fields: u32,
    pub primitive_array: u32,
}

/// Double dispatch over the storage dimensions a location occupies.
pub trait LocationVisitor {
    fn visit_object_field(&mut self, index: u32, count: u32);
    fn visit_object_array(&mut self, index: u32, count: u32);
    fn visit_primitive_field(&mut self, index: u32, count: u32);
    fn visit_primitive_array(&mut self, index: u32, count: u32);
}

/// Where the value of a property lives.
///
/// Locations are immutable and compare structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// The value is stored in the shape itself and never changes.
    Constant(Value),
    /// A placeholder holding the property's initial value. The first write
    /// of a different value relocates the property to a physical slot.
    Declared(Value),
    Slot(SlotLocation),
}

impl Location {
    pub fn object(storage: StorageClass, index: u32) -> Self {
        Location::Slot(SlotLocation::new(SlotKind::Object, storage, index, false))
    }

    /// True for locations that keep their value in the shape.
    #[inline]
    pub fn is_value(&self) -> bool {
        !matches!(self, Location::Slot(_))
    }

    #[inline]
    pub fn is_constant(&self) -> bool {
        matches!(self, Location::Constant(_))
    }

    #[inline]
    pub fn is_declared(&self) -> bool {
        matches!(self, Location::Declared(_))
    }

    #[inline]
    pub fn as_slot(&self) -> Option<&SlotLocation> {
        match self {
            Location::Slot(slot) => Some(slot),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.as_slot().is_some_and(|slot| slot.kind.is_primitive())
    }

    /// True if a write of `value` succeeds without relocating the property.
    pub fn can_store(&self, value: &Value) -> bool {
        match self {
            Location::Constant(v) | Location::Declared(v) => v == value,
            Location::Slot(slot) => slot.can_store(value),
        }
    }

    /// True if this location can hold every value `other` can.
    pub fn generalizes(&self, other: &Location) -> bool {
        match (self, other) {
            (Location::Slot(a), Location::Slot(b)) => a.generalizes(b),
            (Location::Slot(a), Location::Constant(v) | Location::Declared(v)) => a.can_store(v),
            (a, b) => a == b,
        }
    }

    /// True if both locations denote the same physical slot with the same
    /// encoding, so no data has to move between them.
    pub fn is_same_location(&self, other: &Location) -> bool {
        match (self, other) {
            (Location::Slot(a), Location::Slot(b)) => {
                a.kind == b.kind && a.storage == b.storage && a.index == b.index
            }
            (a, b) => a == b,
        }
    }

    pub fn get(&self, store: &impl SlotStorage) -> Value {
        match self {
            Location::Constant(v) | Location::Declared(v) => v.clone(),
            Location::Slot(slot) => slot.read(store),
        }
    }

    pub fn get_int(&self, store: &impl SlotStorage) -> ObjectModelResult<i32> {
        match self {
            Location::Slot(slot) if slot.kind == SlotKind::Int => {
                Ok(store.read_primitive_slot(slot.storage, slot.index) as i32)
            }
            _ => {
                let value = self.get(store);
                value
                    .as_int()
                    .ok_or_else(|| ObjectModelError::unexpected("int", value))
            }
        }
    }

    pub fn get_long(&self, store: &impl SlotStorage) -> ObjectModelResult<i64> {
        match self {
            Location::Slot(slot) if slot.kind == SlotKind::Long => {
                Ok(store.read_primitive_pair(slot.storage, slot.index) as i64)
            }
            _ => {
                let value = self.get(store);
                value
                    .as_long()
                    .ok_or_else(|| ObjectModelError::unexpected("long", value))
            }
        }
    }

    pub fn get_double(&self, store: &impl SlotStorage) -> ObjectModelResult<f64> {
        match self {
            Location::Slot(slot) if slot.kind == SlotKind::Double => Ok(f64::from_bits(
                store.read_primitive_pair(slot.storage, slot.index),
            )),
            _ => {
                let value = self.get(store);
                value
                    .as_double()
                    .ok_or_else(|| ObjectModelError::unexpected("double", value))
            }
        }
    }

    pub fn get_boolean(&self, store: &impl SlotStorage) -> ObjectModelResult<bool> {
        match self {
            Location::Slot(slot) if slot.kind == SlotKind::Boolean => {
                Ok(store.read_primitive_slot(slot.storage, slot.index) != 0)
            }
            _ => {
                let value = self.get(store);
                value
                    .as_boolean()
                    .ok_or_else(|| ObjectModelError::unexpected("boolean", value))
            }
        }
    }

    /// Writes `value`, or fails with
    /// [`ObjectModelError::IncompatibleLocation`] if it does not fit.
    ///
    /// Writing the held value to a constant or declared location is a no-op.
    pub fn set(&self, store: &mut impl SlotStorage, value: &Value) -> ObjectModelResult<()> {
        if !self.can_store(value) {
            return Err(ObjectModelError::incompatible(self, value));
        }
        if let Location::Slot(slot) = self {
            slot.write(store, value);
        }
        Ok(())
    }

    /// Drops the reference held by an object slot. Primitive slots are left
    /// as they are.
    pub fn clear(&self, store: &mut impl SlotStorage) {
        if let Location::Slot(slot) = self
            && slot.kind == SlotKind::Object
        {
            store.write_object_slot(slot.storage, slot.index, Value::Null);
        }
    }

    pub fn footprint(&self) -> Footprint {
        let mut footprint = Footprint::default();
        if let Location::Slot(slot) = self {
            let width = slot.kind.width();
            match slot.space() {
                SlotSpace::ObjectField => footprint.object_fields = width,
                SlotSpace::ObjectArray => footprint.object_array = width,
                SlotSpace::PrimitiveField => footprint.primitive_fields = width,
                SlotSpace::PrimitiveArray => footprint.primitive_array = width,
            }
        }
        footprint
    }

    /// Reports the slots this location occupies. Value locations occupy
    /// none.
    pub fn accept(&self, visitor: &mut impl LocationVisitor) {
        let Location::Slot(slot) = self else {
            return;
        };
        let width = slot.kind.width();
        match slot.space() {
            SlotSpace::ObjectField => visitor.visit_object_field(slot.index, width),
            SlotSpace::ObjectArray => visitor.visit_object_array(slot.index, width),
            SlotSpace::PrimitiveField => visitor.visit_primitive_field(slot.index, width),
            SlotSpace::PrimitiveArray => visitor.visit_primitive_array(slot.index, width),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Constant(v) => write!(f, "constant({v})"),
            Location::Declared(v) => write!(f, "declared({v})"),
            Location::Slot(slot) => {
                let storage = match slot.storage {
                    StorageClass::Field => "field",
                    StorageClass::Array => "array",
                };
                let cast = if slot.implicit_cast { "|int" } else { "" };
                write!(f, "{}{cast}@{storage}[{}]", slot.kind.name(), slot.index)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        layout::Layout,
        storage::{ObjectStorage, StorageCounters},
    };

    fn storage() -> ObjectStorage {
        let layout = Layout::builder().object_fields(2).primitive_fields(4).build();
        ObjectStorage::new(&layout, &StorageCounters::default())
    }

    #[test]
    fn typed_slots_round_trip_values() {
        let mut store = storage();
        let long = Location::Slot(SlotLocation::new(SlotKind::Long, StorageClass::Field, 0, true));
        let int = Location::Slot(SlotLocation::new(SlotKind::Int, StorageClass::Field, 2, false));

        long.set(&mut store, &Value::Int(-7)).unwrap();
        assert_eq!(long.get(&store), Value::Long(-7));
        long.set(&mut store, &Value::Long(i64::MIN)).unwrap();
        assert_eq!(long.get_long(&store), Ok(i64::MIN));

        int.set(&mut store, &Value::Int(42)).unwrap();
        assert_eq!(int.get_int(&store), Ok(42));
        assert!(matches!(
            int.get_double(&store),
            Err(ObjectModelError::UnexpectedResult { .. })
        ));
        assert!(matches!(
            int.set(&mut store, &Value::Double(1.5)),
            Err(ObjectModelError::IncompatibleLocation { .. })
        ));
    }

    #[test]
    fn value_locations_accept_only_their_value() {
        let mut store = storage();
        let constant = Location::Constant(Value::Int(1));
        assert!(constant.can_store(&Value::Int(1)));
        assert!(!constant.can_store(&Value::Long(1)));
        assert!(constant.set(&mut store, &Value::Int(1)).is_ok());
        assert!(constant.set(&mut store, &Value::Int(2)).is_err());
        assert_eq!(constant.footprint(), Footprint::default());
    }

    #[test]
    fn overlap_respects_width_and_space() {
        let double = SlotLocation::new(SlotKind::Double, StorageClass::Field, 1, false);
        let int = SlotLocation::new(SlotKind::Int, StorageClass::Field, 2, false);
        let int_array = SlotLocation::new(SlotKind::Int, StorageClass::Array, 2, false);
        let object = SlotLocation::new(SlotKind::Object, StorageClass::Field, 2, false);
        assert!(double.overlaps(&int));
        assert!(!double.overlaps(&int_array));
        assert!(!int.overlaps(&object));
        assert!(int.ordinal() < int_array.ordinal());
        assert!(int_array.ordinal() < object.ordinal());
    }

    #[test]
    fn generalization_lattice() {
        let int = Location::Slot(SlotLocation::new(SlotKind::Int, StorageClass::Field, 0, false));
        let long = Location::Slot(SlotLocation::new(SlotKind::Long, StorageClass::Field, 0, true));
        let strict_long =
            Location::Slot(SlotLocation::new(SlotKind::Long, StorageClass::Field, 0, false));
        let object = Location::object(StorageClass::Field, 0);
        assert!(long.generalizes(&int));
        assert!(!strict_long.generalizes(&int));
        assert!(long.generalizes(&strict_long));
        assert!(!strict_long.generalizes(&long));
        assert!(object.generalizes(&long));
        assert!(!int.generalizes(&long));
        assert_eq!(long.to_string(), "long|int@field[0]");
    }
}
