// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod put;

use std::{fmt, sync::Arc};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

pub(crate) use put::{PutMode, PutPlan, plan_put};

use crate::{
    error::{ObjectModelError, ObjectModelResult},
    key::PropertyKey,
    location::Location,
    moves::MovePlan,
    property::{Property, PropertyFlags},
    shape::{DynamicType, Shape},
    storage::ObjectStorage,
    value::Value,
};

/// A dynamic object: a shape plus the physical storage it describes.
///
/// Every method here is the uncached access path. Shape changes follow one
/// order: grow storage to the new shape's capacities, move and write
/// values, then publish the new shape. Objects reachable from several
/// threads live behind an [`ObjectRef`].
pub struct DynamicObject {
    shape: Shape,
    storage: ObjectStorage,
}

impl DynamicObject {
    pub fn new(shape: Shape) -> Self {
        let storage = ObjectStorage::new(shape.layout(), shape.counters());
        Self { shape, storage }
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn storage(&self) -> &ObjectStorage {
        &self.storage
    }

    pub fn get_property(&self, key: &PropertyKey) -> Option<&Property> {
        self.shape.get_property(key)
    }

    pub fn contains_key(&self, key: &PropertyKey) -> bool {
        self.shape.has_property(key)
    }

    pub fn get(&self, key: &PropertyKey) -> Option<Value> {
        self.shape
            .get_property(key)
            .map(|p| p.location().get(&self.storage))
    }

    pub fn get_or_default(&self, key: &PropertyKey, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Reads an int, or `default` if the key is missing. Fails if the value
    /// found is not an int.
    pub fn get_int(&self, key: &PropertyKey, default: Value) -> ObjectModelResult<i32> {
        match self.shape.get_property(key) {
            Some(property) => property.location().get_int(&self.storage),
            None => default
                .as_int()
                .ok_or_else(|| ObjectModelError::unexpected("int", default)),
        }
    }

    pub fn get_long(&self, key: &PropertyKey, default: Value) -> ObjectModelResult<i64> {
        match self.shape.get_property(key) {
            Some(property) => property.location().get_long(&self.storage),
            None => default
                .as_long()
                .ok_or_else(|| ObjectModelError::unexpected("long", default)),
        }
    }

    pub fn get_double(&self, key: &PropertyKey, default: Value) -> ObjectModelResult<f64> {
        match self.shape.get_property(key) {
            Some(property) => property.location().get_double(&self.storage),
            None => default
                .as_double()
                .ok_or_else(|| ObjectModelError::unexpected("double", default)),
        }
    }

    pub fn get_boolean(&self, key: &PropertyKey, default: Value) -> ObjectModelResult<bool> {
        match self.shape.get_property(key) {
            Some(property) => property.location().get_boolean(&self.storage),
            None => default
                .as_boolean()
                .ok_or_else(|| ObjectModelError::unexpected("boolean", default)),
        }
    }

    /// Sets `key` to `value`, adding the property if it is missing and
    /// generalizing its location if the value does not fit.
    ///
    /// Fails only for final constant properties.
    pub fn put(&mut self, key: &PropertyKey, value: impl Into<Value>) -> ObjectModelResult<()> {
        self.put_with_mode(key, &value.into(), PutMode::PUT)
            .map(|_| ())
    }

    pub fn put_int(&mut self, key: &PropertyKey, value: i32) -> ObjectModelResult<()> {
        self.put(key, Value::Int(value))
    }

    pub fn put_long(&mut self, key: &PropertyKey, value: i64) -> ObjectModelResult<()> {
        self.put(key, Value::Long(value))
    }

    pub fn put_double(&mut self, key: &PropertyKey, value: f64) -> ObjectModelResult<()> {
        self.put(key, Value::Double(value))
    }

    pub fn put_boolean(&mut self, key: &PropertyKey, value: bool) -> ObjectModelResult<()> {
        self.put(key, Value::Boolean(value))
    }

    /// Sets `key` only if the property exists. Returns whether it did.
    pub fn put_if_present(
        &mut self,
        key: &PropertyKey,
        value: impl Into<Value>,
    ) -> ObjectModelResult<bool> {
        self.put_with_mode(key, &value.into(), PutMode::PUT_IF_PRESENT)
    }

    /// Sets `key` and replaces its property flags.
    pub fn put_with_flags(
        &mut self,
        key: &PropertyKey,
        value: impl Into<Value>,
        flags: PropertyFlags,
    ) -> ObjectModelResult<()> {
        self.put_with_mode(key, &value.into(), PutMode::with_flags(flags))
            .map(|_| ())
    }

    /// Sets `key`; a new property keeps its value in the shape.
    pub fn put_constant(
        &mut self,
        key: &PropertyKey,
        value: impl Into<Value>,
        flags: PropertyFlags,
    ) -> ObjectModelResult<()> {
        self.put_with_mode(key, &value.into(), PutMode::constant(flags))
            .map(|_| ())
    }

    /// Defines `key` with a declared location holding `value`.
    pub fn declare(
        &mut self,
        key: &PropertyKey,
        value: impl Into<Value>,
        flags: PropertyFlags,
    ) -> ObjectModelResult<()> {
        self.put_with_mode(key, &value.into(), PutMode::declare(flags))
            .map(|_| ())
    }

    pub(crate) fn put_with_mode(
        &mut self,
        key: &PropertyKey,
        value: &Value,
        mode: PutMode,
    ) -> ObjectModelResult<bool> {
        self.update_shape();
        match plan_put(&self.shape, key, value, mode)? {
            PutPlan::Skip => Ok(false),
            PutPlan::Write {
                shape,
                property,
                moves,
            } => {
                self.write_and_publish(&shape, &moves, property.location(), value)?;
                Ok(true)
            }
        }
    }

    /// Grows storage for `shape`, relocates values, writes `value` and
    /// finally installs `shape`.
    pub(crate) fn write_and_publish(
        &mut self,
        shape: &Shape,
        moves: &MovePlan,
        location: &Location,
        value: &Value,
    ) -> ObjectModelResult<()> {
        if !location.can_store(value) {
            return Err(ObjectModelError::incompatible(location, value));
        }
        if *shape != self.shape {
            self.storage.grow_to(shape.counters());
            moves.execute(&mut self.storage);
            location.set(&mut self.storage, value)?;
            trace!(from = %self.shape, to = %shape, "shape change");
            self.shape = shape.clone();
            self.check_storage();
        } else {
            location.set(&mut self.storage, value)?;
        }
        Ok(())
    }

    /// Switches to `shape`, relocating values per `moves`. Extension arrays
    /// shrink to the new capacities when `trim` is set.
    pub(crate) fn reshape(&mut self, shape: &Shape, moves: &MovePlan, trim: bool) {
        if *shape == self.shape {
            return;
        }
        self.storage.grow_to(shape.counters());
        moves.execute(&mut self.storage);
        trace!(from = %self.shape, to = %shape, "shape change");
        self.shape = shape.clone();
        if trim {
            self.storage.trim_to(shape.counters());
        }
        self.check_storage();
    }

    /// Removes `key`. Returns false if it was missing.
    ///
    /// The storage is compacted when the shape is rebuilt without the
    /// property; vacated reference slots are cleared.
    pub fn remove_key(&mut self, key: &PropertyKey) -> bool {
        self.update_shape();
        let old = self.shape.clone();
        let Some(property) = old.get_property(key).cloned() else {
            return false;
        };
        let new = old.remove_property(&property);
        let moves = MovePlan::between(&old, &new, None);
        self.remove_to(&property, &new, &moves);
        true
    }

    pub(crate) fn remove_to(&mut self, removed: &Property, shape: &Shape, moves: &MovePlan) {
        removed.location().clear(&mut self.storage);
        if !moves.is_empty() {
            debug!(key = ?removed.key(), ?moves, "compacting storage");
        }
        self.reshape(shape, moves, true);
    }

    /// Replaces the flags of an existing property. Returns false if the
    /// property is missing.
    pub fn set_property_flags(&mut self, key: &PropertyKey, flags: PropertyFlags) -> bool {
        self.update_shape();
        let Some(property) = self.shape.get_property(key).cloned() else {
            return false;
        };
        if property.flags() != flags {
            let shape = self
                .shape
                .replace_property(&property, property.copy_with_flags(flags));
            self.reshape(&shape, &MovePlan::default(), false);
        }
        true
    }

    pub fn get_dynamic_type(&self) -> DynamicType {
        self.shape.dynamic_type()
    }

    /// Returns false if the object already had this type.
    pub fn set_dynamic_type(&mut self, dynamic_type: DynamicType) -> bool {
        self.update_shape();
        let shape = self.shape.set_dynamic_type(dynamic_type);
        let changed = shape != self.shape;
        self.reshape(&shape, &MovePlan::default(), false);
        changed
    }

    pub fn get_shape_flags(&self) -> u32 {
        self.shape.flags()
    }

    /// Returns false if the flags were already set.
    ///
    /// ## Panics
    ///
    /// If `flags` has bits outside the low 16.
    pub fn set_shape_flags(&mut self, flags: u32) -> bool {
        self.update_shape();
        let shape = self.shape.set_flags(flags);
        let changed = shape != self.shape;
        self.reshape(&shape, &MovePlan::default(), false);
        changed
    }

    pub fn is_shared(&self) -> bool {
        self.shape.is_shared()
    }

    /// Switches to the shared variant of the shape. Primitive values move to
    /// reference slots.
    pub fn mark_shared(&mut self) -> bool {
        self.update_shape();
        if self.shape.is_shared() {
            return false;
        }
        let shape = self.shape.make_shared();
        let moves = MovePlan::between(&self.shape, &shape, None);
        self.reshape(&shape, &moves, false);
        true
    }

    /// Marks the object shared and wraps it for cross-thread use.
    pub fn into_shared(mut self) -> ObjectRef {
        self.mark_shared();
        ObjectRef::new(self)
    }

    /// Empties the object and switches it to `other`, which may belong to
    /// another tree with the same storage layout. Every property assumption
    /// of the current tree is invalidated.
    ///
    /// Returns false if the object already had `other`.
    pub fn reset_shape(&mut self, other: &Shape) -> ObjectModelResult<bool> {
        if other.has_instance_properties() {
            return Err(ObjectModelError::ShapeHasInstanceProperties(
                other.to_string(),
            ));
        }
        if !self.shape.layout().is_storage_compatible(other.layout()) {
            return Err(ObjectModelError::IncompatibleLayout);
        }
        if *other == self.shape {
            return Ok(false);
        }
        self.shape.invalidate_all_property_assumptions();
        self.storage.clear_references();
        self.storage.resize_to(other.counters());
        self.shape = other.clone();
        self.check_storage();
        Ok(true)
    }

    /// Migrates the object off an obsolete shape. Returns false if the shape
    /// was valid.
    pub fn update_shape(&mut self) -> bool {
        if self.shape.is_valid() {
            return false;
        }
        let old = self.shape.clone();
        let new = old.ensure_valid();
        let moves = MovePlan::between(&old, &new, None);
        debug!(from = %old, to = %new, "migrating object off obsolete shape");
        self.reshape(&new, &moves, true);
        true
    }

    /// Keys of all non-hidden properties in insertion order.
    pub fn get_key_array(&self) -> Vec<PropertyKey> {
        self.shape.keys_filtered(false)
    }

    /// All non-hidden properties in insertion order.
    pub fn get_property_array(&self) -> Vec<Property> {
        self.shape
            .properties()
            .filter(|p| !p.is_hidden())
            .cloned()
            .collect()
    }

    #[inline]
    fn check_storage(&self) {
        if cfg!(any(debug_assertions, feature = "verify")) {
            assert!(
                self.storage.object_array_len() >= self.shape.object_array_capacity(),
                "object array shorter than {} capacity",
                self.shape
            );
            assert!(
                self.storage.primitive_array_len() >= self.shape.primitive_array_capacity(),
                "primitive array shorter than {} capacity",
                self.shape
            );
        }
    }
}

impl fmt::Debug for DynamicObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.shape)?;
        f.debug_map()
            .entries(
                self.shape
                    .properties()
                    .map(|p| (p.key(), p.location().get(&self.storage))),
            )
            .finish()
    }
}

/// Shared, lockable handle to a [`DynamicObject`]. Compares by identity.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<DynamicObject>>);

impl ObjectRef {
    pub fn new(object: DynamicObject) -> Self {
        Self(Arc::new(RwLock::new(object)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, DynamicObject> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, DynamicObject> {
        self.0.write()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const u8 as usize
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.addr())
    }
}
