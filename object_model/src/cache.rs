// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polymorphic inline caches for object accesses.
//!
//! An [`AccessCache`] stands for one access site. It remembers the plans it
//! computed for the shapes and keys it has seen, and replays them while the
//! object's shape is identical to the recorded one. A site that sees too many
//! keys or shapes stops recording and takes the uncached path from then on.

mod chain;
mod entry;

use std::fmt;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{
    error::ObjectModelResult,
    key::PropertyKey,
    moves::MovePlan,
    object::{DynamicObject, PutMode, PutPlan, plan_put},
    property::{Property, PropertyFlags},
    shape::{DynamicType, Shape},
    value::Value,
};

use chain::{Chain, Probe};
use entry::{
    FlagsEntry, KeyEntry, PutEntry, ReadEntry, RemoveEntry, ShapeChange, ShapeChangeEntry,
};

/// Size limits of an [`AccessCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    /// Shapes remembered per key for reads, removals and flag changes.
    pub shape_limit: usize,
    /// Distinct keys per site.
    pub key_limit: usize,
    /// Write plans remembered per key.
    pub put_limit: usize,
    /// Plans remembered for dynamic type, shape flags and sharing changes.
    pub shape_change_limit: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            shape_limit: 5,
            key_limit: 3,
            put_limit: 4,
            shape_change_limit: 3,
        }
    }
}

/// An access site caching property lookups and shape transitions.
///
/// Lookups take a read lock; computing and recording a new plan takes the
/// write lock, so each plan is computed once per site. Results are always
/// the ones the uncached [`DynamicObject`] methods produce.
pub struct AccessCache {
    limits: CacheLimits,
    keys: RwLock<Chain<KeyEntry>>,
    shape_changes: RwLock<Chain<ShapeChangeEntry>>,
}

impl Default for AccessCache {
    fn default() -> Self {
        Self::new(CacheLimits::default())
    }
}

impl AccessCache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            limits,
            keys: RwLock::new(Chain::default()),
            shape_changes: RwLock::new(Chain::default()),
        }
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// True once the site saw more keys than its limit allows.
    pub fn is_generic(&self) -> bool {
        self.keys.read().is_generic()
    }

    /// Number of keys with recorded entries.
    pub fn key_count(&self) -> usize {
        self.keys.read().len()
    }

    pub fn get(&self, object: &DynamicObject, key: &PropertyKey) -> Option<Value> {
        self.lookup(object.shape(), key)
            .map(|property| property.location().get(object.storage()))
    }

    pub fn get_or_default(&self, object: &DynamicObject, key: &PropertyKey, default: Value) -> Value {
        self.get(object, key).unwrap_or(default)
    }

    pub fn get_int(
        &self,
        object: &DynamicObject,
        key: &PropertyKey,
        default: Value,
    ) -> ObjectModelResult<i32> {
        match self.lookup(object.shape(), key) {
            Some(property) => property.location().get_int(object.storage()),
            None => object.get_int(key, default),
        }
    }

    pub fn get_long(
        &self,
        object: &DynamicObject,
        key: &PropertyKey,
        default: Value,
    ) -> ObjectModelResult<i64> {
        match self.lookup(object.shape(), key) {
            Some(property) => property.location().get_long(object.storage()),
            None => object.get_long(key, default),
        }
    }

    pub fn get_double(
        &self,
        object: &DynamicObject,
        key: &PropertyKey,
        default: Value,
    ) -> ObjectModelResult<f64> {
        match self.lookup(object.shape(), key) {
            Some(property) => property.location().get_double(object.storage()),
            None => object.get_double(key, default),
        }
    }

    pub fn get_boolean(
        &self,
        object: &DynamicObject,
        key: &PropertyKey,
        default: Value,
    ) -> ObjectModelResult<bool> {
        match self.lookup(object.shape(), key) {
            Some(property) => property.location().get_boolean(object.storage()),
            None => object.get_boolean(key, default),
        }
    }

    pub fn contains_key(&self, object: &DynamicObject, key: &PropertyKey) -> bool {
        self.lookup(object.shape(), key).is_some()
    }

    pub fn get_property(&self, object: &DynamicObject, key: &PropertyKey) -> Option<Property> {
        self.lookup(object.shape(), key)
    }

    pub fn put(
        &self,
        object: &mut DynamicObject,
        key: &PropertyKey,
        value: impl Into<Value>,
    ) -> ObjectModelResult<()> {
        self.put_with_mode(object, key, &value.into(), PutMode::PUT)
            .map(|_| ())
    }

    pub fn put_if_present(
        &self,
        object: &mut DynamicObject,
        key: &PropertyKey,
        value: impl Into<Value>,
    ) -> ObjectModelResult<bool> {
        self.put_with_mode(object, key, &value.into(), PutMode::PUT_IF_PRESENT)
    }

    pub fn put_with_flags(
        &self,
        object: &mut DynamicObject,
        key: &PropertyKey,
        value: impl Into<Value>,
        flags: PropertyFlags,
    ) -> ObjectModelResult<()> {
        self.put_with_mode(object, key, &value.into(), PutMode::with_flags(flags))
            .map(|_| ())
    }

    pub fn put_constant(
        &self,
        object: &mut DynamicObject,
        key: &PropertyKey,
        value: impl Into<Value>,
        flags: PropertyFlags,
    ) -> ObjectModelResult<()> {
        self.put_with_mode(object, key, &value.into(), PutMode::constant(flags))
            .map(|_| ())
    }

    pub fn remove_key(&self, object: &mut DynamicObject, key: &PropertyKey) -> bool {
        object.update_shape();
        let shape = object.shape().clone();
        let probe = {
            let keys = self.keys.read();
            match find_key(&keys, key) {
                Probe::Hit(entry) => match entry.removals.find(|e| e.accepts(&shape)) {
                    Probe::Hit(hit) => Probe::Hit(apply_removal(object, hit)),
                    Probe::Miss => Probe::Miss,
                    Probe::Generic => Probe::Generic,
                },
                other => other.map_miss(),
            }
        };
        if let Probe::Hit(removed) = probe {
            return removed;
        }
        if matches!(probe, Probe::Miss) {
            let mut keys = self.keys.write();
            if let Some(entry) = self.key_entry(&mut keys, key) {
                let limit = self.limits.shape_limit;
                if let Probe::Hit(hit) = entry.removals.find(|e| e.accepts(&shape)) {
                    return apply_removal(object, hit);
                }
                if let Some(planned) = RemoveEntry::plan(&shape, key) {
                    match entry.removals.push(planned, limit) {
                        Some(hit) => {
                            trace!(?key, shape = %shape, "cached removal");
                            return apply_removal(object, hit);
                        }
                        None => debug!(?key, "removal cache went generic"),
                    }
                }
            }
        }
        object.remove_key(key)
    }

    pub fn set_property_flags(
        &self,
        object: &mut DynamicObject,
        key: &PropertyKey,
        flags: PropertyFlags,
    ) -> bool {
        object.update_shape();
        let shape = object.shape().clone();
        let probe = {
            let keys = self.keys.read();
            match find_key(&keys, key) {
                Probe::Hit(entry) => match entry.flag_changes.find(|e| e.accepts(&shape, flags)) {
                    Probe::Hit(hit) => Probe::Hit(apply_flags(object, hit)),
                    Probe::Miss => Probe::Miss,
                    Probe::Generic => Probe::Generic,
                },
                other => other.map_miss(),
            }
        };
        if let Probe::Hit(found) = probe {
            return found;
        }
        if matches!(probe, Probe::Miss) {
            let mut keys = self.keys.write();
            if let Some(entry) = self.key_entry(&mut keys, key) {
                let limit = self.limits.shape_limit;
                if let Probe::Hit(hit) = entry.flag_changes.find(|e| e.accepts(&shape, flags)) {
                    return apply_flags(object, hit);
                }
                if let Some(planned) = FlagsEntry::plan(&shape, key, flags) {
                    match entry.flag_changes.push(planned, limit) {
                        Some(hit) => return apply_flags(object, hit),
                        None => debug!(?key, "property flags cache went generic"),
                    }
                }
            }
        }
        object.set_property_flags(key, flags)
    }

    pub fn set_dynamic_type(&self, object: &mut DynamicObject, dynamic_type: DynamicType) -> bool {
        self.change_shape(object, ShapeChange::DynamicType(dynamic_type))
            .unwrap_or_else(|| object.set_dynamic_type(dynamic_type))
    }

    /// ## Panics
    ///
    /// If `flags` has bits outside the low 16.
    pub fn set_shape_flags(&self, object: &mut DynamicObject, flags: u32) -> bool {
        self.change_shape(object, ShapeChange::Flags(flags))
            .unwrap_or_else(|| object.set_shape_flags(flags))
    }

    pub fn mark_shared(&self, object: &mut DynamicObject) -> bool {
        self.change_shape(object, ShapeChange::MakeShared)
            .unwrap_or_else(|| object.mark_shared())
    }

    /// Resolves `key` against `shape`, recording the result on a miss.
    fn lookup(&self, shape: &Shape, key: &PropertyKey) -> Option<Property> {
        let probe = {
            let keys = self.keys.read();
            match find_key(&keys, key) {
                Probe::Hit(entry) => match entry.reads.find(|e| e.accepts(shape)) {
                    Probe::Hit(hit) => Probe::Hit(hit.property.clone()),
                    Probe::Miss => Probe::Miss,
                    Probe::Generic => Probe::Generic,
                },
                other => other.map_miss(),
            }
        };
        match probe {
            Probe::Hit(property) => return property,
            Probe::Generic => return shape.get_property(key).cloned(),
            Probe::Miss => {}
        }
        let mut keys = self.keys.write();
        if let Some(entry) = self.key_entry(&mut keys, key) {
            if let Probe::Hit(hit) = entry.reads.find(|e| e.accepts(shape)) {
                return hit.property.clone();
            }
            if let Some(resolved) = ReadEntry::resolve(shape, key) {
                match entry.reads.push(resolved, self.limits.shape_limit) {
                    Some(hit) => {
                        trace!(?key, shape = %shape, "cached read");
                        return hit.property.clone();
                    }
                    None => debug!(?key, "read cache went generic"),
                }
            }
        }
        shape.get_property(key).cloned()
    }

    fn put_with_mode(
        &self,
        object: &mut DynamicObject,
        key: &PropertyKey,
        value: &Value,
        mode: PutMode,
    ) -> ObjectModelResult<bool> {
        object.update_shape();
        let shape = object.shape().clone();
        let probe = {
            let keys = self.keys.read();
            match find_key(&keys, key) {
                Probe::Hit(entry) => match entry.puts.find(|e| e.accepts(&shape, mode, value)) {
                    Probe::Hit(hit) => Probe::Hit(apply_put(object, &hit.plan, value)),
                    Probe::Miss => Probe::Miss,
                    Probe::Generic => Probe::Generic,
                },
                other => other.map_miss(),
            }
        };
        if let Probe::Hit(result) = probe {
            return result;
        }
        if matches!(probe, Probe::Miss) {
            let mut keys = self.keys.write();
            if let Some(entry) = self.key_entry(&mut keys, key) {
                if let Probe::Hit(hit) = entry.puts.find(|e| e.accepts(&shape, mode, value)) {
                    return apply_put(object, &hit.plan, value);
                }
                // A failing plan is left to the uncached path to report.
                if let Ok(plan) = plan_put(&shape, key, value, mode)
                    && let Some(planned) = PutEntry::new(&shape, key, value, mode, plan)
                {
                    match entry.puts.push(planned, self.limits.put_limit) {
                        Some(hit) => {
                            trace!(?key, shape = %shape, "cached put");
                            return apply_put(object, &hit.plan, value);
                        }
                        None => debug!(?key, "put cache went generic"),
                    }
                }
            }
        }
        object.put_with_mode(key, value, mode)
    }

    /// Applies a cached shape-wide change. Returns `None` when the caller
    /// has to take the uncached path.
    fn change_shape(&self, object: &mut DynamicObject, change: ShapeChange) -> Option<bool> {
        object.update_shape();
        let shape = object.shape().clone();
        {
            let changes = self.shape_changes.read();
            match changes.find(|e| e.accepts(&shape, change)) {
                Probe::Hit(hit) => return Some(apply_shape_change(object, hit)),
                Probe::Generic => return None,
                Probe::Miss => {}
            }
        }
        let mut changes = self.shape_changes.write();
        if let Probe::Hit(hit) = changes.find(|e| e.accepts(&shape, change)) {
            return Some(apply_shape_change(object, hit));
        }
        let planned = ShapeChangeEntry::plan(&shape, change)?;
        match changes.push(planned, self.limits.shape_change_limit) {
            Some(hit) => Some(apply_shape_change(object, hit)),
            None => {
                debug!(?change, "shape change cache went generic");
                None
            }
        }
    }

    /// The entry for `key`, created if missing. Returns `None` once the site
    /// is generic.
    fn key_entry<'a>(
        &self,
        keys: &'a mut Chain<KeyEntry>,
        key: &PropertyKey,
    ) -> Option<&'a mut KeyEntry> {
        if matches!(find_key(keys, key), Probe::Miss) {
            let limit = self.limits.key_limit;
            let entry = keys.push(KeyEntry::new(key.clone()), limit);
            if entry.is_none() {
                debug!(?key, limit, "access site went generic");
            }
            return entry;
        }
        keys.iter_mut().find(|entry| entry.key == *key)
    }
}

impl fmt::Debug for AccessCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self.keys.read();
        let mut s = f.debug_struct("AccessCache");
        s.field("limits", &self.limits);
        if keys.is_generic() {
            s.field("keys", &"generic");
        } else {
            s.field(
                "keys",
                &keys.iter().map(|entry| &entry.key).collect::<Vec<_>>(),
            );
        }
        s.finish()
    }
}

fn find_key<'a>(keys: &'a Chain<KeyEntry>, key: &PropertyKey) -> Probe<&'a KeyEntry> {
    keys.find(|entry| entry.key == *key)
}

fn apply_put(object: &mut DynamicObject, plan: &PutPlan, value: &Value) -> ObjectModelResult<bool> {
    match plan {
        PutPlan::Skip => Ok(false),
        PutPlan::Write {
            shape,
            property,
            moves,
        } => {
            object.write_and_publish(shape, moves, property.location(), value)?;
            Ok(true)
        }
    }
}

fn apply_removal(object: &mut DynamicObject, entry: &RemoveEntry) -> bool {
    match &entry.removal {
        Some(removal) => {
            object.remove_to(&removal.property, &removal.shape, &removal.moves);
            true
        }
        None => false,
    }
}

fn apply_flags(object: &mut DynamicObject, entry: &FlagsEntry) -> bool {
    match &entry.new {
        Some(shape) => {
            object.reshape(shape, &MovePlan::default(), false);
            true
        }
        None => false,
    }
}

fn apply_shape_change(object: &mut DynamicObject, entry: &ShapeChangeEntry) -> bool {
    if entry.new == entry.old {
        return false;
    }
    object.reshape(&entry.new, &entry.moves, false);
    true
}
