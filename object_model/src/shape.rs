// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod builder;
mod define;
mod rebuild;

use std::{
    fmt,
    hash::{Hash, Hasher},
    num::NonZeroU32,
    sync::{
        Arc, OnceLock, Weak,
        atomic::{AtomicU32, Ordering},
    },
};

use ahash::RandomState;
use bitflags::bitflags;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use tracing::{debug, trace};

pub use builder::ShapeBuilder;
pub(crate) use define::LocationFactory;

use crate::{
    allocator::Allocator,
    assumption::Assumption,
    key::PropertyKey,
    layout::Layout,
    location::SlotKind,
    property::Property,
    property_map::PropertyMap,
    storage::StorageCounters,
    transition::{Transition, TransitionMap},
};

/// Embedder-defined object type tag carried by a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DynamicType(pub u32);

/// Identifier of a shape, unique within its shape tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeId(NonZeroU32);

impl ShapeId {
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct ShapeFlags: u32 {
        const USER_MASK = 0xFFFF;
        const SHARED = 1 << 16;
        const ALLOWS_PROPERTY_ASSUMPTIONS = 1 << 17;
        const HAS_INSTANCE_PROPERTIES = 1 << 18;
    }
}

/// State shared by every shape descending from one root.
pub(crate) struct ShapeTree {
    layout: Layout,
    next_id: AtomicU32,
    property_assumptions: Mutex<HashMap<PropertyKey, Assumption, RandomState>>,
}

impl ShapeTree {
    fn new(layout: Layout) -> Self {
        Self {
            layout,
            next_id: AtomicU32::new(1),
            property_assumptions: Mutex::new(HashMap::default()),
        }
    }

    fn next_id(&self) -> ShapeId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match NonZeroU32::new(id) {
            Some(id) => ShapeId(id),
            None => panic!("shape id space exhausted"),
        }
    }

    fn property_assumption(&self, key: &PropertyKey) -> Assumption {
        self.property_assumptions
            .lock()
            .entry(key.clone())
            .or_insert_with(Assumption::new)
            .clone()
    }

    fn invalidate_property_assumption(&self, key: &PropertyKey) {
        if let Some(assumption) = self.property_assumptions.lock().get(key)
            && assumption.invalidate()
        {
            debug!(?key, "property assumption invalidated");
        }
    }

    fn invalidate_all_property_assumptions(&self) {
        for assumption in self.property_assumptions.lock().values() {
            assumption.invalidate();
        }
    }
}

/// Data structure describing the layout of an object.
///
/// Shapes are immutable and interned: applying equal transitions to the same
/// shape yields the identical successor for as long as that successor is
/// alive. Identity is pointer identity.
#[derive(Clone)]
pub struct Shape(Arc<ShapeRecord>);

pub(crate) struct ShapeRecord {
    id: ShapeId,
    tree: Arc<ShapeTree>,
    parent: Option<Shape>,
    transition_from_parent: Option<Transition>,
    properties: PropertyMap,
    dynamic_type: DynamicType,
    counters: StorageCounters,
    depth: u32,
    flags: ShapeFlags,
    valid: Assumption,
    /// Created on first request; valid while no transition leaves the shape.
    leaf: OnceLock<Assumption>,
    transitions: RwLock<TransitionMap>,
    /// Set when a generalization made this shape obsolete.
    obsoleted_by: OnceLock<Shape>,
}

impl Shape {
    pub fn builder() -> ShapeBuilder {
        ShapeBuilder::default()
    }

    fn new_root(
        layout: Layout,
        dynamic_type: DynamicType,
        flags: ShapeFlags,
        properties: PropertyMap,
    ) -> Self {
        let tree = Arc::new(ShapeTree::new(layout));
        let id = tree.next_id();
        Shape(Arc::new(ShapeRecord {
            id,
            tree,
            parent: None,
            transition_from_parent: None,
            properties,
            dynamic_type,
            counters: StorageCounters::default(),
            depth: 0,
            flags,
            valid: Assumption::new(),
            leaf: OnceLock::new(),
            transitions: RwLock::new(TransitionMap::Empty),
            obsoleted_by: OnceLock::new(),
        }))
    }

    /// Successor record reached from `self` through `transition`.
    fn child(
        &self,
        transition: &Transition,
        properties: PropertyMap,
        counters: StorageCounters,
        flags: ShapeFlags,
        dynamic_type: DynamicType,
    ) -> Shape {
        let tree = self.0.tree.clone();
        let id = tree.next_id();
        let mut flags = flags - ShapeFlags::HAS_INSTANCE_PROPERTIES;
        if properties.iter().any(|p| !p.location().is_value()) {
            flags |= ShapeFlags::HAS_INSTANCE_PROPERTIES;
        }
        Shape(Arc::new(ShapeRecord {
            id,
            tree,
            parent: Some(self.clone()),
            transition_from_parent: Some(transition.clone()),
            properties,
            dynamic_type,
            counters,
            depth: self.0.depth + 1,
            flags,
            valid: Assumption::new(),
            leaf: OnceLock::new(),
            transitions: RwLock::new(TransitionMap::Empty),
            obsoleted_by: OnceLock::new(),
        }))
    }

    pub(crate) fn upgrade(weak: &Weak<ShapeRecord>) -> Option<Shape> {
        weak.upgrade().map(Shape)
    }

    pub(crate) fn downgrade(&self) -> Weak<ShapeRecord> {
        Arc::downgrade(&self.0)
    }

    pub fn id(&self) -> ShapeId {
        self.0.id
    }

    pub fn layout(&self) -> &Layout {
        &self.0.tree.layout
    }

    pub fn property_map(&self) -> &PropertyMap {
        &self.0.properties
    }

    pub fn property_count(&self) -> usize {
        self.0.properties.len()
    }

    pub fn depth(&self) -> u32 {
        self.0.depth
    }

    pub fn parent(&self) -> Option<&Shape> {
        self.0.parent.as_ref()
    }

    pub fn transition_from_parent(&self) -> Option<&Transition> {
        self.0.transition_from_parent.as_ref()
    }

    pub fn root(&self) -> Shape {
        let mut shape = self;
        while let Some(parent) = shape.parent() {
            shape = parent;
        }
        shape.clone()
    }

    pub fn get_property(&self, key: &PropertyKey) -> Option<&Property> {
        self.0.properties.get(key)
    }

    pub fn has_property(&self, key: &PropertyKey) -> bool {
        self.0.properties.contains_key(key)
    }

    pub fn last_property(&self) -> Option<&Property> {
        self.0.properties.last()
    }

    /// Properties in insertion order.
    pub fn properties(&self) -> impl DoubleEndedIterator<Item = &Property> + ExactSizeIterator {
        self.0.properties.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PropertyKey> {
        self.0.properties.keys()
    }

    /// Keys in insertion order, leaving out hidden properties unless
    /// `include_hidden` is set.
    pub fn keys_filtered(&self, include_hidden: bool) -> Vec<PropertyKey> {
        self.properties()
            .filter(|p| include_hidden || !p.is_hidden())
            .map(|p| p.key().clone())
            .collect()
    }

    pub fn dynamic_type(&self) -> DynamicType {
        self.0.dynamic_type
    }

    /// User-visible shape flags.
    pub fn flags(&self) -> u32 {
        (self.0.flags & ShapeFlags::USER_MASK).bits()
    }

    pub fn is_shared(&self) -> bool {
        self.0.flags.contains(ShapeFlags::SHARED)
    }

    /// True if any property stores its value in the object.
    pub fn has_instance_properties(&self) -> bool {
        self.0.flags.contains(ShapeFlags::HAS_INSTANCE_PROPERTIES)
    }

    pub fn allows_property_assumptions(&self) -> bool {
        self.0.flags.contains(ShapeFlags::ALLOWS_PROPERTY_ASSUMPTIONS)
    }

    pub fn is_valid(&self) -> bool {
        self.0.valid.is_valid()
    }

    /// Flag that stays valid until this shape becomes obsolete.
    pub fn valid_assumption(&self) -> &Assumption {
        &self.0.valid
    }

    /// The shape that replaced this one, if it became obsolete.
    pub fn obsoleted_by(&self) -> Option<&Shape> {
        self.0.obsoleted_by.get()
    }

    /// Flag that stays valid while no transition leaves this shape.
    pub fn leaf_assumption(&self) -> Assumption {
        // Initialised under the read lock so that a concurrent insertion
        // either sees the assumption or is seen by it.
        let transitions = self.0.transitions.read();
        self.0
            .leaf
            .get_or_init(|| {
                if transitions.is_empty() {
                    Assumption::new()
                } else {
                    Assumption::never_valid()
                }
            })
            .clone()
    }

    pub fn is_leaf(&self) -> bool {
        self.leaf_assumption().is_valid()
    }

    /// Flag that stays valid until a transition that adds, replaces or
    /// removes `key` is created anywhere in this shape's tree. Never valid
    /// unless the tree was built with property assumptions enabled.
    pub fn property_assumption(&self, key: &PropertyKey) -> Assumption {
        if !self.allows_property_assumptions() {
            return Assumption::never_valid();
        }
        self.0.tree.property_assumption(key)
    }

    pub(crate) fn invalidate_all_property_assumptions(&self) {
        self.0.tree.invalidate_all_property_assumptions();
    }

    /// True if both shapes descend from the same root.
    pub fn is_related(&self, other: &Shape) -> bool {
        Arc::ptr_eq(&self.0.tree, &other.0.tree)
    }

    pub fn allocator(&self) -> Allocator {
        Allocator::new(*self.layout(), self.is_shared(), self.0.counters)
    }

    pub(crate) fn counters(&self) -> &StorageCounters {
        &self.0.counters
    }

    pub fn object_array_capacity(&self) -> u32 {
        self.0.counters.object_array_capacity
    }

    pub fn primitive_array_capacity(&self) -> u32 {
        self.0.counters.primitive_array_capacity
    }

    pub fn object_array_size(&self) -> u32 {
        self.0.counters.object_array_size
    }

    pub fn primitive_array_size(&self) -> u32 {
        self.0.counters.primitive_array_size
    }

    /// Number of live successors in the transition cache.
    pub fn transition_count(&self) -> usize {
        self.0.transitions.read().live_len()
    }

    /// The cached successor for `transition`, if one is alive.
    pub fn query_transition(&self, transition: &Transition) -> Option<Shape> {
        self.0.transitions.read().get(transition)
    }

    /// Looks up a structural successor, creating and registering it on a
    /// miss. Creation runs under the upgradable lock, so concurrent callers
    /// agree on one successor.
    fn get_or_add_direct(
        &self,
        transition: Transition,
        create: impl FnOnce(&Transition) -> Shape,
    ) -> Shape {
        debug_assert!(transition.is_direct());
        if let Some(shape) = self.query_transition(&transition) {
            return shape;
        }
        let transitions = self.0.transitions.upgradable_read();
        if let Some(shape) = transitions.get(&transition) {
            return shape;
        }
        let shape = create(&transition);
        let mut transitions = RwLockUpgradableReadGuard::upgrade(transitions);
        self.register_transition(&mut transitions, transition, &shape);
        shape
    }

    /// Like [`Shape::get_or_add_direct`] for successors that are built
    /// elsewhere in the tree. The build runs without holding the lock; if
    /// another thread registered a successor first, that one wins.
    fn get_or_add_indirect(&self, transition: Transition, create: impl FnOnce() -> Shape) -> Shape {
        if let Some(shape) = self.query_transition(&transition) {
            return shape;
        }
        let shape = create();
        let mut transitions = self.0.transitions.write();
        if let Some(existing) = transitions.get(&transition) {
            return existing;
        }
        self.register_transition(&mut transitions, transition, &shape);
        shape
    }

    fn register_transition(
        &self,
        transitions: &mut TransitionMap,
        transition: Transition,
        shape: &Shape,
    ) {
        if let Some(leaf) = self.0.leaf.get() {
            leaf.invalidate();
        }
        // Checked under the write lock, so a concurrent invalidation either
        // sees the new child or is seen here.
        if !self.is_valid() && transition.is_direct() && shape.parent() == Some(self) {
            shape.0.valid.invalidate();
        }
        if self.allows_property_assumptions()
            && let Some(key) = transition.property_key()
        {
            self.0.tree.invalidate_property_assumption(key);
        }
        trace!(from = %self.id().get(), to = %shape.id().get(), ?transition, "new transition");
        transitions.insert(transition, shape);
    }

    /// Successor with `property` appended. On an obsolete shape the
    /// transition is taken from [`Shape::ensure_valid`] instead, as are the
    /// other transitions below.
    ///
    /// ## Panics
    ///
    /// If the shape already has a property with the same key.
    pub fn add_property(&self, property: Property) -> Shape {
        assert!(
            !self.has_property(property.key()),
            "property {:?} already present",
            property.key()
        );
        if !self.is_valid() {
            return self
                .ensure_valid()
                .apply_replayed(&Transition::AddProperty { property });
        }
        self.get_or_add_direct(Transition::AddProperty { property }, |transition| {
            let Transition::AddProperty { property } = transition else {
                unreachable!()
            };
            let mut allocator = self.allocator();
            allocator.add_location(property.location());
            let counters = allocator.counters().with_capacities_from(&self.0.counters);
            let properties = self.0.properties.copy_and_put(property.clone());
            self.child(
                transition,
                properties,
                counters,
                self.0.flags,
                self.0.dynamic_type,
            )
        })
    }

    /// Successor with `old` swapped for `new` in place. New slots are
    /// appended; the old slot is left unused.
    pub fn replace_property(&self, old: &Property, new: Property) -> Shape {
        debug_assert!(old.key() == new.key());
        if !self.is_valid() {
            return self.ensure_valid().apply_replayed(&Transition::ReplaceProperty {
                before: old.clone(),
                after: new,
                direct: true,
            });
        }
        if *old == new {
            return self.clone();
        }
        let transition = Transition::ReplaceProperty {
            before: old.clone(),
            after: new,
            direct: true,
        };
        self.get_or_add_direct(transition, |transition| {
            let Transition::ReplaceProperty { after, .. } = transition else {
                unreachable!()
            };
            let mut allocator = self.allocator();
            allocator.add_location(after.location());
            let counters = allocator.counters().with_capacities_from(&self.0.counters);
            let properties = self
                .0
                .properties
                .copy_and_replace(after.key(), after.clone());
            self.child(
                transition,
                properties,
                counters,
                self.0.flags,
                self.0.dynamic_type,
            )
        })
    }

    /// Successor without `property`.
    ///
    /// Shared shapes never reuse storage, so the property's slot becomes a
    /// gap. Other shapes are rebuilt from the ancestor preceding the
    /// property's addition with the later properties moved down.
    pub fn remove_property(&self, property: &Property) -> Shape {
        if !self.is_valid() {
            return self.ensure_valid().apply_replayed(&Transition::RemoveProperty {
                property: property.clone(),
                direct: true,
            });
        }
        let Some(current) = self.get_property(property.key()).cloned() else {
            return self.clone();
        };
        if !self.is_shared() {
            let transition = Transition::RemoveProperty {
                property: current.clone(),
                direct: false,
            };
            if let Some(shape) = self.query_transition(&transition) {
                return shape;
            }
            if let Some(rebuilt) = self.rebuild_from_add(current.key(), None) {
                debug!(shape = %self.id().get(), key = ?current.key(), "indirect removal");
                return self.get_or_add_indirect(transition, || rebuilt);
            }
        }
        let transition = Transition::RemoveProperty {
            property: current,
            direct: true,
        };
        self.get_or_add_direct(transition, |transition| {
            let Transition::RemoveProperty { property, .. } = transition else {
                unreachable!()
            };
            let properties = self.0.properties.copy_and_remove(property.key());
            self.child(
                transition,
                properties,
                self.0.counters,
                self.0.flags,
                self.0.dynamic_type,
            )
        })
    }

    pub fn set_dynamic_type(&self, dynamic_type: DynamicType) -> Shape {
        if !self.is_valid() {
            return self.ensure_valid().set_dynamic_type(dynamic_type);
        }
        if self.0.dynamic_type == dynamic_type {
            return self.clone();
        }
        self.get_or_add_direct(Transition::ObjectTypeChange(dynamic_type), |transition| {
            self.child(
                transition,
                self.0.properties.clone(),
                self.0.counters,
                self.0.flags,
                dynamic_type,
            )
        })
    }

    /// Successor with the user-visible flags replaced.
    ///
    /// ## Panics
    ///
    /// If `flags` has bits outside the low 16.
    pub fn set_flags(&self, flags: u32) -> Shape {
        assert!(
            flags & !ShapeFlags::USER_MASK.bits() == 0,
            "shape flags {flags:#x} exceed the user mask"
        );
        if !self.is_valid() {
            return self.ensure_valid().set_flags(flags);
        }
        if self.flags() == flags {
            return self.clone();
        }
        self.get_or_add_direct(Transition::ShapeFlagsChange(flags), |transition| {
            let flags = (self.0.flags - ShapeFlags::USER_MASK) | ShapeFlags::from_bits_retain(flags);
            self.child(
                transition,
                self.0.properties.clone(),
                self.0.counters,
                flags,
                self.0.dynamic_type,
            )
        })
    }

    /// Shared successor. Primitive slots are relocated to fresh reference
    /// slots so every value of a shared object is stored as a reference.
    pub fn make_shared(&self) -> Shape {
        if !self.is_valid() {
            return self.ensure_valid().make_shared();
        }
        if self.is_shared() {
            return self.clone();
        }
        self.get_or_add_direct(Transition::MakeShared, |transition| {
            let mut allocator = self.allocator();
            let mut properties = self.0.properties.clone();
            for property in self.properties().filter(|p| p.location().is_primitive()) {
                let location = allocator.location_for_kind(SlotKind::Object);
                allocator.add_location(&location);
                properties =
                    properties.copy_and_replace(property.key(), property.relocate(location));
            }
            let counters = allocator.counters().with_capacities_from(&self.0.counters);
            self.child(
                transition,
                properties,
                counters,
                self.0.flags | ShapeFlags::SHARED,
                self.0.dynamic_type,
            )
        })
    }
}

impl Drop for ShapeRecord {
    fn drop(&mut self) {
        // Unlink long parent chains one record at a time.
        let mut parent = self.parent.take();
        while let Some(Shape(record)) = parent {
            parent = match Arc::try_unwrap(record) {
                Ok(mut record) => record.parent.take(),
                Err(_) => None,
            };
        }
    }
}

impl PartialEq for Shape {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Shape {}

impl Hash for Shape {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape#{}", self.0.id.get())?;
        if !self.is_valid() {
            f.write_str("(obsolete)")?;
        }
        write!(f, " {:?}", self.0.properties)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape#{}", self.0.id.get())
    }
}
