// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Object model
//!
//! A shape-based storage layout engine for dynamic objects. Objects whose
//! properties are added in the same order with compatible value kinds share
//! one immutable [`Shape`], which maps every [`PropertyKey`] to a
//! [`Location`] in the object's physical storage.
//!
//! The crate is organised bottom-up:
//!
//! * [`Value`], [`PropertyKey`] and [`DynamicType`] are the guest-level data.
//! * [`Location`] describes where a property value lives; the [`Allocator`]
//!   hands out locations for a shape.
//! * [`PropertyMap`] is the persistent, insertion-ordered key map of a shape.
//! * [`Shape`] is the node of the interned shape graph and owns the
//!   [`Transition`] cache to its successors.
//! * [`DynamicObject`] owns the physical storage and implements the uncached
//!   access paths.
//! * [`AccessCache`] is a polymorphic inline cache in front of the uncached
//!   paths.

mod allocator;
mod assumption;
mod cache;
mod error;
mod key;
mod layout;
mod location;
mod moves;
mod object;
mod property;
mod property_map;
mod shape;
mod storage;
mod transition;
mod value;

pub use allocator::Allocator;
pub use assumption::Assumption;
pub use cache::{AccessCache, CacheLimits};
pub use error::{ObjectModelError, ObjectModelResult};
pub use key::{HiddenKey, PropertyKey};
pub use layout::{Layout, LayoutBuilder, LayoutOptions, PropertyMapKind};
pub use location::{Footprint, Location, LocationVisitor, SlotKind, SlotLocation, StorageClass};
pub use object::{DynamicObject, ObjectRef};
pub use property::{Property, PropertyFlags};
pub use property_map::PropertyMap;
pub use shape::{DynamicType, Shape, ShapeBuilder, ShapeId};
pub use storage::{ObjectStorage, SlotStorage};
pub use transition::Transition;
pub use value::{Value, ValueKind};
