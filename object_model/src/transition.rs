// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Weak;

use ahash::RandomState;
use hashbrown::HashMap;

use crate::{
    key::PropertyKey,
    property::Property,
    shape::{DynamicType, Shape, ShapeRecord},
};

/// Edge of the shape graph.
///
/// Transitions compare structurally, so equal transitions from the same
/// shape always lead to the same successor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transition {
    AddProperty {
        property: Property,
    },
    /// A direct removal leaves a gap in the storage; an indirect one
    /// rebuilds the shape without the property.
    RemoveProperty {
        property: Property,
        direct: bool,
    },
    ReplaceProperty {
        before: Property,
        after: Property,
        direct: bool,
    },
    ObjectTypeChange(DynamicType),
    ShapeFlagsChange(u32),
    MakeShared,
}

impl Transition {
    /// True if the target shape is a structural child of the source.
    pub fn is_direct(&self) -> bool {
        match self {
            Transition::RemoveProperty { direct, .. }
            | Transition::ReplaceProperty { direct, .. } => *direct,
            _ => true,
        }
    }

    /// The property key this transition adds, removes or replaces.
    pub fn property_key(&self) -> Option<&PropertyKey> {
        match self {
            Transition::AddProperty { property } | Transition::RemoveProperty { property, .. } => {
                Some(property.key())
            }
            Transition::ReplaceProperty { after, .. } => Some(after.key()),
            _ => None,
        }
    }
}

/// Outgoing transitions of a shape.
///
/// Successors are held weakly; an entry whose shape has been dropped reads
/// as a miss and is purged on the next insertion.
#[derive(Default)]
pub(crate) enum TransitionMap {
    #[default]
    Empty,
    Single(Transition, Weak<ShapeRecord>),
    Map(HashMap<Transition, Weak<ShapeRecord>, RandomState>),
}

impl TransitionMap {
    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, TransitionMap::Empty)
    }

    pub(crate) fn get(&self, transition: &Transition) -> Option<Shape> {
        match self {
            TransitionMap::Empty => None,
            TransitionMap::Single(t, shape) => {
                if t == transition {
                    Shape::upgrade(shape)
                } else {
                    None
                }
            }
            TransitionMap::Map(map) => map.get(transition).and_then(Shape::upgrade),
        }
    }

    pub(crate) fn insert(&mut self, transition: Transition, shape: &Shape) {
        let weak = shape.downgrade();
        match std::mem::take(self) {
            TransitionMap::Empty => *self = TransitionMap::Single(transition, weak),
            TransitionMap::Single(t, existing) if t == transition || existing.strong_count() == 0 => {
                *self = TransitionMap::Single(transition, weak);
            }
            TransitionMap::Single(t, existing) => {
                let mut map = HashMap::with_capacity_and_hasher(2, RandomState::new());
                map.insert(t, existing);
                map.insert(transition, weak);
                *self = TransitionMap::Map(map);
            }
            TransitionMap::Map(mut map) => {
                map.retain(|_, shape| shape.strong_count() > 0);
                map.insert(transition, weak);
                *self = TransitionMap::Map(map);
            }
        }
    }

    /// Live successors together with the transitions leading to them.
    pub(crate) fn entries(&self) -> Vec<(Transition, Shape)> {
        match self {
            TransitionMap::Empty => Vec::new(),
            TransitionMap::Single(t, shape) => Shape::upgrade(shape)
                .map(|shape| (t.clone(), shape))
                .into_iter()
                .collect(),
            TransitionMap::Map(map) => map
                .iter()
                .filter_map(|(t, shape)| Some((t.clone(), Shape::upgrade(shape)?)))
                .collect(),
        }
    }

    pub(crate) fn live_len(&self) -> usize {
        match self {
            TransitionMap::Empty => 0,
            TransitionMap::Single(_, shape) => usize::from(shape.strong_count() > 0),
            TransitionMap::Map(map) => map.values().filter(|s| s.strong_count() > 0).count(),
        }
    }
}
