// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relocation of property values when an object changes to a shape that
//! stores some of its properties elsewhere.

use crate::{
    key::PropertyKey,
    location::{Location, SlotKind, SlotLocation},
    shape::Shape,
    storage::{ObjectStorage, SlotStorage},
    value::Value,
};

#[derive(Debug, Clone)]
struct Move {
    from: Location,
    to: SlotLocation,
}

impl Move {
    fn write(&self, storage: &mut ObjectStorage, value: &Value) {
        if let Err(error) = Location::Slot(self.to).set(storage, value) {
            unreachable!("relocated value does not fit its new slot: {error}");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Order {
    #[default]
    Ascending,
    Descending,
    /// Sources and destinations overlap in both directions; every value is
    /// read before the first write.
    Buffered,
}

/// Ordered value moves taking an object's storage from one shape's
/// locations to another's.
#[derive(Debug, Clone, Default)]
pub(crate) struct MovePlan {
    moves: Vec<Move>,
    order: Order,
}

impl MovePlan {
    /// Moves for every property present in both shapes whose location
    /// differs, except `skip`.
    pub(crate) fn between(old: &Shape, new: &Shape, skip: Option<&PropertyKey>) -> Self {
        let moves: Vec<Move> = new
            .properties()
            .filter(|to| Some(to.key()) != skip)
            .filter_map(|to| {
                let slot = to.location().as_slot()?;
                let from = old.get_property(to.key())?;
                if from.location().is_same_location(to.location()) {
                    return None;
                }
                Some(Move {
                    from: from.location().clone(),
                    to: *slot,
                })
            })
            .collect();
        Self::from_moves(moves)
    }

    fn from_moves(mut moves: Vec<Move>) -> Self {
        moves.sort_by_key(|m| m.from.as_slot().map_or(0, SlotLocation::ordinal));
        let order = if is_in_place(moves.iter()) {
            Order::Ascending
        } else if is_in_place(moves.iter().rev()) {
            Order::Descending
        } else {
            Order::Buffered
        };
        Self { moves, order }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    #[cfg(test)]
    fn can_move_in_place(&self) -> bool {
        self.order != Order::Buffered
    }

    pub(crate) fn execute(&self, storage: &mut ObjectStorage) {
        let Self { moves, order } = self;
        match order {
            Order::Ascending => {
                for m in moves {
                    let value = m.from.get(storage);
                    m.write(storage, &value);
                }
            }
            Order::Descending => {
                for m in moves.iter().rev() {
                    let value = m.from.get(storage);
                    m.write(storage, &value);
                }
            }
            Order::Buffered => {
                let values: Vec<Value> = moves.iter().map(|m| m.from.get(storage)).collect();
                for (m, value) in moves.iter().zip(values) {
                    m.write(storage, &value);
                }
            }
        }
        // Vacated reference slots must not keep their old values alive.
        for m in moves {
            if let Some(from) = m.from.as_slot()
                && from.kind() == SlotKind::Object
                && !moves.iter().any(|other| other.to.overlaps(from))
            {
                storage.write_object_slot(from.storage(), from.index(), Value::Null);
            }
        }
    }
}

/// True if executing `moves` in iteration order never overwrites a slot a
/// later move still has to read.
fn is_in_place<'a>(moves: impl Iterator<Item = &'a Move>) -> bool {
    let moves: Vec<&Move> = moves.collect();
    moves.iter().enumerate().all(|(i, m)| {
        moves[i + 1..].iter().all(|later| {
            later
                .from
                .as_slot()
                .is_none_or(|source| !source.overlaps(&m.to))
        })
    })
}
