// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::{location::Location, value::Value};

/// Result alias used by every fallible operation of the object model.
pub type ObjectModelResult<T> = Result<T, ObjectModelError>;

/// Recoverable failures of the object model.
///
/// Broken internal invariants are not represented here; they panic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObjectModelError {
    /// A value was written into a [`Location`] that cannot hold it.
    #[error("value {value} cannot be stored in {location}")]
    IncompatibleLocation { location: Location, value: Value },
    /// A typed read found a value of another kind.
    #[error("expected a value of kind {expected}, found {found}")]
    UnexpectedResult { expected: &'static str, found: Value },
    /// `reset_shape` was called with a shape that has instance properties.
    #[error("shape {0} has instance properties and cannot be used to reset an object")]
    ShapeHasInstanceProperties(String),
    /// `reset_shape` was called with a shape whose layout does not match the
    /// object's storage.
    #[error("shape layout is incompatible with the object's storage layout")]
    IncompatibleLayout,
}

impl ObjectModelError {
    pub(crate) fn incompatible(location: &Location, value: &Value) -> Self {
        Self::IncompatibleLocation {
            location: location.clone(),
            value: value.clone(),
        }
    }

    pub(crate) fn unexpected(expected: &'static str, found: Value) -> Self {
        Self::UnexpectedResult { expected, found }
    }
}
