// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Which [`PropertyMap`](crate::PropertyMap) representation new shapes use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyMapKind {
    /// Reverse-linked list of properties; cheapest for small shapes.
    ConsList,
    /// Hash trie with insertion-order links.
    Trie,
    /// Cons list up to `trie_threshold` properties, trie beyond.
    Auto { trie_threshold: usize },
}

impl Default for PropertyMapKind {
    fn default() -> Self {
        PropertyMapKind::Auto { trie_threshold: 8 }
    }
}

/// Tuning knobs of a shape tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutOptions {
    /// Int locations may be widened to long locations that also accept ints.
    pub implicit_cast_int_to_long: bool,
    /// Int locations may be widened to double locations that also accept
    /// ints.
    pub implicit_cast_int_to_double: bool,
    /// Primitive values may spill into the primitive extension array once the
    /// inline primitive fields are used up. When false they spill into
    /// reference storage instead.
    pub primitive_array_allowed: bool,
    pub property_map: PropertyMapKind,
    /// Generalizing a location rebuilds the shape and marks the old one
    /// obsolete; objects migrate lazily. When false, generalization appends a
    /// new slot and old shapes stay valid.
    pub obsolescence: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            implicit_cast_int_to_long: true,
            implicit_cast_int_to_double: true,
            primitive_array_allowed: true,
            property_map: PropertyMapKind::default(),
            obsolescence: false,
        }
    }
}

/// Physical shape of an object's inline storage plus the options that
/// govern how locations are handed out.
///
/// Objects may only switch between shapes with equal layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    object_field_count: u32,
    /// Counted in 32-bit units; longs and doubles take two.
    primitive_field_count: u32,
    options: LayoutOptions,
}

impl Layout {
    pub fn builder() -> LayoutBuilder {
        LayoutBuilder::default()
    }

    #[inline]
    pub fn object_field_count(&self) -> u32 {
        self.object_field_count
    }

    #[inline]
    pub fn primitive_field_count(&self) -> u32 {
        self.primitive_field_count
    }

    #[inline]
    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    /// True if objects of both layouts have identical inline storage.
    pub fn is_storage_compatible(&self, other: &Layout) -> bool {
        self.object_field_count == other.object_field_count
            && self.primitive_field_count == other.primitive_field_count
    }
}

impl Default for Layout {
    fn default() -> Self {
        LayoutBuilder::default().build()
    }
}

#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    object_field_count: u32,
    primitive_field_count: u32,
    options: LayoutOptions,
}

impl Default for LayoutBuilder {
    fn default() -> Self {
        Self {
            object_field_count: 4,
            primitive_field_count: 4,
            options: LayoutOptions::default(),
        }
    }
}

impl LayoutBuilder {
    pub fn object_fields(mut self, count: u32) -> Self {
        self.object_field_count = count;
        self
    }

    pub fn primitive_fields(mut self, count: u32) -> Self {
        self.primitive_field_count = count;
        self
    }

    pub fn options(mut self, options: LayoutOptions) -> Self {
        self.options = options;
        self
    }

    pub fn implicit_cast_int_to_long(mut self, allowed: bool) -> Self {
        self.options.implicit_cast_int_to_long = allowed;
        self
    }

    pub fn implicit_cast_int_to_double(mut self, allowed: bool) -> Self {
        self.options.implicit_cast_int_to_double = allowed;
        self
    }

    pub fn primitive_array_allowed(mut self, allowed: bool) -> Self {
        self.options.primitive_array_allowed = allowed;
        self
    }

    pub fn property_map(mut self, kind: PropertyMapKind) -> Self {
        self.options.property_map = kind;
        self
    }

    pub fn obsolescence(mut self, enabled: bool) -> Self {
        self.options.obsolescence = enabled;
        self
    }

    pub fn build(self) -> Layout {
        let Self {
            object_field_count,
            primitive_field_count,
            options,
        } = self;
        Layout {
            object_field_count,
            primitive_field_count,
            options,
        }
    }
}
