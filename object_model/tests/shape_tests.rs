// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use object_model::{
    DynamicObject, DynamicType, HiddenKey, Layout, Location, Property, PropertyFlags,
    PropertyKey, PropertyMapKind, Shape, SlotKind, Transition, Value,
};

fn key(name: &str) -> PropertyKey {
    PropertyKey::string(name)
}

fn slot_index(shape: &Shape, name: &str) -> u32 {
    match shape.get_property(&key(name)).map(|p| p.location()) {
        Some(Location::Slot(slot)) => slot.index(),
        other => panic!("{name} has no slot location: {other:?}"),
    }
}

fn slot_kind(shape: &Shape, name: &str) -> SlotKind {
    match shape.get_property(&key(name)).map(|p| p.location()) {
        Some(Location::Slot(slot)) => slot.kind(),
        other => panic!("{name} has no slot location: {other:?}"),
    }
}

#[test]
fn equal_transitions_are_interned() {
    let root = Shape::builder().build();
    let a = root.define_property("x", &Value::Int(1), PropertyFlags::empty());
    let b = root.define_property("x", &Value::Int(2), PropertyFlags::empty());
    assert_eq!(a, b);
    assert_eq!(a.parent(), Some(&root));
    assert_eq!(a.depth(), 1);

    let c = a.define_property("y", &Value::Boolean(true), PropertyFlags::empty());
    let d = b.define_property("y", &Value::Boolean(false), PropertyFlags::empty());
    assert_eq!(c, d);
    assert_eq!(c.root(), root);

    // Different kinds take different transitions.
    let e = root.define_property("x", &Value::string("s"), PropertyFlags::empty());
    assert_ne!(a, e);
    assert_eq!(root.transition_count(), 2);

    let removed = c.remove_property(c.get_property(&key("x")).unwrap());
    let removed_again = c.remove_property(c.get_property(&key("x")).unwrap());
    assert_eq!(removed, removed_again);
}

#[test]
fn successors_share_property_records() {
    let root = Shape::builder().build();
    let s1 = root.define_property("k1", &Value::Int(1), PropertyFlags::empty());
    let s2 = s1.define_property("k2", &Value::Int(2), PropertyFlags::empty());
    let k1_parent = s1.get_property(&key("k1")).unwrap();
    let k1_child = s2.get_property(&key("k1")).unwrap();
    assert!(k1_parent.ptr_eq(k1_child));
    assert_eq!(s2.last_property().unwrap().key(), &key("k2"));
}

#[test]
fn generalization_leaves_the_old_shape_intact() {
    let empty = Shape::builder().build();
    let s1 = empty.define_property("x", &Value::Int(1), PropertyFlags::empty());
    let mut old = DynamicObject::new(s1.clone());
    old.put(&key("x"), 1).unwrap();

    let s2 = s1.define_property("x", &Value::Long(2), PropertyFlags::empty());
    assert_ne!(s1, s2);
    assert_eq!(slot_kind(&s1, "x"), SlotKind::Int);
    assert_eq!(slot_kind(&s2, "x"), SlotKind::Long);
    assert!(
        s2.get_property(&key("x"))
            .unwrap()
            .location()
            .can_store(&Value::Long(2))
    );

    let mut new = DynamicObject::new(s1.clone());
    new.put(&key("x"), 2i64).unwrap();
    assert_eq!(new.shape(), &s2);
    assert_eq!(new.get(&key("x")), Some(Value::Long(2)));

    assert!(s1.is_valid());
    assert_eq!(old.shape(), &s1);
    assert_eq!(old.get(&key("x")), Some(Value::Int(1)));
}

#[test]
fn repeated_generalization_settles_on_a_reference_slot() {
    let root = Shape::builder().build();
    let s = root
        .define_property("x", &Value::Int(1), PropertyFlags::empty())
        .define_property("x", &Value::Long(2), PropertyFlags::empty())
        .define_property("x", &Value::Double(3.0), PropertyFlags::empty());
    assert_eq!(slot_kind(&s, "x"), SlotKind::Object);
    for value in [Value::Int(4), Value::Long(5), Value::Double(6.5)] {
        assert_eq!(s.define_property("x", &value, PropertyFlags::empty()), s);
    }
}

#[test]
fn removal_compacts_later_properties() {
    let root = Shape::builder().build();
    let shape = ["x", "y", "z"].iter().fold(root, |shape, name| {
        shape.define_property(*name, &Value::Int(0), PropertyFlags::empty())
    });
    let x = slot_index(&shape, "x");
    let y = slot_index(&shape, "y");

    let removed = shape.remove_property(shape.get_property(&key("y")).unwrap());
    assert!(!removed.has_property(&key("y")));
    assert_eq!(slot_index(&removed, "x"), x);
    assert_eq!(slot_index(&removed, "z"), y);
    assert_eq!(removed.keys_filtered(true), [key("x"), key("z")]);
    assert!(matches!(
        removed.transition_from_parent(),
        Some(Transition::AddProperty { .. })
    ));
}

#[test]
fn removal_and_redefinition_round_trip() {
    let root = Shape::builder().build();
    let shape = root
        .define_property("a", &Value::Int(1), PropertyFlags::empty())
        .define_property("b", &Value::string("b"), PropertyFlags::user(2));
    let b = shape.get_property(&key("b")).unwrap().clone();
    let restored = shape
        .remove_property(&b)
        .define_property(b.key().clone(), &Value::string("c"), b.flags());
    assert_eq!(restored, shape);

    let a = shape.get_property(&key("a")).unwrap().clone();
    let reordered = shape
        .remove_property(&a)
        .define_property(a.key().clone(), &Value::Int(3), a.flags());
    assert_eq!(reordered.keys_filtered(true), [key("b"), key("a")]);
    let mut object = DynamicObject::new(reordered);
    object.put(&key("a"), 5).unwrap();
    object.put(&key("b"), "bee").unwrap();
    assert_eq!(object.get(&key("a")), Some(Value::Int(5)));
    assert_eq!(object.get(&key("b")), Some(Value::string("bee")));
    assert_eq!(object.get_property(&key("b")).unwrap().flags(), PropertyFlags::user(2));
}

#[test]
fn shared_shapes_remove_directly() {
    let root = Shape::builder().shared(true).build();
    let shape = ["a", "b", "c"].iter().fold(root, |shape, name| {
        shape.define_property(*name, &Value::Int(1), PropertyFlags::empty())
    });
    assert!(shape.is_shared());
    assert_eq!(slot_kind(&shape, "a"), SlotKind::Object);
    let c = slot_index(&shape, "c");

    let removed = shape.remove_property(shape.get_property(&key("b")).unwrap());
    assert_eq!(slot_index(&removed, "c"), c);
    assert_eq!(removed.parent(), Some(&shape));
    assert!(matches!(
        removed.transition_from_parent(),
        Some(Transition::RemoveProperty { direct: true, .. })
    ));
}

#[test]
fn extension_array_capacity_is_monotone() {
    let layout = Layout::builder().object_fields(0).primitive_fields(0).build();
    let mut shape = Shape::builder().layout(layout).build();
    let mut capacities = Vec::new();
    for i in 0..20 {
        shape = shape.define_property(format!("p{i}"), &Value::string("v"), PropertyFlags::empty());
        assert!(shape.object_array_capacity() >= shape.object_array_size());
        capacities.push(shape.object_array_capacity());
    }
    assert!(capacities.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(capacities[0], 4);
    assert_eq!(capacities[4], 8);
    assert_eq!(capacities[19], 24);
}

#[test]
fn primitives_spill_into_the_primitive_array() {
    let layout = Layout::builder().primitive_fields(2).build();
    let shape = Shape::builder()
        .layout(layout)
        .build()
        .define_property("a", &Value::Int(1), PropertyFlags::empty())
        .define_property("b", &Value::Double(1.5), PropertyFlags::empty());
    assert_eq!(shape.primitive_array_size(), 2);
    assert_eq!(shape.primitive_array_capacity(), 4);

    let no_array = Layout::builder()
        .primitive_fields(0)
        .primitive_array_allowed(false)
        .build();
    let shape = Shape::builder()
        .layout(no_array)
        .build()
        .define_property("a", &Value::Int(1), PropertyFlags::empty());
    assert_eq!(slot_kind(&shape, "a"), SlotKind::Object);
}

#[test]
fn disabled_implicit_casts_generalize_to_references() {
    let layout = Layout::builder()
        .implicit_cast_int_to_long(false)
        .implicit_cast_int_to_double(false)
        .build();
    let shape = Shape::builder()
        .layout(layout)
        .build()
        .define_property("x", &Value::Int(1), PropertyFlags::empty())
        .define_property("x", &Value::Long(1), PropertyFlags::empty());
    assert_eq!(slot_kind(&shape, "x"), SlotKind::Object);
}

#[test]
fn trie_maps_keep_insertion_order() {
    let layout = Layout::builder().property_map(PropertyMapKind::Trie).build();
    let mut shape = Shape::builder().layout(layout).build();
    let names: Vec<String> = (0..40).map(|i| format!("k{i}")).collect();
    for name in &names {
        shape = shape.define_property(name.as_str(), &Value::Null, PropertyFlags::empty());
    }
    let removed = shape.remove_property(shape.get_property(&key("k17")).unwrap());
    let expected: Vec<PropertyKey> = names
        .iter()
        .filter(|name| *name != "k17")
        .map(|name| key(name))
        .collect();
    assert_eq!(removed.keys_filtered(true), expected);
    let reversed: Vec<PropertyKey> = removed.properties().rev().map(|p| p.key().clone()).collect();
    assert_eq!(reversed.first(), Some(&key("k39")));
    assert_eq!(reversed.last(), Some(&key("k0")));
}

#[test]
fn hidden_properties_are_not_enumerated() {
    let hidden = HiddenKey::new("secret");
    let shape = Shape::builder()
        .build()
        .define_property("visible", &Value::Int(1), PropertyFlags::empty())
        .define_property(hidden.clone(), &Value::Int(2), PropertyFlags::HIDDEN);
    assert_eq!(shape.keys_filtered(false), [key("visible")]);
    assert_eq!(shape.keys_filtered(true).len(), 2);
    assert!(shape.has_property(&PropertyKey::from(hidden)));
    assert!(!shape.has_property(&PropertyKey::from(HiddenKey::new("secret"))));
    assert!(!shape.has_property(&key("secret")));
}

#[test]
fn builder_constants_live_in_the_shape() {
    let root = Shape::builder()
        .dynamic_type(DynamicType(3))
        .shape_flags(0x10)
        .add_constant_property("proto", 42, PropertyFlags::empty())
        .build();
    assert_eq!(root.dynamic_type(), DynamicType(3));
    assert_eq!(root.flags(), 0x10);
    let proto = root.get_property(&key("proto")).unwrap();
    assert_eq!(proto.location(), &Location::Constant(Value::Int(42)));
    assert!(proto.flags().contains(PropertyFlags::CONSTANT));
    assert!(!root.has_instance_properties());

    let object = DynamicObject::new(root);
    assert_eq!(object.get(&key("proto")), Some(Value::Int(42)));
}

#[test]
fn type_and_flag_changes_are_transitions() {
    let root = Shape::builder().build();
    let typed = root.set_dynamic_type(DynamicType(9));
    assert_eq!(typed, root.set_dynamic_type(DynamicType(9)));
    assert_eq!(typed.set_dynamic_type(DynamicType(9)), typed);
    assert_eq!(typed.dynamic_type(), DynamicType(9));

    let flagged = typed.set_flags(0xFF);
    assert_eq!(flagged.flags(), 0xFF);
    assert_eq!(flagged.set_flags(0xFF), flagged);
    assert_eq!(flagged.dynamic_type(), DynamicType(9));
}

#[test]
#[should_panic]
fn shape_flags_outside_the_user_mask_are_rejected() {
    Shape::builder().build().set_flags(1 << 20);
}

#[test]
fn make_shared_relocates_primitives() {
    let shape = Shape::builder()
        .build()
        .define_property("i", &Value::Int(1), PropertyFlags::empty())
        .define_property("s", &Value::string("s"), PropertyFlags::empty());
    let shared = shape.make_shared();
    assert!(shared.is_shared());
    assert_eq!(shared.make_shared(), shared);
    assert_eq!(shape.make_shared(), shared);
    assert_eq!(slot_kind(&shared, "i"), SlotKind::Object);
    assert_eq!(slot_index(&shared, "s"), slot_index(&shape, "s"));
    let added = shared.define_property("d", &Value::Double(0.5), PropertyFlags::empty());
    assert_eq!(slot_kind(&added, "d"), SlotKind::Object);
}

#[test]
fn dropped_successors_leave_the_transition_map() {
    let root = Shape::builder().build();
    {
        let child = root.define_property("tmp", &Value::Int(1), PropertyFlags::empty());
        assert_eq!(root.transition_count(), 1);
        assert!(child.is_leaf());
    }
    assert_eq!(root.transition_count(), 0);
    let again = root.define_property("tmp", &Value::Int(1), PropertyFlags::empty());
    assert_eq!(root.transition_count(), 1);
    assert_eq!(again.property_count(), 1);
}

#[test]
fn leaf_assumption_breaks_on_first_transition() {
    let shape = Shape::builder()
        .build()
        .define_property("a", &Value::Int(1), PropertyFlags::empty());
    let leaf = shape.leaf_assumption();
    assert!(leaf.is_valid());
    let _next = shape.define_property("b", &Value::Int(1), PropertyFlags::empty());
    assert!(!leaf.is_valid());
    assert!(!shape.is_leaf());
}

#[test]
fn property_assumptions_follow_their_key() {
    let root = Shape::builder().property_assumptions(true).build();
    let x = root.property_assumption(&key("x"));
    assert!(x.is_valid());
    assert!(x.ptr_eq(&root.property_assumption(&key("x"))));

    let with_y = root.define_property("y", &Value::Int(1), PropertyFlags::empty());
    assert!(x.is_valid());
    let _with_x = with_y.define_property("x", &Value::Int(1), PropertyFlags::empty());
    assert!(!x.is_valid());

    let plain = Shape::builder().build();
    assert!(!plain.property_assumption(&key("x")).is_valid());
}

#[test]
fn unrelated_trees_are_not_related() {
    let a = Shape::builder().build();
    let b = Shape::builder().build();
    let child = a.define_property("p", &Value::Int(1), PropertyFlags::empty());
    assert!(child.is_related(&a));
    assert!(!child.is_related(&b));
}

#[test]
fn obsolescence_replaces_the_generalized_shape() {
    let layout = Layout::builder().obsolescence(true).build();
    let root = Shape::builder().layout(layout).build();
    let s1 = root.define_property("x", &Value::Int(1), PropertyFlags::empty());
    let s2 = s1.define_property("y", &Value::Int(2), PropertyFlags::empty());

    let mut stale = DynamicObject::new(s2.clone());
    stale.put(&key("x"), 1).unwrap();
    stale.put(&key("y"), 2).unwrap();

    let mut object = DynamicObject::new(s2.clone());
    object.put(&key("x"), 1).unwrap();
    object.put(&key("y"), 2).unwrap();
    object.put(&key("x"), 1.5).unwrap();

    let replacement = object.shape().clone();
    assert!(!s2.is_valid());
    assert!(!s2.valid_assumption().is_valid());
    assert!(s1.is_valid());
    assert_eq!(s2.obsoleted_by(), Some(&replacement));
    assert_eq!(s2.ensure_valid(), replacement);
    assert_eq!(replacement.keys_filtered(true), [key("x"), key("y")]);
    assert_eq!(slot_kind(&replacement, "x"), SlotKind::Double);
    assert_eq!(object.get(&key("x")), Some(Value::Double(1.5)));
    assert_eq!(object.get(&key("y")), Some(Value::Int(2)));

    // Reads on an obsolete shape still see the old layout.
    assert_eq!(stale.get(&key("x")), Some(Value::Int(1)));
    assert!(stale.update_shape());
    assert_eq!(stale.shape(), &replacement);
    assert_eq!(stale.get(&key("x")), Some(Value::Double(1.0)));
    assert_eq!(stale.get(&key("y")), Some(Value::Int(2)));
    assert!(!stale.update_shape());
}

#[test]
fn descendants_of_obsolete_shapes_migrate() {
    let layout = Layout::builder().obsolescence(true).build();
    let root = Shape::builder().layout(layout).build();
    let s1 = root.define_property("x", &Value::Int(1), PropertyFlags::empty());
    let s2 = s1.define_property("y", &Value::string("y"), PropertyFlags::empty());
    let s3 = s2.set_dynamic_type(DynamicType(4));

    let generalized = s1.define_property("x", &Value::Long(7), PropertyFlags::empty());
    assert!(!s1.is_valid());
    assert!(!s3.is_valid());
    let migrated = s3.ensure_valid();
    assert!(migrated.is_valid());
    assert!(migrated.is_related(&generalized));
    assert_eq!(migrated.dynamic_type(), DynamicType(4));
    assert_eq!(slot_kind(&migrated, "x"), SlotKind::Long);
    assert_eq!(migrated.keys_filtered(true), [key("x"), key("y")]);
}

#[test]
fn transitions_from_obsolete_shapes_start_from_the_replacement() {
    let layout = Layout::builder().obsolescence(true).build();
    let root = Shape::builder().layout(layout).build();
    let mut stale = DynamicObject::new(root.clone());
    stale.put(&key("x"), 1).unwrap();
    stale.put(&key("y"), 2).unwrap();
    let s1 = root.define_property("x", &Value::Int(1), PropertyFlags::empty());
    let s1y = s1.define_property("y", &Value::Int(2), PropertyFlags::empty());
    assert_eq!(stale.shape(), &s1y);

    let generalized = s1.define_property("x", &Value::Long(7), PropertyFlags::empty());
    assert!(!s1.is_valid());
    assert!(!s1y.is_valid());

    let typed = s1.set_dynamic_type(DynamicType(5));
    assert!(typed.is_valid());
    assert!(typed.is_related(&generalized));
    assert_eq!(typed.dynamic_type(), DynamicType(5));
    assert_eq!(slot_kind(&typed, "x"), SlotKind::Long);

    let z = Property::new(
        key("z"),
        s1y.allocator().location_for_value(&Value::Int(0)),
        PropertyFlags::empty(),
    );
    let added = s1y.add_property(z);
    assert!(added.is_valid());
    assert_eq!(added.keys_filtered(true), [key("x"), key("y"), key("z")]);
    assert_eq!(slot_kind(&added, "x"), SlotKind::Long);

    let removed = s1y.remove_property(s1y.get_property(&key("y")).unwrap());
    assert!(removed.is_valid());
    assert_eq!(removed.keys_filtered(true), [key("x")]);
    assert_eq!(slot_kind(&removed, "x"), SlotKind::Long);

    let flagged = s1.set_flags(2);
    assert!(flagged.is_valid());
    assert_eq!(flagged.flags(), 2);
    assert!(s1.make_shared().is_valid());

    assert!(stale.set_dynamic_type(DynamicType(5)));
    assert!(stale.shape().is_valid());
    assert_eq!(slot_kind(stale.shape(), "x"), SlotKind::Long);
    assert_eq!(stale.get(&key("x")), Some(Value::Long(1)));
    assert_eq!(stale.get(&key("y")), Some(Value::Int(2)));
}
