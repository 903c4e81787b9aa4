// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use object_model::{
    AccessCache, CacheLimits, DynamicObject, DynamicType, Layout, ObjectModelError,
    PropertyFlags, PropertyKey, Shape, Value,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing_subscriber::EnvFilter;

fn key(name: &str) -> PropertyKey {
    PropertyKey::string(name)
}

/// Logs cache state changes when run with `RUST_LOG=object_model=debug`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn reads_hit_for_known_shapes() {
    let cache = AccessCache::default();
    let root = Shape::builder().build();
    let mut a = DynamicObject::new(root.clone());
    a.put(&key("x"), 1).unwrap();
    let mut b = DynamicObject::new(root.clone());
    b.put(&key("y"), 2).unwrap();
    b.put(&key("x"), "b").unwrap();

    for _ in 0..3 {
        assert_eq!(cache.get(&a, &key("x")), Some(Value::Int(1)));
        assert_eq!(cache.get(&b, &key("x")), Some(Value::string("b")));
        assert_eq!(cache.get(&DynamicObject::new(root.clone()), &key("x")), None);
    }
    assert_eq!(cache.key_count(), 1);
    assert!(cache.contains_key(&b, &key("x")));
    assert_eq!(cache.get_int(&a, &key("x"), Value::Null), Ok(1));
    assert_eq!(
        cache.get_or_default(&a, &key("z"), Value::Boolean(true)),
        Value::Boolean(true)
    );
    assert_eq!(
        cache.get_property(&b, &key("x")),
        b.get_property(&key("x")).cloned()
    );
}

#[test]
fn too_many_keys_make_the_site_generic() {
    let cache = AccessCache::default();
    let mut object = DynamicObject::new(Shape::builder().build());
    for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
        cache.put(&mut object, &key(name), i as i32).unwrap();
    }
    assert_eq!(cache.key_count(), 3);
    assert!(!cache.is_generic());

    cache.put(&mut object, &key("d"), 3).unwrap();
    assert!(cache.is_generic());
    for (i, name) in ["a", "b", "c", "d"].into_iter().enumerate() {
        assert_eq!(cache.get(&object, &key(name)), Some(Value::Int(i as i32)));
    }
    cache.put(&mut object, &key("e"), 4).unwrap();
    assert_eq!(object.get(&key("e")), Some(Value::Int(4)));
}

#[test]
fn many_shapes_fall_back_without_changing_results() {
    let cache = AccessCache::new(CacheLimits {
        shape_limit: 2,
        put_limit: 2,
        ..CacheLimits::default()
    });
    let root = Shape::builder().build();
    let mut objects: Vec<DynamicObject> = (0..6)
        .map(|i| {
            let mut object = DynamicObject::new(root.clone());
            for j in 0..i {
                object.put(&key(&format!("pad{j}")), j).unwrap();
            }
            object
        })
        .collect();
    for (i, object) in objects.iter_mut().enumerate() {
        cache.put(object, &key("v"), i as i32).unwrap();
    }
    for (i, object) in objects.iter().enumerate() {
        assert_eq!(cache.get(object, &key("v")), Some(Value::Int(i as i32)));
        assert_eq!(object.get_key_array().last(), Some(&key("v")));
    }
}

#[test]
fn cached_puts_follow_the_uncached_transitions() {
    let cache = AccessCache::default();
    let root = Shape::builder().build();
    let mut cached = DynamicObject::new(root.clone());
    let mut plain = DynamicObject::new(root);
    let values = [
        Value::Int(1),
        Value::Int(2),
        Value::Long(3),
        Value::Double(0.5),
        Value::string("s"),
        Value::Int(5),
    ];
    for value in values {
        cache.put(&mut cached, &key("x"), value.clone()).unwrap();
        plain.put(&key("x"), value.clone()).unwrap();
        assert_eq!(cached.shape(), plain.shape());
        assert_eq!(cached.get(&key("x")), Some(value));
    }
}

#[test]
fn cached_adds_are_chosen_by_value_kind() {
    let cache = AccessCache::default();
    let root = Shape::builder().build();
    let mut first = DynamicObject::new(root.clone());
    cache.put(&mut first, &key("n"), 1i64).unwrap();
    let mut second = DynamicObject::new(root.clone());
    cache.put(&mut second, &key("n"), 1).unwrap();
    assert_ne!(first.shape(), second.shape());
    assert_eq!(second.get(&key("n")), Some(Value::Int(1)));
    assert_eq!(first.get(&key("n")), Some(Value::Long(1)));
}

#[test]
fn cached_final_constants_still_fail() {
    let cache = AccessCache::default();
    let mut object = DynamicObject::new(Shape::builder().build());
    cache
        .put_constant(&mut object, &key("c"), 1, PropertyFlags::FINAL)
        .unwrap();
    cache.put(&mut object, &key("c"), 1).unwrap();
    for _ in 0..2 {
        assert!(matches!(
            cache.put(&mut object, &key("c"), 2),
            Err(ObjectModelError::IncompatibleLocation { .. })
        ));
    }
    assert_eq!(cache.get(&object, &key("c")), Some(Value::Int(1)));
}

#[test]
fn cached_final_constants_keep_their_value_under_new_flags() {
    let cache = AccessCache::default();
    let mut object = DynamicObject::new(Shape::builder().build());
    cache
        .put_constant(&mut object, &key("c"), 1, PropertyFlags::FINAL)
        .unwrap();
    let flags = PropertyFlags::FINAL | PropertyFlags::CONSTANT | PropertyFlags::user(1);
    for _ in 0..2 {
        assert!(matches!(
            cache.put_with_flags(&mut object, &key("c"), 2, flags),
            Err(ObjectModelError::IncompatibleLocation { .. })
        ));
        assert!(matches!(
            cache.put(&mut object, &key("c"), 3),
            Err(ObjectModelError::IncompatibleLocation { .. })
        ));
    }
    assert_eq!(cache.get(&object, &key("c")), Some(Value::Int(1)));
    assert!(object.get_property(&key("c")).unwrap().location().is_constant());
}

#[test]
fn cached_put_if_present_and_flags() {
    let cache = AccessCache::default();
    let mut object = DynamicObject::new(Shape::builder().build());
    assert_eq!(cache.put_if_present(&mut object, &key("p"), 1), Ok(false));
    assert_eq!(cache.put_if_present(&mut object, &key("p"), 1), Ok(false));
    assert!(!object.contains_key(&key("p")));

    cache
        .put_with_flags(&mut object, &key("p"), 1, PropertyFlags::user(4))
        .unwrap();
    assert_eq!(cache.put_if_present(&mut object, &key("p"), 2), Ok(true));
    assert_eq!(object.get(&key("p")), Some(Value::Int(2)));
    assert_eq!(
        object.get_property(&key("p")).unwrap().flags(),
        PropertyFlags::user(4)
    );

    assert!(cache.set_property_flags(&mut object, &key("p"), PropertyFlags::user(5)));
    assert!(cache.set_property_flags(&mut object, &key("p"), PropertyFlags::user(5)));
    assert!(!cache.set_property_flags(&mut object, &key("q"), PropertyFlags::user(5)));
    assert_eq!(
        object.get_property(&key("p")).unwrap().flags(),
        PropertyFlags::user(5)
    );
}

#[test]
fn cached_removals_compact_every_object() {
    let cache = AccessCache::default();
    let root = Shape::builder().build();
    let mut objects: Vec<DynamicObject> = (0..4)
        .map(|i| {
            let mut object = DynamicObject::new(root.clone());
            object.put(&key("x"), i).unwrap();
            object.put(&key("y"), i * 10).unwrap();
            object.put(&key("z"), i * 100).unwrap();
            object
        })
        .collect();
    for object in &mut objects {
        assert!(cache.remove_key(object, &key("y")));
        assert!(!cache.remove_key(object, &key("y")));
    }
    let shape = objects[0].shape().clone();
    for (i, object) in objects.iter().enumerate() {
        let i = i as i32;
        assert_eq!(object.shape(), &shape);
        assert_eq!(object.get(&key("x")), Some(Value::Int(i)));
        assert_eq!(object.get(&key("z")), Some(Value::Int(i * 100)));
        assert_eq!(object.get(&key("y")), None);
    }
}

#[test]
fn cached_shape_changes() {
    let cache = AccessCache::default();
    let root = Shape::builder().build();
    let mut objects: Vec<DynamicObject> = (0..5)
        .map(|i| {
            let mut object = DynamicObject::new(root.clone());
            object.put(&key(&format!("k{i}")), i).unwrap();
            object
        })
        .collect();
    for object in &mut objects {
        assert!(cache.set_dynamic_type(object, DynamicType(8)));
        assert!(!cache.set_dynamic_type(object, DynamicType(8)));
        assert!(cache.set_shape_flags(object, 0x2));
        assert!(cache.mark_shared(object));
        assert!(!cache.mark_shared(object));
    }
    for (i, object) in objects.iter().enumerate() {
        assert_eq!(object.get_dynamic_type(), DynamicType(8));
        assert_eq!(object.get_shape_flags(), 0x2);
        assert!(object.is_shared());
        assert_eq!(
            object.get(&key(&format!("k{i}"))),
            Some(Value::Int(i as i32))
        );
    }
}

#[test]
fn obsolete_shapes_are_not_served_from_the_cache() {
    let layout = Layout::builder().obsolescence(true).build();
    let root = Shape::builder().layout(layout).build();
    let cache = AccessCache::default();

    let mut stale = DynamicObject::new(root.clone());
    cache.put(&mut stale, &key("x"), 1).unwrap();
    cache.put(&mut stale, &key("y"), 2).unwrap();
    assert_eq!(cache.get(&stale, &key("x")), Some(Value::Int(1)));

    let mut object = DynamicObject::new(root);
    cache.put(&mut object, &key("x"), 1).unwrap();
    cache.put(&mut object, &key("y"), 2).unwrap();
    cache.put(&mut object, &key("x"), 2.5).unwrap();
    assert!(!stale.shape().is_valid());

    assert_eq!(cache.get(&stale, &key("x")), Some(Value::Int(1)));
    cache.put(&mut stale, &key("y"), 3).unwrap();
    assert_eq!(stale.shape(), object.shape());
    assert_eq!(cache.get(&stale, &key("x")), Some(Value::Double(1.0)));
    assert_eq!(cache.get(&stale, &key("y")), Some(Value::Int(3)));
}

const KEYS: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

fn random_value(rng: &mut StdRng) -> Value {
    match rng.random_range(0..6) {
        0 | 1 => Value::Int(rng.random_range(-1000..1000)),
        2 => Value::Long(rng.random()),
        3 => Value::Double(rng.random_range(-1000..1000) as f64 / 8.0),
        4 => Value::Boolean(rng.random()),
        _ => Value::string(KEYS[rng.random_range(0..KEYS.len())]),
    }
}

/// Runs the same random operations through access caches and through the
/// uncached paths, checking both against a map.
#[test]
fn random_churn_matches_a_map() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    // Without implicit casts every value reads back with the kind it was
    // written with.
    let layout = Layout::builder()
        .object_fields(2)
        .primitive_fields(2)
        .implicit_cast_int_to_long(false)
        .implicit_cast_int_to_double(false)
        .build();
    let roots = [
        Shape::builder().layout(layout).build(),
        Shape::builder().layout(layout).build(),
    ];
    let shared_site = AccessCache::default();
    let key_sites: HashMap<&str, AccessCache> =
        KEYS.iter().map(|name| (*name, AccessCache::default())).collect();

    let mut cached: Vec<DynamicObject> = Vec::new();
    let mut plain: Vec<DynamicObject> = Vec::new();
    let mut models: Vec<HashMap<&str, Value>> = Vec::new();
    for i in 0..8 {
        let root = &roots[i % roots.len()];
        cached.push(DynamicObject::new(root.clone()));
        plain.push(DynamicObject::new(root.clone()));
        models.push(HashMap::new());
    }

    for step in 0..5000 {
        let i = rng.random_range(0..cached.len());
        let name = KEYS[rng.random_range(0..KEYS.len())];
        let k = key(name);
        let site = if rng.random_bool(0.5) {
            &shared_site
        } else {
            &key_sites[name]
        };
        let (object, reference, model) = (&mut cached[i], &mut plain[i], &mut models[i]);
        match rng.random_range(0..10) {
            0..=3 => {
                let value = random_value(&mut rng);
                site.put(object, &k, value.clone()).unwrap();
                reference.put(&k, value.clone()).unwrap();
                model.insert(name, value);
            }
            4 => {
                let value = random_value(&mut rng);
                let present = site.put_if_present(object, &k, value.clone()).unwrap();
                assert_eq!(reference.put_if_present(&k, value.clone()), Ok(present));
                assert_eq!(present, model.contains_key(name), "step {step}");
                if present {
                    model.insert(name, value);
                }
            }
            5 => {
                let flags = PropertyFlags::user(rng.random_range(0..3));
                let value = random_value(&mut rng);
                site.put_with_flags(object, &k, value.clone(), flags).unwrap();
                reference.put_with_flags(&k, value.clone(), flags).unwrap();
                model.insert(name, value);
            }
            6 => {
                let removed = site.remove_key(object, &k);
                assert_eq!(reference.remove_key(&k), removed);
                assert_eq!(model.remove(name).is_some(), removed, "step {step}");
            }
            7 => {
                let dynamic_type = DynamicType(rng.random_range(0..3));
                let changed = site.set_dynamic_type(object, dynamic_type);
                assert_eq!(reference.set_dynamic_type(dynamic_type), changed);
            }
            _ => {
                let expected = model.get(name).cloned();
                assert_eq!(site.get(object, &k), expected, "step {step}");
                assert_eq!(reference.get(&k), expected, "step {step}");
                assert_eq!(site.contains_key(object, &k), expected.is_some());
            }
        }
        assert_eq!(object.shape(), reference.shape(), "step {step}");
        assert_eq!(object.shape().property_count(), model.len(), "step {step}");
    }

    assert!(shared_site.is_generic());
    for ((object, reference), model) in cached.iter().zip(&plain).zip(&models) {
        for name in KEYS {
            assert_eq!(object.get(&key(name)), model.get(name).cloned());
            assert_eq!(reference.get(&key(name)), model.get(name).cloned());
        }
    }
}
