//! Collision-test registration and per-tick dispatch.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bevy_ecs::entity::Entity;
use grove_map::{
    Bounds, CollisionMode, CollisionTest, CustomEntityDesc, EntityType, Layer, MapWorld, ScriptCall, ScriptError,
    ScriptRef, ScriptTable, SimConfig,
};
use rstest::rstest;

/// Callback counting its invocations.
fn counter(scripts: &mut ScriptTable) -> (ScriptRef, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let func = scripts.callback(move |_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    });
    (func, count)
}

fn custom(map: &mut MapWorld, name: &str, bounds: Bounds) -> Entity {
    map.add_custom_entity(CustomEntityDesc::new(name, Layer::Low, bounds))
        .unwrap()
}

fn run_ticks(map: &mut MapWorld, ticks: usize) {
    for _ in 0..ticks {
        map.tick();
    }
}

#[test]
fn test_duplicate_registration_fires_twice() {
    let mut scripts = ScriptTable::new();
    let (callback, count) = counter(&mut scripts);
    let mut map = MapWorld::with_scripts(SimConfig::default(), scripts).unwrap();
    let a = custom(&mut map, "a", Bounds::new(0, 0, 16, 16));
    map.spawn_entity(EntityType::Npc, "b", Layer::Low, Bounds::new(8, 8, 16, 16))
        .unwrap();

    map.add_collision_test(a, CollisionMode::Overlapping, callback)
        .unwrap();
    map.add_collision_test(a, CollisionMode::Overlapping, callback)
        .unwrap();
    map.tick();

    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn test_callback_receives_subject_other_and_test() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let mut scripts = ScriptTable::new();
    let callback = scripts.callback(move |call, _| {
        if let ScriptCall::Collision { subject, other, test } = call {
            log.lock()
                .unwrap()
                .push((subject.name.clone(), other.name.clone(), *test));
        }
        Ok(false)
    });
    let mut map = MapWorld::with_scripts(SimConfig::default(), scripts).unwrap();
    let a = custom(&mut map, "a", Bounds::new(0, 0, 32, 32));
    map.spawn_entity(EntityType::Npc, "inside", Layer::Low, Bounds::new(8, 8, 8, 8))
        .unwrap();
    map.spawn_entity(EntityType::Npc, "across", Layer::Low, Bounds::new(24, 24, 16, 16))
        .unwrap();
    map.add_collision_test(a, CollisionMode::Containing, callback)
        .unwrap();
    map.tick();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(
            "a".to_string(),
            "inside".to_string(),
            CollisionTest::BuiltIn(CollisionMode::Containing)
        )]
    );
}

#[test]
fn test_edge_triggered_custom_test() {
    let positive = Arc::new(AtomicBool::new(true));
    let flag = positive.clone();
    let mut scripts = ScriptTable::new();
    let predicate = scripts.predicate(move |_| Ok(flag.load(Ordering::SeqCst)));
    let (callback, count) = counter(&mut scripts);
    let mut map = MapWorld::with_scripts(SimConfig::default(), scripts).unwrap();
    let a = custom(&mut map, "a", Bounds::new(0, 0, 16, 16));
    map.spawn_entity(EntityType::Npc, "far away", Layer::Low, Bounds::new(200, 200, 16, 16))
        .unwrap();
    map.add_collision_test(a, CollisionTest::Custom(predicate), callback)
        .unwrap();

    run_ticks(&mut map, 5);
    assert_eq!(count.load(Ordering::SeqCst), 1);

    positive.store(false, Ordering::SeqCst);
    map.tick();
    positive.store(true, Ordering::SeqCst);
    run_ticks(&mut map, 3);
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[rstest]
#[case(false, 4)]
#[case(true, 1)]
fn test_sprite_test_fires_every_tick_unless_configured(#[case] edge_triggered: bool, #[case] expected: usize) {
    let mut scripts = ScriptTable::new();
    let (callback, count) = counter(&mut scripts);
    let config = SimConfig {
        sprite_collisions_edge_triggered: edge_triggered,
        ..Default::default()
    };
    let mut map = MapWorld::with_scripts(config, scripts).unwrap();
    let a = custom(&mut map, "a", Bounds::new(0, 0, 16, 16));
    map.spawn_entity(EntityType::Npc, "b", Layer::Low, Bounds::new(8, 0, 16, 16))
        .unwrap();
    map.add_collision_test(a, CollisionMode::Sprite, callback)
        .unwrap();

    run_ticks(&mut map, 4);
    assert_eq!(count.load(Ordering::SeqCst), expected);
}

#[test]
fn test_failing_predicate_does_not_abort_the_sweep() {
    let mut scripts = ScriptTable::new();
    let failing = scripts.predicate(|_| Err(ScriptError::new("boom")));
    let (never, never_count) = counter(&mut scripts);
    let (after, after_count) = counter(&mut scripts);
    let mut map = MapWorld::with_scripts(SimConfig::default(), scripts).unwrap();
    let a = custom(&mut map, "a", Bounds::new(0, 0, 16, 16));
    map.spawn_entity(EntityType::Npc, "b", Layer::Low, Bounds::new(8, 8, 16, 16))
        .unwrap();
    map.add_collision_test(a, CollisionTest::Custom(failing), never)
        .unwrap();
    map.add_collision_test(a, CollisionMode::Overlapping, after)
        .unwrap();

    map.tick();

    assert_eq!(never_count.load(Ordering::SeqCst), 0);
    assert_eq!(after_count.load(Ordering::SeqCst), 1);
    assert_eq!(map.script_failures().len(), 1);
    assert_eq!(map.script_failures()[0].entity, "a");
    assert_eq!(map.script_failures()[0].message, "boom");
}

#[test]
fn test_removal_during_sweep() {
    let mut scripts = ScriptTable::new();
    let remove_other = scripts.callback(|call, commands| {
        if let ScriptCall::Collision { other, .. } = call {
            commands.remove(other.entity);
        }
        Ok(false)
    });
    let (a_second, a_second_count) = counter(&mut scripts);
    let (b_callback, b_count) = counter(&mut scripts);
    let mut map = MapWorld::with_scripts(SimConfig::default(), scripts).unwrap();

    let a = custom(&mut map, "a", Bounds::new(0, 0, 16, 16));
    let b = custom(&mut map, "b", Bounds::new(8, 8, 16, 16));
    map.add_collision_test(a, CollisionMode::Overlapping, remove_other)
        .unwrap();
    map.add_collision_test(a, CollisionMode::Overlapping, a_second)
        .unwrap();
    map.add_collision_test(b, CollisionMode::Overlapping, b_callback)
        .unwrap();

    map.tick();

    assert_eq!(a_second_count.load(Ordering::SeqCst), 0);
    assert_eq!(b_count.load(Ordering::SeqCst), 0);
    assert!(!map.exists(b));
    assert!(map.exists(a));

    // The map keeps running without the removed entity.
    map.tick();
    assert_eq!(a_second_count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_clear_requested_by_a_callback_waits_for_the_sweep() {
    let mut scripts = ScriptTable::new();
    let clear_self = scripts.callback(|call, commands| {
        if let ScriptCall::Collision { subject, .. } = call {
            commands.clear_collision_tests(subject.entity);
        }
        Ok(false)
    });
    let (second, second_count) = counter(&mut scripts);
    let mut map = MapWorld::with_scripts(SimConfig::default(), scripts).unwrap();
    let a = custom(&mut map, "a", Bounds::new(0, 0, 16, 16));
    map.spawn_entity(EntityType::Npc, "b", Layer::Low, Bounds::new(8, 8, 16, 16))
        .unwrap();
    map.add_collision_test(a, CollisionMode::Overlapping, clear_self)
        .unwrap();
    map.add_collision_test(a, CollisionMode::Overlapping, second)
        .unwrap();

    map.tick();
    assert_eq!(second_count.load(Ordering::SeqCst), 1);
    assert!(map.custom(a).unwrap().collision_tests().is_empty());
}

#[test]
fn test_layer_independent_collisions() {
    let mut scripts = ScriptTable::new();
    let (callback, count) = counter(&mut scripts);
    let mut map = MapWorld::with_scripts(SimConfig::default(), scripts).unwrap();
    let a = custom(&mut map, "a", Bounds::new(0, 0, 16, 16));
    map.spawn_entity(EntityType::Npc, "above", Layer::High, Bounds::new(0, 0, 16, 16))
        .unwrap();
    map.add_collision_test(a, CollisionMode::Overlapping, callback)
        .unwrap();

    map.tick();
    assert_eq!(count.load(Ordering::SeqCst), 0);

    map.set_layer_independent_collisions(a, true).unwrap();
    map.tick();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_disabled_and_suspended_entities_are_skipped() {
    let mut scripts = ScriptTable::new();
    let (callback, count) = counter(&mut scripts);
    let mut map = MapWorld::with_scripts(SimConfig::default(), scripts).unwrap();
    let a = custom(&mut map, "a", Bounds::new(0, 0, 16, 16));
    let b = map
        .spawn_entity(EntityType::Npc, "b", Layer::Low, Bounds::new(0, 0, 16, 16))
        .unwrap();
    map.add_collision_test(a, CollisionMode::Overlapping, callback)
        .unwrap();

    map.set_enabled(b, false).unwrap();
    map.tick();
    map.set_enabled(b, true).unwrap();
    map.set_suspended(b, true).unwrap();
    map.tick();
    assert_eq!(count.load(Ordering::SeqCst), 0);

    map.set_suspended(b, false).unwrap();
    map.tick();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_detector_forwards_to_custom_tests() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let mut scripts = ScriptTable::new();
    let callback = scripts.callback(move |call, _| {
        if let ScriptCall::Collision { other, .. } = call {
            log.lock().unwrap().push(other.kind);
        }
        Ok(false)
    });
    let mut map = MapWorld::with_scripts(SimConfig::default(), scripts).unwrap();
    map.spawn_entity(EntityType::Sensor, "sensor", Layer::Low, Bounds::new(0, 0, 64, 64))
        .unwrap();
    let a = custom(&mut map, "a", Bounds::new(16, 16, 16, 16));
    map.add_collision_test(a, CollisionMode::Overlapping, callback)
        .unwrap();

    run_ticks(&mut map, 3);
    assert_eq!(*seen.lock().unwrap(), vec![EntityType::Sensor]);
}
