//! Basic demonstration of the Grove map entity core.
//!
//! Run with: cargo run --example basic_demo

use grove_map::{
    Bounds, CollisionMode, CustomEntityDesc, EntityType, EventKind, Ground, GroundGrid, Layer, MapWorld,
    ScriptCall, ScriptTable, SimConfig, TraversableRule,
};

fn main() {
    grove_map::logging::init(true);
    println!("=== Grove - Map Entity Demo ===\n");

    let mut scripts = ScriptTable::new();
    let on_touch = scripts.callback(|call, _| {
        if let ScriptCall::Collision { subject, other, .. } = call {
            println!("  '{}' touched '{}'", subject.name, other.name);
        }
        Ok(false)
    });
    let on_ground = scripts.callback(|call, _| {
        if let ScriptCall::Event { subject, event } = call {
            println!("  '{}' now stands on {:?}", subject.name, event);
        }
        Ok(false)
    });

    let config = SimConfig {
        bomb_fuse_ticks: 60,
        ..Default::default()
    };
    let mut map = match MapWorld::with_scripts(config, scripts) {
        Ok(map) => map,
        Err(err) => {
            eprintln!("bad config: {err}");
            return;
        }
    };
    let ground = GroundGrid::from_ascii(
        &[
            "##########",
            "#........#",
            "#..~~....#",
            "#..~~..LL#",
            "#........#",
            "##########",
        ],
        16,
    );
    match ground {
        Ok(grid) => map.set_ground_grid(grid),
        Err(err) => {
            eprintln!("bad map: {err}");
            return;
        }
    }

    let hero = map
        .spawn_entity(EntityType::Hero, "hero", Layer::Low, Bounds::new(20, 20, 16, 16))
        .ok();
    let Ok(ghost) = map.add_custom_entity(CustomEntityDesc::new("ghost", Layer::Low, Bounds::new(40, 20, 16, 16)))
    else {
        return;
    };

    // The ghost walks over lava, lets the hero through and reports contacts.
    let setup = map
        .set_can_traverse_ground(ghost, Ground::Lava, true)
        .and_then(|_| map.set_traversable_by(ghost, Some(EntityType::Hero), TraversableRule::Fixed(true)))
        .and_then(|_| map.add_collision_test(ghost, CollisionMode::Overlapping, on_touch))
        .and_then(|_| map.set_event(ghost, EventKind::GroundBelowChanged, on_ground));
    if let Err(err) = setup {
        eprintln!("setup failed: {err}");
        return;
    }

    let bomb = map.spawn_bomb("bomb", Layer::Low, 100, 70);

    println!("Walking the ghost to the lava...\n");
    for _ in 0..8 {
        if let Ok(false) = map.try_move(ghost, 8, 8) {
            println!("  ghost blocked");
        }
        map.tick();
    }

    if let Some(hero) = hero {
        println!("\nMoving the hero onto the ghost...\n");
        let moved = map.try_move(hero, 20, 0);
        println!("  hero moved: {:?}", moved);
    }

    println!("\nRunning until the bomb explodes...\n");
    while map.bomb(bomb).is_some() {
        map.tick();
    }
    println!("  explosions on the map at tick {}: {}", map.current_tick(), map.count(EntityType::Explosion));

    println!("\n=== Final State (JSON) ===\n");
    match map.snapshot().to_json_pretty() {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("snapshot failed: {err}"),
    }
}
