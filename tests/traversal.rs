//! Traversal rules and ground overrides as seen through `MapWorld`.

use grove_map::{
    Bounds, CustomEntityDesc, EntityError, EntityType, Ground, GroundGrid, Layer, MapWorld, PredicateCall,
    ScriptError, ScriptTable, SimConfig, TraversableRule,
};
use rstest::rstest;

fn map_with(scripts: ScriptTable) -> MapWorld {
    let mut map = MapWorld::with_scripts(SimConfig::default(), scripts).unwrap();
    map.set_ground_grid(GroundGrid::new(20, 20, 16));
    map
}

fn spawn_mover(map: &mut MapWorld, kind: EntityType, bounds: Bounds) -> bevy_ecs::entity::Entity {
    match kind {
        EntityType::CustomEntity => map
            .add_custom_entity(CustomEntityDesc::new("mover", Layer::Low, bounds))
            .unwrap(),
        EntityType::Bomb => map.spawn_bomb("mover", Layer::Low, bounds.x + 8, bounds.y + 13),
        EntityType::Explosion => map.spawn_explosion(Layer::Low, bounds.x + 8, bounds.y + 8),
        EntityType::Fire => map.spawn_fire(Layer::Low, bounds.x + 8, bounds.y + 8),
        EntityType::Stream => map.spawn_stream("mover", Layer::Low, bounds, 1, 0),
        kind => map.spawn_entity(kind, "mover", Layer::Low, bounds).unwrap(),
    }
}

#[rstest]
fn test_set_then_reset_per_type(
    #[values(
        EntityType::Hero,
        EntityType::Npc,
        EntityType::Enemy,
        EntityType::Block,
        EntityType::Chest,
        EntityType::Sensor,
        EntityType::Bomb,
        EntityType::Explosion,
        EntityType::Fire,
        EntityType::Stream,
        EntityType::CustomEntity
    )]
    kind: EntityType,
) {
    let mut map = map_with(ScriptTable::new());
    let wall = map
        .add_custom_entity(CustomEntityDesc::new("wall", Layer::Low, Bounds::new(64, 64, 32, 32)))
        .unwrap();
    let mover = spawn_mover(&mut map, kind, Bounds::new(64, 64, 16, 16));

    let before = map.is_obstacle_for(wall, mover).unwrap();

    map.set_traversable_by(wall, Some(kind), TraversableRule::Fixed(false))
        .unwrap();
    assert!(map.is_obstacle_for(wall, mover).unwrap());

    map.reset_traversable_by(wall, Some(kind)).unwrap();
    assert_eq!(map.is_obstacle_for(wall, mover).unwrap(), before);
}

#[test]
fn test_type_rule_wins_over_general_rule() {
    let mut map = map_with(ScriptTable::new());
    let gate = map
        .add_custom_entity(CustomEntityDesc::new("gate", Layer::Low, Bounds::new(64, 64, 32, 32)))
        .unwrap();
    let hero = spawn_mover(&mut map, EntityType::Hero, Bounds::new(64, 64, 16, 16));
    let npc = spawn_mover(&mut map, EntityType::Npc, Bounds::new(70, 70, 16, 16));

    map.set_traversable_by(gate, None, TraversableRule::Fixed(true))
        .unwrap();
    map.set_traversable_by(gate, Some(EntityType::Hero), TraversableRule::Fixed(false))
        .unwrap();

    assert!(map.is_obstacle_for(gate, hero).unwrap());
    assert!(!map.is_obstacle_for(gate, npc).unwrap());
}

#[test]
fn test_can_traverse_rule_of_the_mover() {
    let mut map = map_with(ScriptTable::new());
    let ghost = map
        .add_custom_entity(CustomEntityDesc::new("ghost", Layer::Low, Bounds::new(64, 64, 16, 16)))
        .unwrap();
    let block = spawn_mover(&mut map, EntityType::Block, Bounds::new(72, 64, 16, 16));

    assert!(map.is_obstacle_for(block, ghost).unwrap());
    map.set_can_traverse(ghost, Some(EntityType::Block), TraversableRule::Fixed(true))
        .unwrap();
    assert!(!map.is_obstacle_for(block, ghost).unwrap());
    map.reset_can_traverse(ghost, Some(EntityType::Block)).unwrap();
    assert!(map.is_obstacle_for(block, ghost).unwrap());
}

#[test]
fn test_obstacle_rule_takes_precedence_over_mover_rule() {
    let mut map = map_with(ScriptTable::new());
    let a = map
        .add_custom_entity(CustomEntityDesc::new("a", Layer::Low, Bounds::new(64, 64, 16, 16)))
        .unwrap();
    let b = map
        .add_custom_entity(CustomEntityDesc::new("b", Layer::Low, Bounds::new(72, 64, 16, 16)))
        .unwrap();

    map.set_can_traverse(a, Some(EntityType::CustomEntity), TraversableRule::Fixed(true))
        .unwrap();
    assert!(!map.is_obstacle_for(b, a).unwrap());

    map.set_traversable_by(b, Some(EntityType::CustomEntity), TraversableRule::Fixed(false))
        .unwrap();
    assert!(map.is_obstacle_for(b, a).unwrap());
}

#[test]
fn test_script_rule_receives_both_entities() {
    let mut scripts = ScriptTable::new();
    let only_named_key = scripts.predicate(|call| match call {
        PredicateCall::Traversable { candidate, .. } => Ok(candidate.name == "key"),
        _ => Ok(false),
    });
    let mut map = map_with(scripts);
    let door = map
        .add_custom_entity(CustomEntityDesc::new("door", Layer::Low, Bounds::new(64, 64, 32, 32)))
        .unwrap();
    let key = map
        .spawn_entity(EntityType::Npc, "key", Layer::Low, Bounds::new(64, 64, 8, 8))
        .unwrap();
    let thief = map
        .spawn_entity(EntityType::Npc, "thief", Layer::Low, Bounds::new(72, 72, 8, 8))
        .unwrap();

    map.set_traversable_by(door, None, TraversableRule::Script(only_named_key))
        .unwrap();
    assert!(!map.is_obstacle_for(door, key).unwrap());
    assert!(map.is_obstacle_for(door, thief).unwrap());
}

#[test]
fn test_failing_rule_blocks_and_is_reported() {
    let mut scripts = ScriptTable::new();
    let broken = scripts.predicate(|_| Err(ScriptError::new("attempt to index a nil value")));
    let mut map = map_with(scripts);
    let door = map
        .add_custom_entity(CustomEntityDesc::new("door", Layer::Low, Bounds::new(64, 64, 32, 32)))
        .unwrap();
    let explosion = map.spawn_explosion(Layer::Low, 80, 80);

    map.set_traversable_by(door, Some(EntityType::Explosion), TraversableRule::Script(broken))
        .unwrap();
    assert!(map.is_obstacle_for(door, explosion).unwrap());
    assert_eq!(map.script_failures().len(), 1);
    assert!(matches!(
        map.take_script_failures()[0].to_error(),
        EntityError::ExternalCallFailure { .. }
    ));
    assert!(map.script_failures().is_empty());
}

#[test]
fn test_entities_on_other_layers_never_block() {
    let mut map = map_with(ScriptTable::new());
    let hero = map
        .spawn_entity(EntityType::Hero, "hero", Layer::Low, Bounds::new(64, 64, 16, 16))
        .unwrap();
    let block = map
        .spawn_entity(EntityType::Block, "block", Layer::High, Bounds::new(64, 64, 16, 16))
        .unwrap();
    assert!(!map.is_obstacle_for(block, hero).unwrap());
}

#[test]
fn test_disabled_obstacle_does_not_block() {
    let mut map = map_with(ScriptTable::new());
    let hero = map
        .spawn_entity(EntityType::Hero, "hero", Layer::Low, Bounds::new(64, 64, 16, 16))
        .unwrap();
    let block = map
        .spawn_entity(EntityType::Block, "block", Layer::Low, Bounds::new(80, 64, 16, 16))
        .unwrap();

    assert!(!map.try_move(hero, 8, 0).unwrap());
    map.set_enabled(block, false).unwrap();
    assert!(!map.is_obstacle_for(block, hero).unwrap());
    assert!(map.try_move(hero, 8, 0).unwrap());
}

#[rstest]
#[case(Ground::Traversable, true)]
#[case(Ground::Empty, true)]
#[case(Ground::ShallowWater, true)]
#[case(Ground::Grass, true)]
#[case(Ground::Ice, true)]
#[case(Ground::Ladder, true)]
#[case(Ground::Wall, false)]
#[case(Ground::WallTopRight, false)]
#[case(Ground::LowWall, false)]
#[case(Ground::DeepWater, false)]
#[case(Ground::Hole, false)]
#[case(Ground::Lava, false)]
#[case(Ground::Prickles, false)]
fn test_ground_defaults(#[case] ground: Ground, #[case] traversable: bool) {
    let mut map = map_with(ScriptTable::new());
    let custom = map
        .add_custom_entity(CustomEntityDesc::new("walker", Layer::Low, Bounds::new(0, 0, 16, 16)))
        .unwrap();
    let hero = map
        .spawn_entity(EntityType::Hero, "hero", Layer::Low, Bounds::new(100, 0, 16, 16))
        .unwrap();
    assert_eq!(map.can_traverse_ground(custom, ground).unwrap(), traversable);
    assert_eq!(map.can_traverse_ground(hero, ground).unwrap(), traversable);
}

#[test]
fn test_lava_override() {
    let mut map = map_with(ScriptTable::new());
    map.set_ground_grid(
        GroundGrid::from_ascii(&["......", "..LL..", "..LL..", "......"], 16).unwrap(),
    );
    let walker = map
        .add_custom_entity(CustomEntityDesc::new("walker", Layer::Low, Bounds::new(0, 16, 16, 16)))
        .unwrap();
    let salamander = map
        .add_custom_entity(CustomEntityDesc::new("salamander", Layer::Low, Bounds::new(0, 32, 16, 16)))
        .unwrap();
    map.set_can_traverse_ground(salamander, Ground::Lava, true)
        .unwrap();

    let lava = Bounds::new(32, 16, 16, 16);
    assert!(map.collides_at(walker, lava).unwrap());
    assert!(!map.collides_at(salamander, lava).unwrap());

    assert!(!map.try_move(walker, 32, 0).unwrap());
    assert!(map.try_move(salamander, 32, 0).unwrap());
    assert_eq!(map.bounds(salamander).unwrap().x, 32);
}

#[test]
fn test_ground_modifier_changes_traversal() {
    let mut map = map_with(ScriptTable::new());
    let bridge = map
        .add_custom_entity(CustomEntityDesc::new("bridge", Layer::Low, Bounds::new(32, 0, 32, 16)))
        .unwrap();
    let hero = map
        .spawn_entity(EntityType::Hero, "hero", Layer::Low, Bounds::new(0, 0, 16, 16))
        .unwrap();
    map.set_ground_at(40, 8, Ground::DeepWater).unwrap();
    // Heroes cannot enter the bridge entity itself.
    map.set_traversable_by(bridge, Some(EntityType::Hero), TraversableRule::Fixed(true))
        .unwrap();

    assert!(map.collides_at(hero, Bounds::new(32, 0, 16, 16)).unwrap());

    map.set_modified_ground(bridge, Ground::Traversable).unwrap();
    assert!(map.is_ground_modifier(bridge).unwrap());
    assert_eq!(map.ground_at(40, 8), Ground::Traversable);
    assert!(!map.collides_at(hero, Bounds::new(32, 0, 16, 16)).unwrap());

    map.set_modified_ground(bridge, Ground::Empty).unwrap();
    assert!(matches!(
        map.modified_ground(bridge),
        Err(EntityError::UnsupportedOperation(_))
    ));
    assert_eq!(map.ground_at(40, 8), Ground::DeepWater);
}

#[test]
fn test_later_modifier_wins_over_a_recycled_slot() {
    let mut map = map_with(ScriptTable::new());
    let doomed = map
        .add_custom_entity(CustomEntityDesc::new("doomed", Layer::Low, Bounds::new(0, 0, 16, 16)))
        .unwrap();
    map.remove_entity(doomed).unwrap();

    let ice = map
        .add_custom_entity(CustomEntityDesc::new("ice", Layer::Low, Bounds::new(0, 0, 32, 32)))
        .unwrap();
    let lava = map
        .add_custom_entity(CustomEntityDesc::new("lava", Layer::Low, Bounds::new(16, 16, 32, 32)))
        .unwrap();
    assert_eq!(ice.index(), doomed.index());
    map.set_modified_ground(ice, Ground::Ice).unwrap();
    map.set_modified_ground(lava, Ground::Lava).unwrap();
    map.tick();

    assert_eq!(map.ground_at(4, 4), Ground::Ice);
    assert_eq!(map.ground_at(20, 20), Ground::Lava);
}
