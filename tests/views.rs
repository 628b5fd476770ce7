// View composition: intersections, exclusions, optional lookups, rebinding.

use kestrel_ecs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Dummy;

/// e0{int,float}, e1{int,float}, e2{int,dummy}
fn sample_world() -> (World, Entity, Entity, Entity) {
    let mut world = World::new();
    let e0 = world.insert((0i32, 0.5f32));
    let e1 = world.insert((1i32, 1.5f32));
    let e2 = world.insert((2i32, Dummy));
    (world, e0, e1, e2)
}

#[test]
fn view_intersects_included_and_drops_excluded() {
    let (mut world, e0, e1, e2) = sample_world();

    let view = world
        .query()
        .include::<(i32,)>()
        .exclude::<(Dummy,)>()
        .optional::<(f32,)>()
        .view();

    let visited: Vec<Entity> = view.iter().collect();
    assert_eq!(visited, vec![e0, e1]);

    assert!(view.contains(e0));
    assert!(!view.contains(e2));

    let (float,) = view.get_optional(e0);
    assert_eq!(float.copied(), Some(0.5));
    let (float,) = view.get_optional(e2);
    assert!(float.is_none());
}

#[test]
fn multi_include_visits_the_intersection() {
    let (mut world, e0, e1, e2) = sample_world();

    let view = world.query().include::<(i32, f32)>().view();
    let visited: Vec<Entity> = view.iter().collect();

    assert!(visited.contains(&e0));
    assert!(visited.contains(&e1));
    assert!(!visited.contains(&e2));

    let (int, float) = view.get(e1);
    assert_eq!(*int, 1);
    assert_eq!(*float, 1.5);
    assert!(view.try_get(e2).is_none());
}

#[test]
fn absent_optional_storage_reads_as_none() {
    let mut world = World::new();
    let entity = world.insert((1i32,));

    // No u64 storage was ever created.
    let view = world
        .query()
        .include::<(i32,)>()
        .optional::<(u64,)>()
        .view();

    assert!(view.contains(entity));
    let (missing,) = view.get_optional(entity);
    assert!(missing.is_none());
}

#[test]
fn for_each_passes_components_and_optionals() {
    let (mut world, e0, _e1, e2) = sample_world();

    let view = world
        .query()
        .include::<(i32,)>()
        .exclude::<(Dummy,)>()
        .optional::<(f32,)>()
        .view();

    let mut count = 0;
    view.for_each(|entity, (int, ), (float,)| {
        assert_ne!(entity, e2);
        if entity == e0 {
            assert_eq!(*int, 0);
            assert_eq!(float.copied(), Some(0.5));
        }
        count += 1;
    });
    assert_eq!(count, 2);
}

#[test]
fn for_each_while_terminates_on_false() {
    let (mut world, _e0, _e1, _e2) = sample_world();

    let view = world.query().include::<(i32,)>().view();
    assert_eq!(view.size_hint(), 3);

    let mut visited = 0;
    view.for_each_while(|_, _, ()| {
        visited += 1;
        false
    });
    assert_eq!(visited, 1);
}

#[test]
fn main_set_is_the_smallest_and_can_be_rebound() {
    let (mut world, _e0, _e1, _e2) = sample_world();

    // f32 has 2 entries, i32 has 3: the f32 set drives iteration.
    let view = world.query().include::<(i32, f32)>().view();
    assert_eq!(view.size_hint(), 2);

    let view = view.rebind::<i32>();
    assert_eq!(view.size_hint(), 3);

    // Rebinding never changes the visited set, only the driving order.
    let visited: Vec<Entity> = view.iter().collect();
    assert_eq!(visited.len(), 2);
}

#[test]
fn degenerate_single_include_walks_the_dense_array() {
    let mut world = World::new();
    let entities: Vec<Entity> = (0..4).map(|i| world.insert((i as i32,))).collect();

    let view = world.view::<(i32,)>();
    let visited: Vec<Entity> = view.iter().collect();
    assert_eq!(visited, entities);

    let mut sum = 0;
    view.for_each(|_, (value,), ()| sum += *value);
    assert_eq!(sum, 0 + 1 + 2 + 3);
}

#[test]
fn required_membership_filters_without_capturing() {
    let (mut world, e0, e1, e2) = sample_world();
    let _ = (e0, e1);

    let view = world
        .query()
        .include::<(i32,)>()
        .require::<(Dummy,)>()
        .view();

    let visited: Vec<Entity> = view.iter().collect();
    assert_eq!(visited, vec![e2]);
}

#[test]
fn view_reflects_mutations_between_iterations() {
    let mut world = World::new();
    let entity = world.insert((1i32,));

    {
        let view = world.view::<(i32,)>();
        assert!(view.contains(entity));
    }

    world.erase::<i32>(entity);

    {
        let view = world.view::<(i32,)>();
        assert!(!view.contains(entity));
        assert!(view.is_empty());
    }
}

#[test]
fn views_over_fixed_storages_skip_holes() {
    let mut world = World::new();
    world.reserve_with::<i32>(StorageOptions {
        discipline: StorageDiscipline::Fixed,
        ..StorageOptions::default()
    });

    let e0 = world.insert((0i32,));
    let e1 = world.insert((1i32,));
    let e2 = world.insert((2i32,));
    world.erase::<i32>(e1);

    let view = world.view::<(i32,)>();
    // The hole still counts toward the upper bound.
    assert_eq!(view.size_hint(), 3);
    let visited: Vec<Entity> = view.iter().collect();
    assert_eq!(visited, vec![e0, e2]);
}
