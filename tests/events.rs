// Component lifecycle event dispatch: ordering, anchors, and visibility.

use std::sync::{Arc, Mutex};

use kestrel_ecs::prelude::*;

type Trace = Arc<Mutex<Vec<String>>>;

fn record(trace: &Trace, label: &str) -> impl FnMut(&mut World, Entity) + Send + 'static {
    let trace = Arc::clone(trace);
    let label = label.to_owned();
    move |_, entity| trace.lock().unwrap().push(format!("{label}:{}", entity.index()))
}

#[test]
fn create_update_remove_fire_once_in_subscription_order() {
    let trace: Trace = Default::default();
    let mut world = World::new();

    world.on_create::<i32>().subscribe(record(&trace, "create-a"));
    world.on_create::<i32>().subscribe(record(&trace, "create-b"));
    world.on_update::<i32>().subscribe(record(&trace, "update"));
    world.on_remove::<i32>().subscribe(record(&trace, "remove"));

    let entity = world.generate();
    world.emplace(entity, 1i32);
    world.replace(entity, 2i32);
    world.erase::<i32>(entity);

    let events = trace.lock().unwrap().clone();
    assert_eq!(
        events,
        vec!["create-a:0", "create-b:0", "update:0", "remove:0"]
    );
}

#[test]
fn anchored_subscription_runs_before_its_anchor() {
    let trace: Trace = Default::default();
    let mut world = World::new();

    let first = world.on_create::<i32>().subscribe(record(&trace, "first"));
    world.on_create::<i32>().subscribe(record(&trace, "last"));
    world
        .on_create::<i32>()
        .subscribe_before(first, record(&trace, "anchored"));

    let entity = world.generate();
    world.emplace(entity, 1i32);

    let events = trace.lock().unwrap().clone();
    assert_eq!(events, vec!["anchored:0", "first:0", "last:0"]);
}

#[test]
fn unsubscribed_handlers_stop_firing() {
    let trace: Trace = Default::default();
    let mut world = World::new();

    let handle = world.on_create::<i32>().subscribe(record(&trace, "gone"));
    world.on_create::<i32>().subscribe(record(&trace, "kept"));
    assert!(world.on_create::<i32>().unsubscribe(handle));
    assert!(!world.on_create::<i32>().unsubscribe(handle));

    let entity = world.generate();
    world.emplace(entity, 1i32);

    let events = trace.lock().unwrap().clone();
    assert_eq!(events, vec!["kept:0"]);
}

#[test]
fn remove_observers_still_see_the_value() {
    let seen: Arc<Mutex<Option<i32>>> = Default::default();
    let mut world = World::new();

    {
        let seen = Arc::clone(&seen);
        world.on_remove::<i32>().subscribe(move |world, entity| {
            *seen.lock().unwrap() = world.try_get::<i32>(entity).copied();
        });
    }

    let entity = world.generate();
    world.emplace(entity, 42i32);
    world.erase::<i32>(entity);

    assert_eq!(*seen.lock().unwrap(), Some(42));
    assert!(world.try_get::<i32>(entity).is_none());
}

#[test]
fn create_observers_see_the_installed_value() {
    let seen: Arc<Mutex<Option<i32>>> = Default::default();
    let mut world = World::new();

    {
        let seen = Arc::clone(&seen);
        world.on_create::<i32>().subscribe(move |world, entity| {
            *seen.lock().unwrap() = world.try_get::<i32>(entity).copied();
        });
    }

    let entity = world.generate();
    world.emplace(entity, 9i32);
    assert_eq!(*seen.lock().unwrap(), Some(9));
}

#[test]
fn handlers_may_mutate_other_storages() {
    let mut world = World::new();
    world.reserve::<f32>(4);

    world.on_create::<i32>().subscribe(|world, entity| {
        world.emplace_or_replace(entity, 1.5f32);
    });

    let entity = world.generate();
    world.emplace(entity, 1i32);
    assert_eq!(*world.get::<f32>(entity), 1.5);
}

#[test]
fn handlers_may_replace_on_the_firing_storage() {
    let trace: Trace = Default::default();
    let mut world = World::new();

    world.on_update::<i32>().subscribe(record(&trace, "update"));
    world.on_create::<i32>().subscribe(|world, entity| {
        // Non-structural update of the firing storage is the one permitted
        // self-mutation.
        world.replace(entity, 100i32);
    });

    let entity = world.generate();
    world.emplace(entity, 1i32);

    assert_eq!(*world.get::<i32>(entity), 100);
    assert_eq!(trace.lock().unwrap().clone(), vec!["update:0"]);
}

#[test]
fn subscriptions_made_during_dispatch_take_effect_afterwards() {
    let trace: Trace = Default::default();
    let mut world = World::new();

    {
        let trace = Arc::clone(&trace);
        world.on_create::<i32>().subscribe(move |world, entity| {
            trace.lock().unwrap().push(format!("outer:{}", entity.index()));
            let inner = record(&trace, "inner");
            world.on_create::<i32>().subscribe(inner);
        });
    }

    let e0 = world.generate();
    world.emplace(e0, 1i32);
    // The inner handler was added mid-dispatch and must not run for e0.
    assert_eq!(trace.lock().unwrap().clone(), vec!["outer:0"]);

    let e1 = world.generate();
    world.emplace(e1, 2i32);
    let events = trace.lock().unwrap().clone();
    assert_eq!(events, vec!["outer:0", "outer:1", "inner:1"]);
}

#[test]
fn events_survive_clear_but_not_purge() {
    let trace: Trace = Default::default();
    let mut world = World::new();
    world.on_create::<i32>().subscribe(record(&trace, "create"));

    let e0 = world.generate();
    world.emplace(e0, 1i32);
    world.clear_all();
    let e1 = world.generate();
    world.emplace(e1, 2i32);
    assert_eq!(trace.lock().unwrap().len(), 2);

    world.purge();
    let e2 = world.generate();
    world.emplace(e2, 3i32);
    assert_eq!(trace.lock().unwrap().len(), 2);
}
