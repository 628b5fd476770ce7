#![allow(dead_code)]

use kestrel_ecs::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub const ENTITIES_SMALL: usize = 1_000;
pub const ENTITIES_MED: usize = 10_000;

#[derive(Clone, Copy, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Clone, Copy, Default)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Clone, Copy)]
pub struct Frozen;

/// Spawns `count` entities with positions; every other entity also gets a
/// velocity, every fourth a `Frozen` tag. Insertion order is shuffled so
/// dense layouts do not accidentally correlate with entity indices.
pub fn populate(world: &mut World, count: usize) -> Vec<Entity> {
    let mut order: Vec<usize> = (0..count).collect();
    order.shuffle(&mut StdRng::seed_from_u64(0x5eed));

    let mut entities = Vec::with_capacity(count);
    world.reserve::<Position>(count);
    world.reserve::<Velocity>(count / 2 + 1);

    for i in order {
        let position = Position {
            x: i as f32,
            y: 0.0,
            z: 0.0,
        };
        let entity = world.insert((position,));
        if i % 2 == 0 {
            world.emplace(
                entity,
                Velocity {
                    x: 1.0,
                    y: 0.0,
                    z: 0.0,
                },
            );
        }
        if i % 4 == 0 {
            world.emplace(entity, Frozen);
        }
        entities.push(entity);
    }
    entities
}
