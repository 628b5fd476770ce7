use criterion::*;
use std::hint::black_box;

mod common;
use common::*;

use kestrel_ecs::prelude::*;
use rayon::prelude::*;

fn churn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn");

    group.bench_function("generate_release_10k", |b| {
        b.iter_batched(
            World::new,
            |mut world| {
                let entities: Vec<Entity> = (0..ENTITIES_MED).map(|_| world.generate()).collect();
                for entity in entities {
                    world.release(entity);
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("emplace_erase_1k", |b| {
        b.iter_batched(
            || {
                let mut world = World::new();
                let entities = populate(&mut world, ENTITIES_SMALL);
                (world, entities)
            },
            |(mut world, entities)| {
                for &entity in &entities {
                    world.emplace_or_replace(entity, 1u64);
                }
                for &entity in &entities {
                    world.erase::<u64>(entity);
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("emplace_erase_with_collection_1k", |b| {
        b.iter_batched(
            || {
                let mut world = World::new();
                let entities = populate(&mut world, ENTITIES_SMALL);
                world.reserve::<u64>(ENTITIES_SMALL);
                world
                    .query()
                    .include::<(Position,)>()
                    .require::<(u64,)>()
                    .collect();
                (world, entities)
            },
            |(mut world, entities)| {
                for &entity in &entities {
                    world.emplace_or_replace(entity, 1u64);
                }
                for &entity in &entities {
                    world.erase::<u64>(entity);
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("four_worlds_parallel_1k", |b| {
        b.iter_batched(
            || (0..4).map(|_| World::new()).collect::<Vec<World>>(),
            |mut worlds| {
                worlds.par_iter_mut().for_each(|world| {
                    populate(world, ENTITIES_SMALL);
                    let view = world.view::<(Position,)>();
                    let mut sum = 0.0f32;
                    view.for_each(|_, (position,), ()| sum += position.x);
                    black_box(sum);
                });
                black_box(worlds);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, churn_benchmark);
criterion_main!(benches);
