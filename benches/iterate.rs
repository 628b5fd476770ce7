use criterion::*;
use std::hint::black_box;

mod common;
use common::*;

use kestrel_ecs::prelude::*;

fn iterate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    group.bench_function("view_two_included_10k", |b| {
        b.iter_batched(
            || {
                let mut world = World::new();
                populate(&mut world, ENTITIES_MED);
                world
            },
            |mut world| {
                let view = world.view::<(Position, Velocity)>();
                let mut sum = 0.0f32;
                view.for_each(|_, (position, velocity), ()| {
                    sum += position.x + velocity.x;
                });
                black_box(sum);
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("view_with_exclusion_10k", |b| {
        b.iter_batched(
            || {
                let mut world = World::new();
                populate(&mut world, ENTITIES_MED);
                world
            },
            |mut world| {
                let view = world
                    .query()
                    .include::<(Position, Velocity)>()
                    .exclude::<(Frozen,)>()
                    .view();
                let mut sum = 0.0f32;
                view.for_each(|_, (position, velocity), ()| {
                    sum += position.x + velocity.x;
                });
                black_box(sum);
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("collection_prefix_10k", |b| {
        b.iter_batched(
            || {
                let mut world = World::new();
                populate(&mut world, ENTITIES_MED);
                // The sorter groups matching entities once, up front.
                world.query().include::<(Position, Velocity)>().collect();
                world
            },
            |mut world| {
                let collection = world.query().include::<(Position, Velocity)>().collect();
                let mut sum = 0.0f32;
                collection.for_each(|_, (position, velocity), ()| {
                    sum += position.x + velocity.x;
                });
                black_box(sum);
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("single_storage_dense_walk_10k", |b| {
        b.iter_batched(
            || {
                let mut world = World::new();
                populate(&mut world, ENTITIES_MED);
                world
            },
            |world| {
                let set = world.storage::<Position>().unwrap();
                let mut sum = 0.0f32;
                for (_, position) in set.iter() {
                    sum += position.x;
                }
                black_box(sum);
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, iterate_benchmark);
criterion_main!(benches);
