use bevy_ecs::prelude::World;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use mobus_core::demand::TripRecord;
use mobus_core::line::StationSpec;
use mobus_core::runner::{run_to_completion, simulation_schedule};
use mobus_core::scenario::{build_scenario, ScenarioParams, SimConstants, SimMode};

fn stations(n: usize) -> Vec<StationSpec> {
    (0..n)
        .map(|i| StationSpec {
            id: i as u32 + 1,
            lat: 31.0,
            lon: 121.0 + 0.02 * i as f64,
        })
        .collect()
}

/// Synthetic demand: a spread of trips across the morning, every
/// origin/destination pair drawn from a fixed cycle.
fn synthetic_trips(stations: &[StationSpec], count: usize) -> Vec<TripRecord> {
    let n = stations.len() as u32;
    (0..count)
        .map(|i| {
            let up = (i as u32 % (n - 1)) + 1;
            let down = up + 1 + (i as u32 % (n - up));
            let minute = (i as u64 * 7) % 180;
            let hms = 70_000 + (minute / 60) * 10_000 + (minute % 60) * 100;
            let (u, d) = (
                &stations[up as usize - 1],
                &stations[down as usize - 1],
            );
            TripRecord {
                depart_time: 20191015_000000 + hms,
                direction: 0,
                up_station: up,
                down_station: down,
                up_lat: u.lat,
                up_lon: u.lon,
                down_lat: d.lat,
                down_lon: d.lon,
            }
        })
        .collect()
}

fn bench_params(mode: SimMode) -> ScenarioParams {
    let stations = stations(15);
    let trips = synthetic_trips(&stations, 400);
    let mut constants = SimConstants::default();
    constants.sim_end_t = 11 * 3600;
    constants.last_bus_t = 11 * 3600;
    constants.end_t = 14 * 3600;
    ScenarioParams::new(stations, vec![900.0; 14], vec![9.0; 14], trips)
        .with_mode(mode)
        .with_dispatch_tables(vec![600; 24], vec![2; 24])
        .with_constants(constants)
        .with_seed(42)
}

fn bench_full_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_run");
    group.sample_size(10);

    for (name, mode) in [
        ("baseline", SimMode::Baseline),
        ("single", SimMode::Single),
    ] {
        group.bench_function(name, |b| {
            b.iter_batched(
                || {
                    let mut world = World::new();
                    build_scenario(&mut world, bench_params(mode)).unwrap();
                    world
                },
                |mut world| {
                    let mut schedule = simulation_schedule();
                    run_to_completion(&mut world, &mut schedule)
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_full_run);
criterion_main!(benches);
