//! End-to-end engine scenarios: one world per test, run to completion
//! through the public API.

use bevy_ecs::prelude::World;

use mobus_core::ecs::{CabId, Consist, Lifecycle, Phase};
use mobus_core::ledger::CabLedger;
use mobus_core::line::SideBranchSpec;
use mobus_core::location::Stop;
use mobus_core::passenger::{PassengerRegistry, LAT_JITTER_BOX};
use mobus_core::runner::{run_to_completion, simulation_schedule};
use mobus_core::scenario::{build_scenario, ScenarioParams, SimMode, TurnRule};
use mobus_core::stats::get_statistics;
use mobus_core::test_helpers::{
    flat_tables, single_dispatch_constants, stations_along, trip, uniform_line_params,
};

fn run(params: ScenarioParams) -> World {
    let mut world = World::new();
    build_scenario(&mut world, params).expect("scenario should build");
    let mut schedule = simulation_schedule();
    run_to_completion(&mut world, &mut schedule);
    world
}

#[test]
fn single_passenger_rides_the_baseline_bus() {
    let stations = stations_along(2);
    let trips = vec![trip(&stations, 20000, 1, 2)];
    let params = uniform_line_params(2, trips).with_constants(single_dispatch_constants());
    let mut world = run(params);

    let registry = world.resource::<PassengerRegistry>();
    assert_eq!(registry.len(), 1);
    let passenger = registry.iter().next().unwrap();
    assert_eq!(passenger.arrived_at, 7_200);
    let boarded = passenger.boarded_at.expect("passenger never boarded");
    let alighted = passenger.alighted_at.expect("passenger never alighted");
    // boards once the first dwell at station 1 completes
    assert!((21_600..21_650).contains(&boarded));
    // one 950 m section at 10 m/s plus the alighting dwell
    let in_vehicle = alighted - boarded;
    assert!(
        (95..=140).contains(&in_vehicle),
        "in-vehicle time {in_vehicle}s out of range"
    );
    assert_eq!(passenger.actual_alight, Some(Stop::Trunk(2)));

    let stats = get_statistics(&mut world);
    assert!(stats.feasible);
    assert_eq!(stats.passenger_count, 1);
    assert!(stats.mean_in_vehicle_min >= 95.0 / 60.0);
}

#[test]
fn heavy_alighting_splits_the_consist() {
    let stations = stations_along(5);
    let mut trips = Vec::new();
    for _ in 0..25 {
        trips.push(trip(&stations, 20000, 1, 2));
    }
    for _ in 0..20 {
        trips.push(trip(&stations, 20000, 1, 5));
    }
    let (headway, cabs) = flat_tables(600, 3);
    let params = uniform_line_params(5, trips)
        .with_mode(SimMode::Single)
        .with_dispatch_tables(headway, cabs)
        .with_constants(single_dispatch_constants());
    let mut world = run(params);

    // the dispatched consist was replaced by two successors
    let consists: Vec<(Consist, Lifecycle)> = world
        .query::<(&Consist, &Lifecycle)>()
        .iter(&world)
        .map(|(c, l)| (c.clone(), l.clone()))
        .collect();
    assert_eq!(consists.len(), 3);
    let parent = consists
        .iter()
        .find(|(c, _)| c.cab_count() == 3)
        .expect("parent consist missing");
    assert!(!parent.1.able);
    assert_eq!(parent.1.successors.len(), 2);

    let front = consists
        .iter()
        .find(|(c, _)| c.cab_count() == 1)
        .expect("front successor missing");
    let rear = consists
        .iter()
        .find(|(c, _)| c.cab_count() == 2)
        .expect("rear successor missing");
    assert_eq!(front.1.phase, Phase::Ended);
    assert_eq!(rear.1.phase, Phase::Ended);

    let registry = world.resource::<PassengerRegistry>();
    assert!(registry.all_alighted());
    // near-term alighters rode the trailing cabs and got off first
    let near_max = registry
        .iter()
        .filter(|p| p.alight_stop == Stop::Trunk(2))
        .map(|p| p.alighted_at.unwrap())
        .max()
        .unwrap();
    let far_min = registry
        .iter()
        .filter(|p| p.alight_stop == Stop::Trunk(5))
        .map(|p| p.alighted_at.unwrap())
        .min()
        .unwrap();
    assert!(near_max < far_min);

    let stats = get_statistics(&mut world);
    assert!(stats.feasible);
    assert_eq!(stats.passenger_count, 45);
}

#[test]
fn trailing_consist_merges_with_its_leader() {
    let stations = stations_along(5);
    let mut constants = single_dispatch_constants();
    // two dispatches 40 s apart, then the window closes
    constants.last_bus_t = constants.sim_start_t + 40;
    let (headway, cabs) = flat_tables(40, 1);
    let params = uniform_line_params(5, Vec::new())
        .with_mode(SimMode::Single)
        .with_dispatch_tables(headway, cabs)
        .with_constants(constants);
    let mut world = run(params);

    let consists: Vec<(Consist, Lifecycle)> = world
        .query::<(&Consist, &Lifecycle)>()
        .iter(&world)
        .map(|(c, l)| (c.clone(), l.clone()))
        .collect();
    assert_eq!(consists.len(), 3);

    let merged = consists
        .iter()
        .find(|(c, _)| c.cab_count() == 2)
        .expect("merge never happened");
    assert_eq!(merged.1.phase, Phase::Ended);
    // front consist's cab leads the merged order
    assert_eq!(merged.0.cabs, vec![CabId(0), CabId(1)]);

    for (consist, lifecycle) in consists.iter().filter(|(c, _)| c.cab_count() == 1) {
        assert!(!lifecycle.able, "parent {:?} still schedulable", consist.id);
        assert_eq!(lifecycle.successors, vec![merged.0.id]);
    }

    // both cabs covered the full line: section 1 separately, 2..4 merged
    let ledger = world.resource::<CabLedger>();
    assert_eq!(ledger.len(), 2);
    for (_, record) in ledger.iter() {
        assert!((record.distance_m - 4_000.0).abs() < 1e-9);
        assert!(record.ended_at.is_some());
    }
}

fn side_branch_params() -> ScenarioParams {
    let stations = stations_along(8);
    let branch = SideBranchSpec {
        anchor_station: 6,
        branch: 1,
        start: (stations[5].lat, stations[5].lon),
        end: (stations[5].lat + 40.0 * LAT_JITTER_BOX, stations[5].lon),
    };
    // three passengers destined for branch-1 stop 2: their destination
    // coordinates sit halfway up the branch
    let stop2 = (stations[5].lat + 20.0 * LAT_JITTER_BOX, stations[5].lon);
    let mut trips = Vec::new();
    for _ in 0..3 {
        let mut record = trip(&stations, 20000, 1, 6);
        record.down_lat = stop2.0;
        record.down_lon = stop2.1;
        trips.push(record);
    }
    let (headway, cabs) = flat_tables(600, 1);
    uniform_line_params(8, trips)
        .with_mode(SimMode::Multi)
        .with_turn_rule(TurnRule::DownFirst)
        .with_dispatch_tables(headway, cabs)
        .with_side_branches(vec![branch])
        .with_constants(single_dispatch_constants())
}

#[test]
fn consist_diverts_serves_the_branch_and_early_returns() {
    let mut world = run(side_branch_params());

    let registry = world.resource::<PassengerRegistry>();
    assert_eq!(registry.len(), 3);
    for passenger in registry.iter() {
        assert!(passenger.side_trip);
        assert_eq!(
            passenger.alight_stop,
            Stop::Side {
                anchor: 6,
                branch: 1,
                order: 2
            }
        );
        assert_eq!(passenger.actual_alight, Some(passenger.alight_stop));
        assert!(passenger.is_alighted());
    }

    let lifecycle = world.query::<&Lifecycle>().single(&world);
    assert_eq!(lifecycle.phase, Phase::Ended);

    // seven trunk sections plus the early-returned excursion: out to stop 2
    // and back is four 5 km segments
    let ledger = world.resource::<CabLedger>();
    let (_, record) = ledger.iter().next().unwrap();
    assert!(
        (record.distance_m - (7_000.0 + 4.0 * 5_000.0)).abs() < 1e-6,
        "unexpected excursion distance {}",
        record.distance_m
    );

    let stats = get_statistics(&mut world);
    assert!(stats.feasible);
}

#[test]
fn identical_seeds_replay_identically() {
    let collect = |world: &mut World| {
        let registry = world.resource::<PassengerRegistry>();
        let trips: Vec<(u64, Option<u64>, Option<u64>)> = registry
            .iter()
            .map(|p| (p.arrived_at, p.boarded_at, p.alighted_at))
            .collect();
        let ledger = world.resource::<CabLedger>();
        let cabs: Vec<(f64, Option<u64>, usize)> = ledger
            .iter()
            .map(|(_, r)| (r.distance_m, r.ended_at, r.departures.len()))
            .collect();
        (trips, cabs)
    };

    let mut first = run(side_branch_params().with_seed(7));
    let mut second = run(side_branch_params().with_seed(7));
    assert_eq!(collect(&mut first), collect(&mut second));
    assert_eq!(get_statistics(&mut first), get_statistics(&mut second));
}

#[test]
fn saturating_demand_respects_capacity() {
    let stations = stations_along(3);
    let mut trips = Vec::new();
    for _ in 0..60 {
        trips.push(trip(&stations, 20000, 1, 3));
    }
    let mut constants = single_dispatch_constants();
    constants.last_bus_t = constants.sim_start_t + 600;
    let (headway, cabs) = flat_tables(60, 1);
    let params = uniform_line_params(3, trips)
        .with_mode(SimMode::Single)
        .with_dispatch_tables(headway, cabs)
        .with_constants(constants);
    let mut world = run(params);

    let stats = get_statistics(&mut world);
    assert!(stats.feasible, "all passengers should eventually be served");
    assert!((stats.max_occupancy - 1.0).abs() < 1e-9);

    // dispatch stops at the last-bus time
    let ledger = world.resource::<CabLedger>();
    assert!(ledger.len() <= 11);
    for (_, record) in ledger.iter() {
        assert!(record.dispatched_at <= constants.last_bus_t);
    }
}

#[test]
fn empty_demand_completes_without_statistics_noise() {
    let params = uniform_line_params(4, Vec::new()).with_constants(single_dispatch_constants());
    let mut world = run(params);
    let stats = get_statistics(&mut world);
    assert!(stats.feasible);
    assert_eq!(stats.passenger_count, 0);
    assert_eq!(stats.mean_journey_min, 0.0);
    assert_eq!(stats.mean_station_wait_min, 0.0);
}
