//! Simulation runner: owns clock advance and termination.
//!
//! Systems never touch the clock; each tick runs the fixed pipeline once
//! and then advances time by one step. The run ends when the soft end time
//! has passed with the fleet terminal and every materialised passenger
//! alighted, or at the hard cap.

use bevy_ecs::prelude::{Schedule, World};
use bevy_ecs::schedule::IntoSystemConfigs;
use log::debug;

use crate::clock::{SimulationClock, ONE_HOUR_S};
use crate::ecs::{Lifecycle, Phase};
use crate::passenger::PassengerRegistry;
use crate::scenario::SimConstants;
use crate::systems::{
    dispatch_system, passenger_arrival_system, reorg_decision_system, routing_decision_system,
    step_consists_system,
};

/// Builds the tick schedule: dispatch, arrivals, routing, stepping,
/// reorganization, strictly in that order.
pub fn simulation_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems(
        (
            dispatch_system,
            passenger_arrival_system,
            routing_decision_system,
            step_consists_system,
            reorg_decision_system,
        )
            .chain(),
    );
    schedule
}

/// Every consist is terminal or has been replaced by successors.
pub fn fleet_finished(world: &mut World) -> bool {
    world
        .query::<&Lifecycle>()
        .iter(world)
        .all(|lifecycle| lifecycle.phase == Phase::Ended || !lifecycle.able)
}

/// Every materialised passenger has alighted.
pub fn passengers_finished(world: &World) -> bool {
    world.resource::<PassengerRegistry>().all_alighted()
}

/// Runs one tick. Returns `false` without running when the termination
/// condition already holds.
pub fn run_tick(world: &mut World, schedule: &mut Schedule) -> bool {
    let (now, soft_end, hard_end) = {
        let clock = world.resource::<SimulationClock>();
        let constants = world.resource::<SimConstants>();
        (clock.now(), constants.sim_end_t, constants.end_t)
    };
    if now >= hard_end {
        return false;
    }
    if now >= soft_end && fleet_finished(world) && passengers_finished(world) {
        return false;
    }
    if now % ONE_HOUR_S == 0 {
        debug!("system time {:02}:00", now / ONE_HOUR_S);
    }

    schedule.run(world);
    world.resource_mut::<SimulationClock>().advance();
    true
}

/// Runs ticks until termination; returns the number of ticks executed.
pub fn run_to_completion(world: &mut World, schedule: &mut Schedule) -> u64 {
    let mut ticks = 0;
    while run_tick(world, schedule) {
        ticks += 1;
    }
    ticks
}
