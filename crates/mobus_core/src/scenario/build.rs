//! World assembly: validate inputs, build the line and demand stream, and
//! insert every engine resource.

use bevy_ecs::prelude::World;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::clock::SimulationClock;
use crate::demand::build_demand;
use crate::dispatch::{DispatchState, DispatchTables};
use crate::ecs::{ConsistIndex, FleetCounters};
use crate::error::ScenarioError;
use crate::ledger::CabLedger;
use crate::line::Line;
use crate::passenger::PassengerRegistry;
use crate::scenario::{ModeConfig, ScenarioParams, SimRng};

/// Validates the scenario and populates `world` with every resource the
/// runner needs. Nothing is inserted when validation fails.
pub fn build_scenario(world: &mut World, params: ScenarioParams) -> Result<(), ScenarioError> {
    let constants = params.constants;
    if constants.min_step_s == 0 {
        return Err(ScenarioError::ZeroTick);
    }

    let branches = if params.mode.has_branches() {
        params.side_branches.as_slice()
    } else {
        &[]
    };
    let line = Line::new(
        params.stations,
        params.section_dist_m,
        params.section_speed_ms,
        branches,
        constants.side_segments_k,
    )?;

    let tables = DispatchTables {
        headway_s: params.dep_headway_s,
        cab_count: params.dep_cab_count,
    };
    if params.mode.is_modular() {
        tables.validate()?;
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let stream = build_demand(
        &params.trips,
        &line,
        params.mode,
        &constants,
        params.direction,
        &mut rng,
    );

    world.insert_resource(SimulationClock::new(
        constants.sim_start_t,
        constants.min_step_s,
    ));
    world.insert_resource(ModeConfig {
        mode: params.mode,
        turn_rule: params.turn_rule,
    });
    world.insert_resource(constants);
    world.insert_resource(line);
    world.insert_resource(stream);
    world.insert_resource(tables);
    world.insert_resource(DispatchState::default());
    world.insert_resource(PassengerRegistry::default());
    world.insert_resource(CabLedger::default());
    world.insert_resource(ConsistIndex::default());
    world.insert_resource(FleetCounters::default());
    world.insert_resource(SimRng(rng));
    Ok(())
}
