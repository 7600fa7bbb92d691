//! Run statistics: passenger and fleet aggregates for one simulation.
//!
//! A run where any materialised passenger never alighted returns the
//! sentinel result with a penalty energy value; the outer optimizer reads
//! it as an infeasibility signal.

use bevy_ecs::prelude::World;
use serde::Serialize;

use crate::clock::ONE_HOUR_S;
use crate::ledger::CabLedger;
use crate::line::Line;
use crate::passenger::PassengerRegistry;
use crate::scenario::{ModeConfig, SimConstants, SimMode};

/// Penalty energy reported for infeasible plans.
const INFEASIBLE_ENERGY_KWH: f64 = 500_000_000.0;
/// Grams of CO2 per kWh of condition-based consumption.
const CARBON_G_PER_KWH: f64 = 0.31 * 0.23;
/// Runs per driver shift the wage proxy assumes.
const RUNS_PER_SHIFT: f64 = 20.0;

/// Aggregated output of one run. Times are minutes, energies kWh,
/// occupancies are fractions of cab capacity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    pub feasible: bool,
    pub passenger_count: usize,
    pub mean_in_vehicle_min: f64,
    pub mean_journey_min: f64,
    pub mean_dwell_wait_min: f64,
    pub mean_station_wait_min: f64,
    pub mean_walk_on_m: f64,
    pub mean_walk_off_m: f64,
    pub energy_equal_speed_kwh: f64,
    pub energy_condition_kwh: f64,
    pub driver_wage_wan_per_year: f64,
    pub max_occupancy: f64,
    pub avg_occupancy: f64,
    pub avg_occupancy_early: f64,
    pub avg_occupancy_noon: f64,
    pub avg_occupancy_late: f64,
    pub carbon_emission_g: f64,
    pub optimal_in_vehicle_min: f64,
}

impl RunStatistics {
    /// Sentinel returned when one or more passengers were never served.
    pub fn infeasible() -> Self {
        Self {
            feasible: false,
            passenger_count: 0,
            mean_in_vehicle_min: 37.0,
            mean_journey_min: 7.0,
            mean_dwell_wait_min: 0.0,
            mean_station_wait_min: 0.0,
            mean_walk_on_m: 0.0,
            mean_walk_off_m: 0.0,
            energy_equal_speed_kwh: 0.0,
            energy_condition_kwh: INFEASIBLE_ENERGY_KWH,
            driver_wage_wan_per_year: 0.0,
            max_occupancy: 0.0,
            avg_occupancy: 0.0,
            avg_occupancy_early: 0.0,
            avg_occupancy_noon: 0.0,
            avg_occupancy_late: 0.0,
            carbon_emission_g: 0.0,
            optimal_in_vehicle_min: 0.0,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Aggregate the finished run in `world`.
pub fn get_statistics(world: &mut World) -> RunStatistics {
    let mode = world.resource::<ModeConfig>().mode;
    let constants = *world.resource::<SimConstants>();
    let registry = world.resource::<PassengerRegistry>();
    let line = world.resource::<Line>();
    let ledger = world.resource::<CabLedger>();

    if registry.iter().any(|p| !p.is_alighted()) {
        return RunStatistics::infeasible();
    }

    // passenger aggregates
    let mut in_vehicle = Vec::with_capacity(registry.len());
    let mut journey = Vec::with_capacity(registry.len());
    let mut dwell_wait = Vec::with_capacity(registry.len());
    let mut station_wait = Vec::with_capacity(registry.len());
    let mut walk_on = Vec::with_capacity(registry.len());
    let mut walk_off = Vec::with_capacity(registry.len());
    let mut optimal = Vec::with_capacity(registry.len());
    for passenger in registry.iter() {
        let stats = passenger
            .journey_stats(line, constants.passenger_speed_ms)
            .expect("alighted passenger without journey stats");
        in_vehicle.push(stats.in_vehicle_s as f64 / 60.0);
        journey.push(stats.full_journey_s as f64 / 60.0);
        dwell_wait.push(stats.dwell_wait_s as f64 / 60.0);
        station_wait.push(stats.station_wait_s as f64 / 60.0);
        walk_on.push(stats.walk_on_m);
        walk_off.push(stats.walk_off_m);
        optimal.push(line.free_run_time_s(
            passenger.board_stop.main_station(),
            passenger.alight_stop.main_station(),
        ) as f64 / 60.0);
    }

    // fleet aggregates
    let (per_m_speed, per_m_condition, wage, cap) = match mode {
        SimMode::Baseline => (
            constants.consumption_speed_large,
            constants.consumption_condition_large,
            RUNS_PER_SHIFT * constants.driver_wage_large,
            constants.large_cab_capacity as f64,
        ),
        _ => (
            constants.consumption_speed_small,
            constants.consumption_condition_small,
            RUNS_PER_SHIFT * 2.0 * constants.driver_wage_small,
            constants.small_cab_capacity as f64,
        ),
    };
    let total_distance = ledger.total_distance_m();
    let energy_equal_speed = total_distance * per_m_speed;
    let energy_condition = total_distance * per_m_condition;

    let mut max_occupancy = 0.0f64;
    let mut all = Vec::new();
    let mut early = Vec::new();
    let mut noon = Vec::new();
    let mut late = Vec::new();
    for (_, record) in ledger.iter() {
        let Some(mean_load) = record.mean_occupants() else {
            continue;
        };
        max_occupancy = max_occupancy.max(record.peak_occupants() as f64 / cap);
        let share = mean_load / cap;
        all.push(share);
        if let Some(first) = record.first_departure_at() {
            if (6 * ONE_HOUR_S..8 * ONE_HOUR_S).contains(&first) {
                early.push(share);
            }
            if (10 * ONE_HOUR_S..12 * ONE_HOUR_S).contains(&first) {
                noon.push(share);
            }
            if (16 * ONE_HOUR_S..18 * ONE_HOUR_S).contains(&first) {
                late.push(share);
            }
        }
    }

    RunStatistics {
        feasible: true,
        passenger_count: registry.len(),
        mean_in_vehicle_min: mean(&in_vehicle),
        mean_journey_min: mean(&journey),
        mean_dwell_wait_min: mean(&dwell_wait),
        mean_station_wait_min: mean(&station_wait),
        mean_walk_on_m: mean(&walk_on),
        mean_walk_off_m: mean(&walk_off),
        energy_equal_speed_kwh: energy_equal_speed,
        energy_condition_kwh: energy_condition,
        driver_wage_wan_per_year: wage / 10_000.0,
        max_occupancy,
        avg_occupancy: mean(&all),
        avg_occupancy_early: mean(&early),
        avg_occupancy_noon: mean(&noon),
        avg_occupancy_late: mean(&late),
        carbon_emission_g: CARBON_G_PER_KWH * energy_condition,
        optimal_in_vehicle_min: mean(&optimal),
    }
}
